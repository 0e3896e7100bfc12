//! Event and log collection during block or transaction application.

use crate::resource_meter::{Session, SharedSession};
use meridian_crypto::Digest;
use meridian_types::protocol::Event;
use parking_lot::Mutex;
use std::sync::Weak;

/// Collects events and logs for the whole execution; entries are also teed
/// into the active session so the transaction receipt can be assembled from
/// the payer's view. Events are tagged with their transaction id; block-level
/// events carry none.
#[derive(Default)]
pub struct Chronicler {
    events: Vec<(Option<Digest>, Event)>,
    logs: Vec<String>,
    session: Weak<Mutex<Session>>,
}

impl Chronicler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the active session; weakly held, like the meter's side.
    pub fn set_session(&mut self, session: &SharedSession) {
        self.session = std::sync::Arc::downgrade(session);
    }

    pub fn push_event(&mut self, transaction_id: Option<Digest>, event: Event) {
        if let Some(session) = self.session.upgrade() {
            session.lock().push_event(event.clone());
        }
        self.events.push((transaction_id, event));
    }

    pub fn push_log(&mut self, line: String) {
        if let Some(session) = self.session.upgrade() {
            session.lock().push_log(line.clone());
        }
        self.logs.push(line);
    }

    pub fn events(&self) -> &[(Option<Digest>, Event)] {
        &self.events
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::protocol::Account;

    fn event(name: &str) -> Event {
        Event {
            source: Account::system_program("test"),
            name: name.to_string(),
            data: Vec::new(),
            impacted: Vec::new(),
        }
    }

    #[test]
    fn events_are_teed_into_the_session() {
        let mut chronicler = Chronicler::new();
        let session = Session::new(0);
        chronicler.set_session(&session);

        chronicler.push_event(Some([1u8; 32]), event("a"));
        chronicler.push_log("log".to_string());

        assert_eq!(chronicler.events().len(), 1);
        assert_eq!(session.lock().events().len(), 1);
        assert_eq!(session.lock().logs().len(), 1);
    }

    #[test]
    fn block_level_events_carry_no_transaction_id() {
        let mut chronicler = Chronicler::new();
        chronicler.push_event(None, event("block"));
        chronicler.push_event(Some([1u8; 32]), event("tx"));

        let block_events: Vec<_> = chronicler
            .events()
            .iter()
            .filter(|(id, _)| id.is_none())
            .collect();
        assert_eq!(block_events.len(), 1);
        assert_eq!(block_events[0].1.name, "block");
    }

    #[test]
    fn dropped_session_stops_the_tee() {
        let mut chronicler = Chronicler::new();
        {
            let session = Session::new(0);
            chronicler.set_session(&session);
        }
        chronicler.push_log("after".to_string());
        assert_eq!(chronicler.logs().len(), 1);
    }
}
