//! Bounded-cost accounting: three resource dimensions, per-payer sessions.

use meridian_types::protocol::Event;
use meridian_types::{ControllerError, Error, Reversion};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Per-dimension budgets and per-unit costs in resource credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub disk_storage_limit: u64,
    pub disk_storage_cost: u64,
    pub network_bandwidth_limit: u64,
    pub network_bandwidth_cost: u64,
    pub compute_bandwidth_limit: u64,
    pub compute_bandwidth_cost: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            disk_storage_limit: u64::MAX,
            disk_storage_cost: 0,
            network_bandwidth_limit: u64::MAX,
            network_bandwidth_cost: 0,
            compute_bandwidth_limit: u64::MAX,
            compute_bandwidth_cost: 0,
        }
    }
}

/// A snapshot of the three dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceState {
    pub disk_storage: u64,
    pub network_bandwidth: u64,
    pub compute_bandwidth: u64,
}

/// A credit-bounded scope charged to one payer. The session also captures
/// the events and logs emitted while it is active, so the transaction
/// receipt can be assembled from it.
pub struct Session {
    initial_resources: u64,
    remaining_resources: u64,
    events: Vec<Event>,
    logs: Vec<String>,
}

/// Shared handle to a session; the meter and chronicler hold weak sides.
pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    /// Open a session with an initial credit balance.
    pub fn new(initial_resources: u64) -> SharedSession {
        Arc::new(Mutex::new(Self {
            initial_resources,
            remaining_resources: initial_resources,
            events: Vec::new(),
            logs: Vec::new(),
        }))
    }

    /// Spend `resources` credits.
    pub fn use_resources(&mut self, resources: u64) -> Result<(), Error> {
        if resources > self.remaining_resources {
            return Err(Reversion::InsufficientResources.into());
        }
        self.remaining_resources -= resources;
        Ok(())
    }

    /// Credits still available.
    pub fn remaining_resources(&self) -> u64 {
        self.remaining_resources
    }

    /// Credits spent so far.
    pub fn used_resources(&self) -> u64 {
        self.initial_resources - self.remaining_resources
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn push_log(&mut self, line: String) {
        self.logs.push(line);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }
}

/// The per-execution resource meter.
///
/// Consumption is checked against the meter's remaining dimension first,
/// then routed through the attached session at the dimension's cost. With no
/// session attached, consumption accrues to the system bucket instead.
pub struct ResourceMeter {
    limits: ResourceLimits,
    remaining: ResourceState,
    system_use: ResourceState,
    session: Weak<Mutex<Session>>,
}

impl Default for ResourceMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMeter {
    pub fn new() -> Self {
        let limits = ResourceLimits::default();
        let mut meter = Self {
            limits,
            remaining: ResourceState::default(),
            system_use: ResourceState::default(),
            session: Weak::new(),
        };
        meter.set_resource_limits(limits);
        meter
    }

    /// Reset the meter to fresh limits, clearing the system bucket.
    pub fn set_resource_limits(&mut self, limits: ResourceLimits) {
        self.limits = limits;
        self.system_use = ResourceState::default();
        self.remaining = ResourceState {
            disk_storage: limits.disk_storage_limit,
            network_bandwidth: limits.network_bandwidth_limit,
            compute_bandwidth: limits.compute_bandwidth_limit,
        };
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Attach a payer session. The meter holds only a weak reference; once
    /// the session is dropped, consumption falls through to the system
    /// bucket again.
    pub fn set_session(&mut self, session: &SharedSession) {
        self.session = Arc::downgrade(session);
    }

    fn charge_session(&mut self, amount: u64, cost: u64, system: impl FnOnce(&mut ResourceState)) -> Result<(), Error> {
        if let Some(session) = self.session.upgrade() {
            let credits = (amount as u128) * (cost as u128);
            let credits: u64 = credits
                .try_into()
                .unwrap_or_else(|_| panic!("resource credit overflow"));
            session.lock().use_resources(credits)?;
        } else {
            system(&mut self.system_use);
        }
        Ok(())
    }

    pub fn use_disk_storage(&mut self, bytes: u64) -> Result<(), Error> {
        if bytes > self.remaining.disk_storage {
            return Err(ControllerError::DiskStorageLimitExceeded.into());
        }
        let cost = self.limits.disk_storage_cost;
        self.charge_session(bytes, cost, |s| s.disk_storage += bytes)?;
        self.remaining.disk_storage -= bytes;
        Ok(())
    }

    pub fn use_network_bandwidth(&mut self, bytes: u64) -> Result<(), Error> {
        if bytes > self.remaining.network_bandwidth {
            return Err(ControllerError::NetworkBandwidthLimitExceeded.into());
        }
        let cost = self.limits.network_bandwidth_cost;
        self.charge_session(bytes, cost, |s| s.network_bandwidth += bytes)?;
        self.remaining.network_bandwidth -= bytes;
        Ok(())
    }

    pub fn use_compute_bandwidth(&mut self, ticks: u64) -> Result<(), Error> {
        if ticks > self.remaining.compute_bandwidth {
            return Err(ControllerError::ComputeBandwidthLimitExceeded.into());
        }
        let cost = self.limits.compute_bandwidth_cost;
        self.charge_session(ticks, cost, |s| s.compute_bandwidth += ticks)?;
        self.remaining.compute_bandwidth -= ticks;
        Ok(())
    }

    fn effective_remaining(&self, remaining: u64, cost: u64) -> u64 {
        match self.session.upgrade() {
            Some(session) if cost > 0 => remaining.min(session.lock().remaining_resources() / cost),
            _ => remaining,
        }
    }

    /// The effective disk cap: meter remaining, bounded by what the session
    /// can still pay.
    pub fn remaining_disk_storage(&self) -> u64 {
        self.effective_remaining(self.remaining.disk_storage, self.limits.disk_storage_cost)
    }

    pub fn remaining_network_bandwidth(&self) -> u64 {
        self.effective_remaining(
            self.remaining.network_bandwidth,
            self.limits.network_bandwidth_cost,
        )
    }

    pub fn remaining_compute_bandwidth(&self) -> u64 {
        self.effective_remaining(
            self.remaining.compute_bandwidth,
            self.limits.compute_bandwidth_cost,
        )
    }

    pub fn remaining_resources(&self) -> ResourceState {
        self.remaining
    }

    /// Consumption that was not charged to any session.
    pub fn system_resources(&self) -> ResourceState {
        self.system_use
    }
}
