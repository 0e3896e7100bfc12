//! The execution context: block and transaction application, operation
//! dispatch, authority resolution, session lifecycle and receipt assembly.

use crate::chronicler::Chronicler;
use crate::program::{self, FileDescriptor, SystemInterface};
use crate::resource_meter::{ResourceLimits, ResourceMeter, Session, SharedSession};
use crate::stack::{Frame, FrameRecorder, ProgramStack};
use crate::state::{self, key, space};
use meridian_crypto::{sha256, Digest, PublicKey};
use meridian_state::{PermanentStateNode, StateNode, TemporaryStateNode};
use meridian_types::codec;
use meridian_types::protocol::{
    Account, AccountType, Block, BlockReceipt, Event, Operation, ProgramFrame, ProgramInput,
    ProgramOutput, Transaction, TransactionReceipt,
};
use meridian_types::{ControllerError, Error, Reversion};
use meridian_vm::{HostApi, VirtualMachine, VmError};
use std::sync::Arc;

/// The mode of an execution context, controlling which side effects are
/// permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ReadOnly,
    BlockApplication,
    TransactionApplication,
    BlockProposal,
}

/// How program failures are treated by [`ExecutionContext::run_program`]:
/// relaxed surfaces a program's exit code as frame data, strict propagates
/// it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    Relaxed,
    Strict,
}

/// The state node an execution context operates on.
pub enum StateNodeHandle {
    Permanent(PermanentStateNode),
    Temporary(TemporaryStateNode),
}

impl StateNodeHandle {
    fn as_node(&self) -> &dyn StateNode {
        match self {
            StateNodeHandle::Permanent(node) => node,
            StateNodeHandle::Temporary(node) => node,
        }
    }

    fn permanent(&self) -> &PermanentStateNode {
        match self {
            StateNodeHandle::Permanent(node) => node,
            StateNodeHandle::Temporary(_) => panic!("head state node unexpectedly temporary"),
        }
    }
}

impl From<PermanentStateNode> for StateNodeHandle {
    fn from(node: PermanentStateNode) -> Self {
        StateNodeHandle::Permanent(node)
    }
}

impl From<TemporaryStateNode> for StateNodeHandle {
    fn from(node: TemporaryStateNode) -> Self {
        StateNodeHandle::Temporary(node)
    }
}

/// The transactional layer between the controller and the state DAG.
pub struct ExecutionContext {
    vm: Arc<VirtualMachine>,
    node: Option<StateNodeHandle>,
    stack: ProgramStack,
    recorder: FrameRecorder,
    meter: ResourceMeter,
    chronicler: Chronicler,
    intent: Intent,
    transaction: Option<Transaction>,
    verified_signatures: Vec<Account>,
}

const EVENT_NAME_LIMIT: usize = 128;

impl ExecutionContext {
    pub fn new(vm: Arc<VirtualMachine>, intent: Intent) -> Self {
        Self {
            vm,
            node: None,
            stack: ProgramStack::new(),
            recorder: FrameRecorder::new(),
            meter: ResourceMeter::new(),
            chronicler: Chronicler::new(),
            intent,
            transaction: None,
            verified_signatures: Vec::new(),
        }
    }

    /// Attach the state node this context executes against.
    pub fn set_state_node(&mut self, node: impl Into<StateNodeHandle>) {
        self.node = Some(node.into());
    }

    /// Detach the state node.
    pub fn clear_state_node(&mut self) {
        self.node = None;
    }

    fn node(&self) -> &dyn StateNode {
        match &self.node {
            Some(handle) => handle.as_node(),
            None => panic!("state node does not exist"),
        }
    }

    pub fn resource_meter(&self) -> &ResourceMeter {
        &self.meter
    }

    pub fn resource_meter_mut(&mut self) -> &mut ResourceMeter {
        &mut self.meter
    }

    pub fn chronicler(&self) -> &Chronicler {
        &self.chronicler
    }

    pub fn frame_recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    /// The network this context executes for.
    pub fn network_id(&self) -> Digest {
        sha256("meridian")
    }

    /// The resource schedule blocks run under.
    pub fn resource_limits(&self) -> ResourceLimits {
        state::default_resource_limits()
    }

    /// The resource credits an account holds.
    pub fn account_resources(&self, _account: &Account) -> u64 {
        state::DEFAULT_ACCOUNT_RESOURCES
    }

    fn consume_account_resources(
        &mut self,
        _account: &Account,
        _resources: u64,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// The stored nonce of an account; zero when absent.
    pub fn account_nonce(&self, account: &Account) -> u64 {
        match self.node().get(&space::transaction_nonce(), account.as_bytes()) {
            Some(bytes) => bytes
                .try_into()
                .map(u64::from_le_bytes)
                .unwrap_or_default(),
            None => 0,
        }
    }

    fn set_account_nonce(&mut self, account: &Account, nonce: u64) -> Result<(), Error> {
        let delta = self.node().put(
            &space::transaction_nonce(),
            account.as_bytes(),
            &nonce.to_le_bytes(),
        );
        self.charge_disk(delta)
    }

    /// Summary of the attached (permanent, finalized) node.
    pub fn head(&self) -> state::Head {
        let handle = match &self.node {
            Some(handle) => handle,
            None => panic!("state node does not exist"),
        };
        let node = handle.permanent();

        let time = self
            .node()
            .get(&space::metadata(), key::HEAD_BLOCK)
            .and_then(|bytes| bytes.try_into().ok().map(u64::from_le_bytes))
            .unwrap_or(0);

        let revision = node.revision();
        state::Head {
            id: node.id(),
            height: revision,
            previous: node.parent_id(),
            state_merkle_root: node.merkle_root(),
            time,
            last_irreversible_block: revision.saturating_sub(crate::state::IRREVERSIBILITY_WINDOW),
        }
    }

    fn make_session(&mut self, resources: u64) -> SharedSession {
        let session = Session::new(resources);
        self.meter.set_session(&session);
        self.chronicler.set_session(&session);
        session
    }

    fn charge_disk(&mut self, delta: i64) -> Result<(), Error> {
        if delta > 0 {
            self.meter.use_disk_storage(delta as u64)?;
        }
        Ok(())
    }

    /// Apply a block: verify the signer against the stored genesis key and
    /// the signature against the block id, apply each transaction in order
    /// (reversions become reverted receipts, anything else fails the block),
    /// then assemble the block receipt.
    pub fn apply_block(&mut self, block: &Block) -> Result<BlockReceipt, Error> {
        let mut receipt = BlockReceipt::default();
        self.meter.set_resource_limits(self.resource_limits());

        let start = self.meter.remaining_resources();

        let genesis_key = match self.node().get(&space::metadata(), key::GENESIS_KEY) {
            Some(bytes) => bytes,
            None => panic!("genesis address not found"),
        };

        if genesis_key.as_slice() != block.signer.payload() {
            return Err(ControllerError::InvalidSignature.into());
        }

        let signer_key = PublicKey::from_bytes(&genesis_key)
            .map_err(|_| Error::from(ControllerError::InvalidSignature))?;
        if !signer_key.verify(&block.signature, &block.id) {
            return Err(ControllerError::InvalidSignature.into());
        }

        // Persist the block time; head queries and the next block's
        // timestamp lower bound read it back.
        self.node().put(
            &space::metadata(),
            key::HEAD_BLOCK,
            &block.timestamp.to_le_bytes(),
        );

        for transaction in &block.transactions {
            match self.apply_transaction(transaction) {
                Ok(transaction_receipt) => receipt.transaction_receipts.push(transaction_receipt),
                Err(error) if error.is_reversion() => {
                    receipt.transaction_receipts.push(TransactionReceipt {
                        id: transaction.id,
                        payer: transaction.payer,
                        payee: transaction.payee,
                        resource_limit: transaction.resource_limit,
                        reverted: true,
                        ..TransactionReceipt::default()
                    });
                }
                Err(error) => return Err(error),
            }
        }

        let limits = self.meter.resource_limits();
        let system = self.meter.system_resources();
        let system_cost = system.disk_storage * limits.disk_storage_cost
            + system.network_bandwidth * limits.network_bandwidth_cost
            + system.compute_bandwidth * limits.compute_bandwidth_cost;
        tracing::trace!(target: "execution", system_cost, "block system resource cost");

        let end = self.meter.remaining_resources();

        receipt.id = block.id;
        receipt.height = block.height;
        receipt.disk_storage_used = start.disk_storage - end.disk_storage;
        receipt.network_bandwidth_used = start.network_bandwidth - end.network_bandwidth;
        receipt.compute_bandwidth_used = start.compute_bandwidth - end.compute_bandwidth;
        receipt.disk_storage_charged = receipt.disk_storage_used - system.disk_storage;
        receipt.network_bandwidth_charged = receipt.network_bandwidth_used - system.network_bandwidth;
        receipt.compute_bandwidth_charged = receipt.compute_bandwidth_used - system.compute_bandwidth;

        for (transaction_id, event) in self.chronicler.events() {
            if transaction_id.is_none() {
                receipt.events.push(event.clone());
            }
        }
        receipt.logs = self.chronicler.logs().to_vec();

        Ok(receipt)
    }

    /// Apply a transaction: authority, nonce, bandwidth, then operation
    /// dispatch on a temporary child node that is squashed on success and
    /// dropped on reversion. The nonce advances either way.
    pub fn apply_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<TransactionReceipt, Error> {
        assert!(self.node.is_some(), "state node does not exist");

        self.transaction = Some(transaction.clone());
        self.verified_signatures.clear();

        let use_payee_nonce = !transaction.payee.is_zero();
        let nonce_account = if use_payee_nonce {
            transaction.payee
        } else {
            transaction.payer
        };

        let initial = self.meter.remaining_resources();

        let session = self.make_session(transaction.resource_limit);

        if self.account_resources(&transaction.payer) < transaction.resource_limit {
            return Err(ControllerError::InsufficientResources.into());
        }

        if !self.check_authority(&transaction.payer)? {
            return Err(ControllerError::AuthorizationFailure.into());
        }
        if use_payee_nonce && !self.check_authority(&transaction.payee)? {
            return Err(ControllerError::AuthorizationFailure.into());
        }

        if self.account_nonce(&nonce_account) + 1 != transaction.nonce {
            return Err(ControllerError::InvalidNonce.into());
        }
        self.set_account_nonce(&nonce_account, transaction.nonce)?;

        let serialized_size = codec::to_bytes_canonical(transaction).len() as u64;
        self.meter.use_network_bandwidth(serialized_size)?;

        // Dispatch operations on a temporary child; squash only on success.
        let block_node = match self.node.take() {
            Some(node) => node,
            None => panic!("state node does not exist"),
        };
        self.node = Some(StateNodeHandle::Temporary(block_node.as_node().make_child()));

        let outcome: Result<(), Error> = (|| {
            for operation in &transaction.operations {
                match operation {
                    Operation::UploadProgram { id, bytecode } => {
                        self.apply_upload_program(id, bytecode)?
                    }
                    Operation::CallProgram { id, input } => self.apply_call_program(id, input)?,
                }
            }
            Ok(())
        })();

        let transaction_node = self.node.take();
        self.node = Some(block_node);

        let mut receipt = TransactionReceipt {
            id: transaction.id,
            payer: transaction.payer,
            payee: transaction.payee,
            resource_limit: transaction.resource_limit,
            ..TransactionReceipt::default()
        };

        match outcome {
            Ok(()) => {
                if let Some(StateNodeHandle::Temporary(node)) = transaction_node {
                    node.squash();
                }
            }
            Err(error) if error.is_reversion() => {
                receipt.reverted = true;
                self.chronicler
                    .push_log(format!("transaction reverted: {error}"));
            }
            Err(error) => return Err(error),
        }

        let used_resources = session.lock().used_resources();
        if !receipt.reverted {
            receipt.events = session.lock().events().to_vec();
        }
        receipt.logs = session.lock().logs().to_vec();

        let remaining = self.meter.remaining_resources();
        drop(session);

        self.consume_account_resources(&transaction.payer, used_resources)?;

        receipt.resource_used = used_resources;
        receipt.disk_storage_used = initial.disk_storage - remaining.disk_storage;
        receipt.network_bandwidth_used = initial.network_bandwidth - remaining.network_bandwidth;
        receipt.compute_bandwidth_used = initial.compute_bandwidth - remaining.compute_bandwidth;

        Ok(receipt)
    }

    /// First upload binds the program to the user who signed for it;
    /// overwriting requires the program's own authority. The stored value is
    /// `sha256(bytecode) || bytecode`.
    fn apply_upload_program(&mut self, id: &Account, bytecode: &[u8]) -> Result<(), Error> {
        let exists = self
            .node()
            .get(&space::program_data(), id.as_bytes())
            .is_some();

        let authorized = if exists {
            self.check_authority(id)?
        } else {
            self.check_authority(&id.user_counterpart())?
        };
        if !authorized {
            return Err(ControllerError::AuthorizationFailure.into());
        }

        let mut value = Vec::with_capacity(32 + bytecode.len());
        value.extend_from_slice(&sha256(bytecode));
        value.extend_from_slice(bytecode);
        self.node()
            .put(&space::program_data(), id.as_bytes(), &value);

        Ok(())
    }

    /// Call operations surface only their state mutations and events; a
    /// nonzero exit reverts the transaction.
    fn apply_call_program(&mut self, id: &Account, input: &ProgramInput) -> Result<(), Error> {
        match self.call_program_impl(id, &input.stdin, &input.arguments) {
            Ok(_) => Ok(()),
            Err(Error::Exit(code)) => {
                tracing::debug!(target: "execution", code, "program exited inside call operation");
                Err(Reversion::Failure.into())
            }
            Err(error) => Err(error),
        }
    }

    /// Resolve authority for `account` per its type: programs through their
    /// privileged `authorize` entry, users through the transaction's
    /// Ed25519 authorizations (verified incrementally and cached).
    pub fn check_authority(&mut self, account: &Account) -> Result<bool, Error> {
        assert!(self.node.is_some(), "state node does not exist");

        if self.intent == Intent::ReadOnly {
            return Err(Reversion::ReadOnlyContext.into());
        }

        if account.is_program() {
            let stdin = program::coin::instruction::AUTHORIZE.to_le_bytes();
            let frame = match self.run_program(account, &stdin, &[], Tolerance::Strict) {
                Ok(frame) => frame,
                Err(Error::Exit(_)) => return Err(Reversion::Failure.into()),
                Err(error) => return Err(error),
            };

            if frame.stdout.len() != 1 {
                return Err(Reversion::Failure.into());
            }
            return Ok(frame.stdout[0] != 0);
        }

        let transaction = match &self.transaction {
            Some(transaction) => transaction.clone(),
            None => panic!("transaction required for check authority"),
        };

        if self.verified_signatures.iter().any(|signer| signer == account) {
            return Ok(true);
        }

        for authorization in transaction
            .authorizations
            .iter()
            .skip(self.verified_signatures.len())
        {
            let signer_key = PublicKey::from_bytes(authorization.signer.payload())
                .map_err(|_| Error::from(ControllerError::InvalidSignature))?;
            if !signer_key.verify(&authorization.signature, &transaction.id) {
                return Err(ControllerError::InvalidSignature.into());
            }

            self.verified_signatures.push(authorization.signer);

            if authorization.signer == *account {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Run a program to completion or trap, recording the completed frame.
    pub fn run_program(
        &mut self,
        account: &Account,
        stdin: &[u8],
        arguments: &[String],
        tolerance: Tolerance,
    ) -> Result<Arc<ProgramFrame>, Error> {
        assert!(self.node.is_some(), "state node does not exist");

        self.stack
            .push_frame(Frame::new(*account, arguments.to_vec(), stdin.to_vec()))?;

        let outcome: Result<(), Error> = match account.account_type() {
            AccountType::Program => self.execute_user_program(account),
            AccountType::SystemProgram => self.execute_native_program(account),
            _ => Err(Reversion::InvalidProgram.into()),
        };

        let code = match (outcome, tolerance) {
            (Ok(()), _) => 0,
            (Err(Error::Exit(code)), Tolerance::Relaxed) => code,
            (Err(error), _) => {
                self.stack.pop_frame();
                return Err(error);
            }
        };

        let depth = self.stack.len() as u32;
        let frame = self.stack.pop_frame();
        let record = Arc::new(ProgramFrame {
            id: *account,
            depth,
            arguments: frame.arguments,
            stdin: frame.stdin,
            code,
            stdout: frame.stdout,
            stderr: frame.stderr,
        });

        self.recorder.add(record.clone());
        Ok(record)
    }

    fn execute_user_program(&mut self, account: &Account) -> Result<(), Error> {
        let program_data = match self.node().get(&space::program_data(), account.as_bytes()) {
            Some(data) => data,
            None => return Err(Reversion::InvalidProgram.into()),
        };

        assert!(program_data.len() >= 32, "program hash does not exist");
        let id: Digest = match program_data[..32].try_into() {
            Ok(digest) => digest,
            Err(_) => unreachable!(),
        };
        let bytecode = program_data[32..].to_vec();

        let vm = self.vm.clone();
        match vm.run(self, &bytecode, &id) {
            Ok(()) => Ok(()),
            Err(VmError::Exit(code)) => Err(Error::Exit(code)),
            Err(VmError::Host(error)) => Err(error),
            Err(error) => {
                tracing::debug!(target: "execution", %error, "program trapped");
                Err(Reversion::Failure.into())
            }
        }
    }

    fn execute_native_program(&mut self, account: &Account) -> Result<(), Error> {
        let program = match program::registry().get(account) {
            Some(program) => program,
            None => return Err(Reversion::InvalidProgram.into()),
        };
        program.run(self)
    }

    fn call_program_impl(
        &mut self,
        account: &Account,
        stdin: &[u8],
        arguments: &[String],
    ) -> Result<ProgramOutput, Error> {
        if !account.is_program() {
            return Err(Reversion::InvalidProgram.into());
        }

        // The authorize entry point is reachable only through
        // check_authority's privileged route.
        let authorize = program::coin::instruction::AUTHORIZE.to_le_bytes();
        if stdin.len() >= 4 && stdin[..4] == authorize {
            return Err(Reversion::InsufficientPrivileges.into());
        }

        let frame = self.run_program(account, stdin, arguments, Tolerance::Strict)?;
        Ok(frame.output())
    }

    fn current_program(&self) -> Account {
        self.stack.current_frame().program_id
    }

    fn object_space(&self, id: u32) -> meridian_state::ObjectSpace {
        meridian_state::ObjectSpace::program(id, self.current_program())
    }

    fn guard_writes(&self) -> Result<(), Error> {
        if self.intent == Intent::ReadOnly {
            return Err(Reversion::ReadOnlyContext.into());
        }
        Ok(())
    }
}

impl SystemInterface for ExecutionContext {
    fn arguments(&self) -> Vec<String> {
        self.stack.current_frame().arguments.clone()
    }

    fn write(&mut self, fd: FileDescriptor, bytes: &[u8]) -> Result<(), Error> {
        let frame = self.stack.peek_frame();
        match fd {
            FileDescriptor::Stdout => frame.stdout.extend_from_slice(bytes),
            FileDescriptor::Stderr => frame.stderr.extend_from_slice(bytes),
            FileDescriptor::Stdin => return Err(Reversion::BadFileDescriptor.into()),
        }
        Ok(())
    }

    fn read(&mut self, fd: FileDescriptor, buffer: &mut [u8]) -> Result<usize, Error> {
        if fd != FileDescriptor::Stdin {
            return Err(Reversion::BadFileDescriptor.into());
        }

        let frame = self.stack.peek_frame();
        let remaining = &frame.stdin[frame.input_offset..];
        let count = remaining.len().min(buffer.len());
        buffer[..count].copy_from_slice(&remaining[..count]);
        frame.input_offset += count;
        Ok(count)
    }

    fn get_object(&mut self, space_id: u32, key: &[u8]) -> Vec<u8> {
        let space = self.object_space(space_id);
        self.node().get(&space, key).unwrap_or_default()
    }

    fn get_next_object(&mut self, space_id: u32, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let space = self.object_space(space_id);
        self.node().next(&space, key)
    }

    fn get_prev_object(&mut self, space_id: u32, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let space = self.object_space(space_id);
        self.node().prev(&space, key)
    }

    fn put_object(&mut self, space_id: u32, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.guard_writes()?;
        let space = self.object_space(space_id);
        let delta = self.node().put(&space, key, value);
        self.charge_disk(delta)
    }

    fn remove_object(&mut self, space_id: u32, key: &[u8]) -> Result<(), Error> {
        self.guard_writes()?;
        let space = self.object_space(space_id);
        let delta = self.node().remove(&space, key);
        self.charge_disk(delta)
    }

    fn check_authority(&mut self, account: &Account) -> Result<bool, Error> {
        ExecutionContext::check_authority(self, account)
    }

    fn get_caller(&self) -> Option<Account> {
        if self.stack.len() <= 1 {
            return None;
        }
        self.stack.frame_below_top(1).map(|frame| frame.program_id)
    }

    fn call_program(
        &mut self,
        account: &Account,
        stdin: &[u8],
        arguments: &[String],
    ) -> Result<ProgramOutput, Error> {
        self.call_program_impl(account, stdin, arguments)
    }

    fn log(&mut self, message: &str) {
        self.chronicler.push_log(message.to_string());
    }

    fn event(&mut self, name: &[u8], data: &[u8], impacted: &[Account]) -> Result<(), Error> {
        if name.is_empty() || name.len() > EVENT_NAME_LIMIT {
            return Err(Reversion::InvalidEventName.into());
        }
        let name = match std::str::from_utf8(name) {
            Ok(name) => name.to_string(),
            Err(_) => return Err(Reversion::InvalidEventName.into()),
        };

        let event = Event {
            source: self.current_program(),
            name,
            data: data.to_vec(),
            impacted: impacted.to_vec(),
        };

        let transaction_id = self.transaction.as_ref().map(|t| t.id);
        self.chronicler.push_event(transaction_id, event);
        Ok(())
    }
}

impl HostApi for ExecutionContext {
    fn arguments(&self) -> Vec<Vec<u8>> {
        self.stack
            .current_frame()
            .arguments
            .iter()
            .map(|argument| argument.as_bytes().to_vec())
            .collect()
    }

    fn write_stream(&mut self, fd: u32, bytes: &[u8]) -> Result<(), Error> {
        match FileDescriptor::from_raw(fd) {
            Some(fd) => SystemInterface::write(self, fd, bytes),
            None => Err(Reversion::BadFileDescriptor.into()),
        }
    }

    fn read_stream(&mut self, fd: u32, buffer: &mut [u8]) -> Result<usize, Error> {
        match FileDescriptor::from_raw(fd) {
            Some(fd) => SystemInterface::read(self, fd, buffer),
            None => Err(Reversion::BadFileDescriptor.into()),
        }
    }

    fn get_caller(&self) -> Vec<u8> {
        SystemInterface::get_caller(self)
            .map(|account| account.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn get_object(&mut self, space_id: u32, key: &[u8]) -> Vec<u8> {
        SystemInterface::get_object(self, space_id, key)
    }

    fn put_object(&mut self, space_id: u32, key: &[u8], value: &[u8]) -> Result<(), Error> {
        SystemInterface::put_object(self, space_id, key, value)
    }

    fn check_authority(&mut self, account: &[u8]) -> Result<bool, Error> {
        let account = match Account::from_bytes(account) {
            Some(account) => account,
            None => return Err(Reversion::InvalidAccount.into()),
        };
        ExecutionContext::check_authority(self, &account)
    }

    fn get_meter_ticks(&self) -> u64 {
        self.meter.remaining_compute_bandwidth()
    }

    fn use_meter_ticks(&mut self, ticks: u64) -> Result<(), Error> {
        self.meter.use_compute_bandwidth(ticks)
    }
}
