//! The controller: the top-level façade of the Meridian engine.
//!
//! Owns the state database and the WASM engine, validates incoming blocks
//! and transactions, drives the execution context, and commits state once
//! the irreversibility window advances. Reads (head, limits, read-only
//! program calls) share a reader-writer lock; only `process_*` takes the
//! writer side.

use meridian_crypto::{sha256, Digest};
use meridian_execution::state::{key, space, GenesisData, Head, IRREVERSIBILITY_WINDOW};
use meridian_execution::{ExecutionContext, Intent, ResourceLimits, Tolerance};
use meridian_state::{Database, ForkResolutionAlgorithm, GenesisInit, StateNode, NULL_ID};
use meridian_types::protocol::{
    Account, Block, BlockReceipt, ProgramInput, ProgramOutput, Transaction, TransactionReceipt,
};
use meridian_types::{ControllerError, Error};
use meridian_vm::VirtualMachine;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Accepted clock skew for incoming block timestamps.
const TIME_DELTA_MS: u64 = 5_000;

/// The engine façade.
pub struct Controller {
    db: RwLock<Option<Database>>,
    vm: Arc<VirtualMachine>,
    read_compute_bandwidth_limit: u64,
}

impl Controller {
    /// Create a controller. `read_compute_bandwidth_limit` bounds read-only
    /// program calls.
    pub fn new(read_compute_bandwidth_limit: u64) -> Result<Self, Error> {
        let vm = VirtualMachine::new().map_err(|e| {
            tracing::error!(target: "controller", %e, "failed to construct the wasm engine");
            Error::Controller(ControllerError::BlockStateError)
        })?;

        Ok(Self {
            db: RwLock::new(None),
            vm: Arc::new(vm),
            read_compute_bandwidth_limit,
        })
    }

    /// Open the state database, writing `genesis_data` into a fresh root.
    /// Every genesis triple must land on an absent key, and the genesis
    /// public key must be present afterwards.
    pub fn open(
        &self,
        path: Option<PathBuf>,
        genesis_data: &GenesisData,
        algorithm: ForkResolutionAlgorithm,
        reset: bool,
    ) -> Result<(), Error> {
        let data = genesis_data.clone();
        let init: GenesisInit = Arc::new(move |root| {
            for entry in &data {
                if root.get(&entry.space, &entry.key).is_some() {
                    tracing::error!(target: "controller", "encountered unexpected object in initial state");
                    return Err(ControllerError::BlockStateError.into());
                }
                root.put(&entry.space, &entry.key, &entry.value);
            }
            tracing::info!(
                target: "controller",
                objects = data.len(),
                "wrote genesis objects into new database"
            );

            if root.get(&space::metadata(), key::GENESIS_KEY).is_none() {
                tracing::error!(target: "controller", "could not find genesis public key in database");
                return Err(ControllerError::BlockStateError.into());
            }
            Ok(())
        });

        let mut database = Database::open(init, algorithm, path)?;

        if reset {
            tracing::info!(target: "controller", "resetting database");
            database.reset()?;
        }

        let head = database.head();
        tracing::info!(
            target: "controller",
            height = head.revision(),
            id = %hex::encode(head.id()),
            "opened database at block"
        );

        *self.db.write() = Some(database);
        Ok(())
    }

    /// Close the state database.
    pub fn close(&self) {
        if let Some(mut database) = self.db.write().take() {
            database.close();
        }
    }

    /// Apply a block on top of its parent state.
    ///
    /// Returns `Ok(None)` when the block was already applied (duplicate or
    /// current irreversible root). `index_to` marks bulk indexing and only
    /// affects logging; `now_ms` anchors the timestamp window.
    pub fn process_block(
        &self,
        block: &Block,
        index_to: u64,
        now_ms: u64,
    ) -> Result<Option<BlockReceipt>, Error> {
        let guard = self.db.write();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        if !block.validate() {
            return Err(ControllerError::MalformedBlock.into());
        }

        let time_upper_bound = now_ms + TIME_DELTA_MS;
        let mut time_lower_bound = 0u64;

        // Already applied.
        if db.get(&block.id).is_some() {
            return Ok(None);
        }

        let parent = match db.get(&block.previous) {
            Some(parent) => {
                if !parent.is_final() {
                    return Err(ControllerError::UnknownPreviousBlock.into());
                }
                parent
            }
            None => {
                // Distinguish a reapplied irreversible block from a truly
                // unknown parent.
                let root = db.root();
                if block.height < root.revision() {
                    return Err(ControllerError::PreIrreversibilityBlock.into());
                }
                return Err(ControllerError::UnknownPreviousBlock.into());
            }
        };

        tracing::debug!(
            target: "controller",
            height = block.height,
            id = %hex::encode(block.id),
            "pushing block"
        );

        let block_node = match parent.make_permanent_child(block.id) {
            Some(node) => node,
            None => return Err(ControllerError::BlockStateError.into()),
        };

        let outcome = (|| {
            if block.previous == NULL_ID {
                if block.height != 1 {
                    return Err(ControllerError::UnexpectedHeight.into());
                }
            } else {
                if block.state_merkle_root != parent.merkle_root() {
                    return Err(ControllerError::StateMerkleMismatch.into());
                }

                let mut parent_context =
                    ExecutionContext::new(self.vm.clone(), Intent::ReadOnly);
                parent_context.set_state_node(parent.clone());
                let parent_info = parent_context.head();
                time_lower_bound = parent_info.time;

                if block.height != parent_info.height + 1 {
                    return Err(ControllerError::UnexpectedHeight.into());
                }
            }

            if block.timestamp > time_upper_bound || block.timestamp <= time_lower_bound {
                return Err(ControllerError::TimestampOutOfBounds.into());
            }

            let mut context = ExecutionContext::new(self.vm.clone(), Intent::BlockApplication);
            context.set_state_node(block_node.clone());
            context.apply_block(block)
        })();

        match outcome {
            Ok(mut receipt) => {
                block_node.finalize();
                receipt.state_merkle_root = block_node.merkle_root();

                if index_to == 0 {
                    tracing::info!(
                        target: "controller",
                        height = block.height,
                        id = %hex::encode(block.id),
                        transactions = block.transactions.len(),
                        "block applied"
                    );
                }

                let irreversible_block =
                    block_node.revision().saturating_sub(IRREVERSIBILITY_WINDOW);
                if irreversible_block > db.root().revision() {
                    db.at_revision(irreversible_block, &block.id).commit();
                }

                Ok(Some(receipt))
            }
            Err(error) => {
                block_node.discard();
                Err(error)
            }
        }
    }

    /// Apply a transaction against a temporary child of head. Never
    /// persists; the receipt reports what the transaction would do.
    pub fn process_transaction(
        &self,
        transaction: &Transaction,
        _broadcast: bool,
    ) -> Result<TransactionReceipt, Error> {
        let guard = self.db.write();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        if !transaction.validate() {
            return Err(ControllerError::MalformedTransaction.into());
        }

        tracing::debug!(
            target: "controller",
            id = %hex::encode(transaction.id),
            "pushing transaction"
        );

        if self.network_id() != transaction.network_id {
            return Err(ControllerError::NetworkIdMismatch.into());
        }

        let mut context = ExecutionContext::new(self.vm.clone(), Intent::TransactionApplication);
        context.set_state_node(db.head().make_child());
        let limits = context.resource_limits();
        context.resource_meter_mut().set_resource_limits(limits);

        let receipt = context.apply_transaction(transaction)?;

        tracing::debug!(
            target: "controller",
            id = %hex::encode(transaction.id),
            "transaction applied"
        );
        Ok(receipt)
    }

    /// Invoke a program read-only against head with a reduced compute
    /// budget. A nonzero program exit is data (the `code` field), not an
    /// error.
    pub fn read_program(
        &self,
        account: &Account,
        input: &ProgramInput,
    ) -> Result<ProgramOutput, Error> {
        let guard = self.db.read();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        let mut context = ExecutionContext::new(self.vm.clone(), Intent::ReadOnly);
        context.set_state_node(db.head());

        let limits = ResourceLimits {
            compute_bandwidth_limit: self.read_compute_bandwidth_limit,
            compute_bandwidth_cost: 1,
            ..ResourceLimits::default()
        };
        context.resource_meter_mut().set_resource_limits(limits);

        let frame =
            context.run_program(account, &input.stdin, &input.arguments, Tolerance::Relaxed)?;
        Ok(frame.output())
    }

    /// Summary of the chain head.
    pub fn head(&self) -> Head {
        let guard = self.db.read();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        let mut context = ExecutionContext::new(self.vm.clone(), Intent::ReadOnly);
        context.set_state_node(db.head());
        context.head()
    }

    /// The resource schedule blocks run under.
    pub fn resource_limits(&self) -> ResourceLimits {
        ExecutionContext::new(self.vm.clone(), Intent::ReadOnly).resource_limits()
    }

    /// The resource credits `account` holds.
    pub fn account_resources(&self, account: &Account) -> u64 {
        let guard = self.db.read();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        let mut context = ExecutionContext::new(self.vm.clone(), Intent::ReadOnly);
        context.set_state_node(db.head());
        context.account_resources(account)
    }

    /// The stored nonce of `account` at head.
    pub fn account_nonce(&self, account: &Account) -> u64 {
        let guard = self.db.read();
        let db = match guard.as_ref() {
            Some(db) => db,
            None => panic!("database is not open"),
        };

        let mut context = ExecutionContext::new(self.vm.clone(), Intent::ReadOnly);
        context.set_state_node(db.head());
        context.account_nonce(account)
    }

    /// The digest identifying this network.
    pub fn network_id(&self) -> Digest {
        sha256("meridian")
    }
}
