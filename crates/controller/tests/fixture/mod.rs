//! Shared helpers for controller integration tests: seeded keys, block and
//! transaction builders, and coin query shortcuts.

#![allow(dead_code)]

use meridian_controller::Controller;
use meridian_crypto::{sha256, Digest, SecretKey};
use meridian_execution::program::coin::instruction;
use meridian_execution::state::make_genesis_data;
use meridian_state::ForkResolutionAlgorithm;
use meridian_types::protocol::{
    Account, Authorization, Block, Operation, ProgramInput, ProgramOutput, Transaction,
};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Fixture {
    pub controller: Controller,
    pub block_signing_key: SecretKey,
}

impl Fixture {
    pub fn new() -> Self {
        let block_signing_key = SecretKey::from_seed(&sha256("genesis")).unwrap();
        let controller = Controller::new(10_000_000).unwrap();
        controller
            .open(
                None,
                &make_genesis_data(&block_signing_key.public_key().to_bytes()),
                ForkResolutionAlgorithm::Fifo,
                false,
            )
            .unwrap();

        Self {
            controller,
            block_signing_key,
        }
    }

    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    pub fn user_key(seed: &str) -> SecretKey {
        SecretKey::from_seed(&sha256(seed)).unwrap()
    }

    pub fn user_account(key: &SecretKey) -> Account {
        Account::user(key.public_key().to_bytes())
    }

    pub fn program_account(key: &SecretKey) -> Account {
        Account::program(key.public_key().to_bytes())
    }

    pub fn coin() -> Account {
        Account::system_program("coin")
    }

    pub fn make_transaction(
        &self,
        signer: &SecretKey,
        nonce: u64,
        resource_limit: u64,
        operations: Vec<Operation>,
    ) -> Transaction {
        let payer = Self::user_account(signer);
        let mut transaction = Transaction {
            id: Digest::default(),
            network_id: self.controller.network_id(),
            nonce,
            resource_limit,
            payer,
            payee: Account::ZERO,
            operations,
            authorizations: Vec::new(),
        };
        transaction.id = transaction.compute_id();
        transaction.authorizations.push(Authorization {
            signer: payer,
            signature: signer.sign(&transaction.id).unwrap(),
        });
        transaction
    }

    /// A block on top of the current head, signed by the block signing key.
    pub fn make_block(&self, transactions: Vec<Transaction>) -> Block {
        let head = self.controller.head();
        let now = Self::now_ms();
        let timestamp = if head.time >= now { head.time + 1 } else { now };
        self.make_block_at(
            head.height + 1,
            timestamp,
            head.id,
            head.state_merkle_root,
            transactions,
        )
    }

    pub fn make_block_at(
        &self,
        height: u64,
        timestamp: u64,
        previous: Digest,
        state_merkle_root: Digest,
        transactions: Vec<Transaction>,
    ) -> Block {
        let mut block = Block {
            id: Digest::default(),
            height,
            previous,
            state_merkle_root,
            timestamp,
            signer: Self::user_account(&self.block_signing_key),
            signature: [0u8; 64],
            transactions,
        };
        block.id = block.compute_id();
        block.signature = self.block_signing_key.sign(&block.id).unwrap();
        block
    }

    /// Process a block built on head and require success.
    pub fn submit_block(&self, transactions: Vec<Transaction>) {
        let block = self.make_block(transactions);
        let receipt = self
            .controller
            .process_block(&block, 0, Self::now_ms())
            .unwrap()
            .expect("block should not be a duplicate");
        for transaction_receipt in &receipt.transaction_receipts {
            assert!(
                !transaction_receipt.reverted,
                "unexpected reversion in submitted block"
            );
        }
    }

    pub fn upload_program_operation(program: &Account, bytecode: Vec<u8>) -> Operation {
        Operation::UploadProgram {
            id: *program,
            bytecode,
        }
    }

    pub fn call_operation(program: &Account, stdin: Vec<u8>) -> Operation {
        Operation::CallProgram {
            id: *program,
            input: ProgramInput {
                stdin,
                arguments: Vec::new(),
            },
        }
    }

    pub fn mint_operation(token: &Account, to: &Account, value: u64) -> Operation {
        let mut stdin = instruction::MINT.to_le_bytes().to_vec();
        stdin.extend_from_slice(to.as_bytes());
        stdin.extend_from_slice(&value.to_le_bytes());
        Self::call_operation(token, stdin)
    }

    pub fn transfer_operation(
        token: &Account,
        from: &Account,
        to: &Account,
        value: u64,
    ) -> Operation {
        let mut stdin = instruction::TRANSFER.to_le_bytes().to_vec();
        stdin.extend_from_slice(from.as_bytes());
        stdin.extend_from_slice(to.as_bytes());
        stdin.extend_from_slice(&value.to_le_bytes());
        Self::call_operation(token, stdin)
    }

    pub fn burn_operation(token: &Account, from: &Account, value: u64) -> Operation {
        let mut stdin = instruction::BURN.to_le_bytes().to_vec();
        stdin.extend_from_slice(from.as_bytes());
        stdin.extend_from_slice(&value.to_le_bytes());
        Self::call_operation(token, stdin)
    }

    pub fn read(&self, program: &Account, stdin: Vec<u8>) -> ProgramOutput {
        self.controller
            .read_program(
                program,
                &ProgramInput {
                    stdin,
                    arguments: Vec::new(),
                },
            )
            .unwrap()
    }

    pub fn token_name(&self, token: &Account) -> String {
        let output = self.read(token, instruction::NAME.to_le_bytes().to_vec());
        String::from_utf8(output.stdout).unwrap()
    }

    pub fn token_symbol(&self, token: &Account) -> String {
        let output = self.read(token, instruction::SYMBOL.to_le_bytes().to_vec());
        String::from_utf8(output.stdout).unwrap()
    }

    pub fn token_decimals(&self, token: &Account) -> u32 {
        let output = self.read(token, instruction::DECIMALS.to_le_bytes().to_vec());
        u32::from_le_bytes(output.stdout.try_into().unwrap())
    }

    pub fn total_supply(&self, token: &Account) -> u64 {
        let output = self.read(token, instruction::TOTAL_SUPPLY.to_le_bytes().to_vec());
        u64::from_le_bytes(output.stdout.try_into().unwrap())
    }

    pub fn balance_of(&self, token: &Account, account: &Account) -> u64 {
        let mut stdin = instruction::BALANCE_OF.to_le_bytes().to_vec();
        stdin.extend_from_slice(account.as_bytes());
        let output = self.read(token, stdin);
        u64::from_le_bytes(output.stdout.try_into().unwrap())
    }
}
