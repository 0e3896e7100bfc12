use super::*;
use meridian_types::protocol::ProgramOutput;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct MockSystem {
    stdin: Vec<u8>,
    offset: usize,
    stdout: Vec<u8>,
    objects: BTreeMap<(u32, Vec<u8>), Vec<u8>>,
    caller: Option<Account>,
    authorities: BTreeSet<Account>,
}

impl MockSystem {
    fn with_stdin(stdin: Vec<u8>) -> Self {
        Self {
            stdin,
            ..Self::default()
        }
    }

    fn balance(&self, account: &Account) -> u64 {
        self.objects
            .get(&(BALANCE_SPACE, account.as_bytes().to_vec()))
            .map(|bytes| decode_u64(bytes))
            .unwrap_or(0)
    }

    fn supply(&self) -> u64 {
        self.objects
            .get(&(SUPPLY_SPACE, Vec::new()))
            .map(|bytes| decode_u64(bytes))
            .unwrap_or(0)
    }
}

impl SystemInterface for MockSystem {
    fn arguments(&self) -> Vec<String> {
        Vec::new()
    }

    fn write(&mut self, fd: FileDescriptor, bytes: &[u8]) -> Result<(), Error> {
        assert_eq!(fd, FileDescriptor::Stdout);
        self.stdout.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, fd: FileDescriptor, buffer: &mut [u8]) -> Result<usize, Error> {
        assert_eq!(fd, FileDescriptor::Stdin);
        let remaining = &self.stdin[self.offset..];
        let count = remaining.len().min(buffer.len());
        buffer[..count].copy_from_slice(&remaining[..count]);
        self.offset += count;
        Ok(count)
    }

    fn get_object(&mut self, space_id: u32, key: &[u8]) -> Vec<u8> {
        self.objects
            .get(&(space_id, key.to_vec()))
            .cloned()
            .unwrap_or_default()
    }

    fn get_next_object(&mut self, _space_id: u32, _key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        None
    }

    fn get_prev_object(&mut self, _space_id: u32, _key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        None
    }

    fn put_object(&mut self, space_id: u32, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.objects
            .insert((space_id, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn remove_object(&mut self, space_id: u32, key: &[u8]) -> Result<(), Error> {
        self.objects.remove(&(space_id, key.to_vec()));
        Ok(())
    }

    fn check_authority(&mut self, account: &Account) -> Result<bool, Error> {
        Ok(self.authorities.contains(account))
    }

    fn get_caller(&self) -> Option<Account> {
        self.caller
    }

    fn call_program(
        &mut self,
        _account: &Account,
        _stdin: &[u8],
        _arguments: &[String],
    ) -> Result<ProgramOutput, Error> {
        panic!("coin never calls other programs");
    }

    fn log(&mut self, _message: &str) {}

    fn event(&mut self, _name: &[u8], _data: &[u8], _impacted: &[Account]) -> Result<(), Error> {
        Ok(())
    }
}

fn stdin_for(instruction: u32, parts: &[&[u8]]) -> Vec<u8> {
    let mut stdin = instruction.to_le_bytes().to_vec();
    for part in parts {
        stdin.extend_from_slice(part);
    }
    stdin
}

fn alice() -> Account {
    Account::user([0xaa; 32])
}

fn bob() -> Account {
    Account::user([0xbb; 32])
}

#[test]
fn metadata_instructions() {
    let mut system = MockSystem::with_stdin(stdin_for(instruction::NAME, &[]));
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, b"Coin");

    let mut system = MockSystem::with_stdin(stdin_for(instruction::SYMBOL, &[]));
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, b"COIN");

    let mut system = MockSystem::with_stdin(stdin_for(instruction::DECIMALS, &[]));
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, 8u32.to_le_bytes());
}

#[test]
fn authorize_always_declines() {
    let mut system = MockSystem::with_stdin(stdin_for(instruction::AUTHORIZE, &[]));
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, [0u8]);
}

#[test]
fn mint_increases_supply_and_balance() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &100u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    assert_eq!(system.supply(), 100);
    assert_eq!(system.balance(&alice()), 100);
}

#[test]
fn mint_overflow_is_rejected() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &u64::MAX.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();
    assert_eq!(system.supply(), u64::MAX);

    system.offset = 0;
    system.stdin = stdin_for(instruction::MINT, &[bob().as_bytes(), &1u64.to_le_bytes()]);
    assert_eq!(
        Coin.run(&mut system),
        Err(Error::Exit(ProgramError::Overflow.code()))
    );
}

#[test]
fn transfer_moves_value_for_an_authorized_sender() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &100u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(
        instruction::TRANSFER,
        &[alice().as_bytes(), bob().as_bytes(), &60u64.to_le_bytes()],
    );
    system.authorities.insert(alice());
    Coin.run(&mut system).unwrap();

    assert_eq!(system.balance(&alice()), 40);
    assert_eq!(system.balance(&bob()), 60);
    assert_eq!(system.supply(), 100);
}

#[test]
fn transfer_requires_authority() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &100u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(
        instruction::TRANSFER,
        &[alice().as_bytes(), bob().as_bytes(), &60u64.to_le_bytes()],
    );
    assert_eq!(
        Coin.run(&mut system),
        Err(Error::Exit(ProgramError::Unauthorized.code()))
    );
}

#[test]
fn transfer_by_the_calling_program_skips_the_authority_check() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &10u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(
        instruction::TRANSFER,
        &[alice().as_bytes(), bob().as_bytes(), &10u64.to_le_bytes()],
    );
    system.caller = Some(alice());
    Coin.run(&mut system).unwrap();
    assert_eq!(system.balance(&bob()), 10);
}

#[test]
fn transfer_to_self_is_invalid() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::TRANSFER,
        &[alice().as_bytes(), alice().as_bytes(), &1u64.to_le_bytes()],
    ));
    assert_eq!(
        Coin.run(&mut system),
        Err(Error::Exit(ProgramError::InvalidArgument.code()))
    );
}

#[test]
fn transfer_beyond_balance_is_rejected() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &10u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(
        instruction::TRANSFER,
        &[alice().as_bytes(), bob().as_bytes(), &11u64.to_le_bytes()],
    );
    system.authorities.insert(alice());
    assert_eq!(
        Coin.run(&mut system),
        Err(Error::Exit(ProgramError::InsufficientBalance.code()))
    );
}

#[test]
fn burn_reduces_supply_and_balance() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &100u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(
        instruction::BURN,
        &[alice().as_bytes(), &30u64.to_le_bytes()],
    );
    system.authorities.insert(alice());
    Coin.run(&mut system).unwrap();

    assert_eq!(system.supply(), 70);
    assert_eq!(system.balance(&alice()), 70);
}

#[test]
fn queries_report_balances_and_supply() {
    let mut system = MockSystem::with_stdin(stdin_for(
        instruction::MINT,
        &[alice().as_bytes(), &100u64.to_le_bytes()],
    ));
    Coin.run(&mut system).unwrap();

    system.offset = 0;
    system.stdin = stdin_for(instruction::TOTAL_SUPPLY, &[]);
    system.stdout.clear();
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, 100u64.to_le_bytes());

    system.offset = 0;
    system.stdin = stdin_for(instruction::BALANCE_OF, &[alice().as_bytes()]);
    system.stdout.clear();
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, 100u64.to_le_bytes());

    // Unknown accounts read as zero.
    system.offset = 0;
    system.stdin = stdin_for(instruction::BALANCE_OF, &[bob().as_bytes()]);
    system.stdout.clear();
    Coin.run(&mut system).unwrap();
    assert_eq!(system.stdout, 0u64.to_le_bytes());
}

#[test]
fn unknown_instruction_exits() {
    let mut system = MockSystem::with_stdin(u64::MAX.to_le_bytes().to_vec());
    assert_eq!(
        Coin.run(&mut system),
        Err(Error::Exit(ProgramError::InvalidInstruction.code()))
    );
    assert!(system.stdout.is_empty());
}
