//! The native fungible-token ledger.
//!
//! Instructions arrive as a little-endian u32 on stdin followed by their
//! operands; results are written to stdout little-endian. Supply lives in
//! space 0 under the empty key, balances in space 1 keyed by account.

use super::{FileDescriptor, Program, ProgramError, SystemInterface};
use meridian_types::protocol::{Account, ACCOUNT_LEN};
use meridian_types::Error;

const NAME: &str = "Coin";
const SYMBOL: &str = "COIN";
const DECIMALS: u32 = 8;

const SUPPLY_SPACE: u32 = 0;
const BALANCE_SPACE: u32 = 1;

/// The coin instruction set. `authorize` is reachable only through the
/// privileged authority-check route.
pub mod instruction {
    pub const AUTHORIZE: u32 = 0;
    pub const NAME: u32 = 1;
    pub const SYMBOL: u32 = 2;
    pub const DECIMALS: u32 = 3;
    pub const TOTAL_SUPPLY: u32 = 4;
    pub const BALANCE_OF: u32 = 5;
    pub const TRANSFER: u32 = 6;
    pub const MINT: u32 = 7;
    pub const BURN: u32 = 8;
}

/// The coin system program.
pub struct Coin;

fn read_u32(system: &mut dyn SystemInterface) -> Result<u32, Error> {
    let mut bytes = [0u8; 4];
    system.read(FileDescriptor::Stdin, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(system: &mut dyn SystemInterface) -> Result<u64, Error> {
    let mut bytes = [0u8; 8];
    system.read(FileDescriptor::Stdin, &mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_account(system: &mut dyn SystemInterface) -> Result<Account, Error> {
    let mut bytes = [0u8; ACCOUNT_LEN];
    system.read(FileDescriptor::Stdin, &mut bytes)?;
    Ok(Account(bytes))
}

fn decode_u64(bytes: &[u8]) -> u64 {
    match bytes.try_into() {
        Ok(array) => u64::from_le_bytes(array),
        Err(_) => 0,
    }
}

impl Coin {
    fn total_supply(system: &mut dyn SystemInterface) -> u64 {
        let object = system.get_object(SUPPLY_SPACE, &[]);
        if object.is_empty() {
            return 0;
        }
        decode_u64(&object)
    }

    fn balance_of(system: &mut dyn SystemInterface, account: &Account) -> u64 {
        let object = system.get_object(BALANCE_SPACE, account.as_bytes());
        if object.is_empty() {
            return 0;
        }
        decode_u64(&object)
    }

    /// `caller == from`, or `from` has authorized the transaction.
    fn authorized_for(
        system: &mut dyn SystemInterface,
        from: &Account,
    ) -> Result<bool, Error> {
        if system.get_caller().as_ref() == Some(from) {
            return Ok(true);
        }
        system.check_authority(from)
    }
}

impl Program for Coin {
    fn run(&self, system: &mut dyn SystemInterface) -> Result<(), Error> {
        let instruction = read_u32(system)?;

        match instruction {
            instruction::AUTHORIZE => {
                // The coin program never authorizes anything on its own.
                system.write(FileDescriptor::Stdout, &[0u8])?;
            }
            instruction::NAME => {
                system.write(FileDescriptor::Stdout, NAME.as_bytes())?;
            }
            instruction::SYMBOL => {
                system.write(FileDescriptor::Stdout, SYMBOL.as_bytes())?;
            }
            instruction::DECIMALS => {
                system.write(FileDescriptor::Stdout, &DECIMALS.to_le_bytes())?;
            }
            instruction::TOTAL_SUPPLY => {
                let supply = Self::total_supply(system);
                system.write(FileDescriptor::Stdout, &supply.to_le_bytes())?;
            }
            instruction::BALANCE_OF => {
                let account = read_account(system)?;
                let balance = Self::balance_of(system, &account);
                system.write(FileDescriptor::Stdout, &balance.to_le_bytes())?;
            }
            instruction::TRANSFER => {
                let from = read_account(system)?;
                let to = read_account(system)?;
                let value = read_u64(system)?;

                if from == to {
                    return Err(ProgramError::InvalidArgument.into());
                }
                if !Self::authorized_for(system, &from)? {
                    return Err(ProgramError::Unauthorized.into());
                }

                let from_balance = Self::balance_of(system, &from);
                if from_balance < value {
                    return Err(ProgramError::InsufficientBalance.into());
                }
                let to_balance = Self::balance_of(system, &to);

                system.put_object(
                    BALANCE_SPACE,
                    from.as_bytes(),
                    &(from_balance - value).to_le_bytes(),
                )?;
                system.put_object(
                    BALANCE_SPACE,
                    to.as_bytes(),
                    &(to_balance + value).to_le_bytes(),
                )?;
            }
            instruction::MINT => {
                let to = read_account(system)?;
                let value = read_u64(system)?;

                let supply = Self::total_supply(system);
                if u64::MAX - value < supply {
                    return Err(ProgramError::Overflow.into());
                }
                let to_balance = Self::balance_of(system, &to);

                system.put_object(SUPPLY_SPACE, &[], &(supply + value).to_le_bytes())?;
                system.put_object(
                    BALANCE_SPACE,
                    to.as_bytes(),
                    &(to_balance + value).to_le_bytes(),
                )?;
            }
            instruction::BURN => {
                let from = read_account(system)?;
                let value = read_u64(system)?;

                if !Self::authorized_for(system, &from)? {
                    return Err(ProgramError::Unauthorized.into());
                }

                let from_balance = Self::balance_of(system, &from);
                if from_balance < value {
                    return Err(ProgramError::InsufficientBalance.into());
                }
                let supply = Self::total_supply(system);
                if value > supply {
                    return Err(ProgramError::InsufficientSupply.into());
                }

                system.put_object(SUPPLY_SPACE, &[], &(supply - value).to_le_bytes())?;
                system.put_object(
                    BALANCE_SPACE,
                    from.as_bytes(),
                    &(from_balance - value).to_le_bytes(),
                )?;
            }
            _ => return Err(ProgramError::InvalidInstruction.into()),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
