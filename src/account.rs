//! Trader quote balances.
//!
//! Stands in for the ledger's bank: margin is debited from here on open and proceeds are
//! credited back on close. Kept in the same store as positions so a failed operation rolls
//! both back together.

use crate::numeric::ArithmeticError;
use crate::types::{Address, Quote};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Quote,
    pub total_deposited: Quote,
    pub total_withdrawn: Quote,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: Quote::zero(),
            total_deposited: Quote::zero(),
            total_withdrawn: Quote::zero(),
        }
    }

    pub fn deposit(&mut self, amount: Quote) -> Result<(), AccountError> {
        self.balance = self.balance.checked_add(amount)?;
        self.total_deposited = self.total_deposited.checked_add(amount)?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount > self.balance {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.checked_sub(amount)?;
        self.total_withdrawn = self.total_withdrawn.checked_add(amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}
