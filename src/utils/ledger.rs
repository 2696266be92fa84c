//! The Bank's username -> balance table.
//!
//! Balances live in `0..=i32::MAX`. Each mutation validates fully and then
//! writes while holding that user's shard lock, so concurrent deposits and
//! withdrawals for the same user can neither overdraw nor overflow.

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct Ledger {
    balances: DashMap<String, i32>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: &str) -> bool {
        self.balances.contains_key(user)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn balance(&self, user: &str) -> Result<i32> {
        self.balances
            .get(user)
            .map(|balance| *balance)
            .ok_or_else(|| Error::NoSuchUser(user.to_string()))
    }

    pub fn create_user(&self, user: &str, balance: i32) -> Result<()> {
        if balance < 0 {
            return Err(Error::InvalidAmount(balance));
        }
        match self.balances.entry(user.to_string()) {
            Entry::Occupied(_) => Err(Error::UserExists(user.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(balance);
                info!(user, balance, "user created");
                Ok(())
            }
        }
    }

    /// Returns the new balance.
    pub fn deposit(&self, user: &str, amount: i32) -> Result<i32> {
        if amount < 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let mut balance = self
            .balances
            .get_mut(user)
            .ok_or_else(|| Error::NoSuchUser(user.to_string()))?;
        let updated = balance.checked_add(amount).ok_or(Error::Overflow)?;
        *balance = updated;
        info!(user, amount, "deposit");
        Ok(updated)
    }

    /// Returns the new balance.
    pub fn withdraw(&self, user: &str, amount: i32) -> Result<i32> {
        if amount < 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let mut balance = self
            .balances
            .get_mut(user)
            .ok_or_else(|| Error::NoSuchUser(user.to_string()))?;
        if amount > *balance {
            return Err(Error::InsufficientFunds);
        }
        *balance -= amount;
        info!(user, amount, "withdrawal");
        Ok(*balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_create_and_balance() {
        let ledger = Ledger::new();
        ledger.create_user("alice", 100).unwrap();
        assert_eq!(ledger.balance("alice").unwrap(), 100);
        assert!(matches!(
            ledger.create_user("alice", 5),
            Err(Error::UserExists(_))
        ));
        assert_eq!(ledger.balance("alice").unwrap(), 100);
        assert!(matches!(ledger.balance("bob"), Err(Error::NoSuchUser(_))));
    }

    #[test]
    fn test_withdraw() {
        let ledger = Ledger::new();
        ledger.create_user("alice", 100).unwrap();
        assert_eq!(ledger.withdraw("alice", 30).unwrap(), 70);
        assert!(matches!(
            ledger.withdraw("alice", 71),
            Err(Error::InsufficientFunds)
        ));
        assert_eq!(ledger.balance("alice").unwrap(), 70);
        assert_eq!(ledger.withdraw("alice", 70).unwrap(), 0);
        assert!(matches!(
            ledger.withdraw("nobody", 1),
            Err(Error::NoSuchUser(_))
        ));
    }

    #[test]
    fn test_deposit_overflow() {
        let ledger = Ledger::new();
        ledger.create_user("rich", i32::MAX - 10).unwrap();
        assert_eq!(ledger.deposit("rich", 10).unwrap(), i32::MAX);
        assert!(matches!(ledger.deposit("rich", 1), Err(Error::Overflow)));
        assert_eq!(ledger.balance("rich").unwrap(), i32::MAX);
    }

    #[test]
    fn test_negative_amounts_refused() {
        let ledger = Ledger::new();
        ledger.create_user("alice", 10).unwrap();
        assert!(matches!(ledger.deposit("alice", -1), Err(Error::InvalidAmount(-1))));
        assert!(matches!(ledger.withdraw("alice", -5), Err(Error::InvalidAmount(-5))));
        assert!(matches!(ledger.create_user("bob", -1), Err(Error::InvalidAmount(-1))));
        assert_eq!(ledger.balance("alice").unwrap(), 10);
        assert!(!ledger.contains("bob"));
    }

    #[test]
    fn test_concurrent_withdrawals_never_overdraw() {
        let ledger = Arc::new(Ledger::new());
        ledger.create_user("alice", 1000).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    (0..200)
                        .filter(|_| ledger.withdraw("alice", 1).is_ok())
                        .count()
                })
            })
            .collect();

        let dispensed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(dispensed, 1000);
        assert_eq!(ledger.balance("alice").unwrap(), 0);
    }
}
