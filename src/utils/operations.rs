//! Console commands typed at the ATM and at the Bank.

use crate::validate_functions::{validate_amount, validate_pin, validate_username};

pub const USAGE_BEGIN_SESSION: &str = "Usage: begin-session <user-name>";
pub const USAGE_WITHDRAW: &str = "Usage: withdraw <amt>";
pub const USAGE_BALANCE: &str = "Usage: balance";
pub const USAGE_END_SESSION: &str = "Usage: end-session";
pub const USAGE_CREATE_USER: &str = "Usage: create-user <user-name> <pin> <balance>";
pub const USAGE_DEPOSIT: &str = "Usage: deposit <user-name> <amt>";
pub const USAGE_BANK_BALANCE: &str = "Usage: balance <user-name>";
pub const INVALID_COMMAND: &str = "Invalid command";

/// Why a console line was not turned into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Blank line. Nothing to print.
    Empty,
    /// Known verb, bad arguments. Carries the usage line.
    Usage(&'static str),
    /// Unknown verb.
    Invalid,
}

impl Rejected {
    pub fn message(self) -> Option<&'static str> {
        match self {
            Rejected::Empty => None,
            Rejected::Usage(usage) => Some(usage),
            Rejected::Invalid => Some(INVALID_COMMAND),
        }
    }
}

/// ATM console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    BeginSession(String),
    Withdraw(i32),
    Balance,
    EndSession,
}

impl Operation {
    pub fn parse(line: &str) -> Result<Self, Rejected> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, rest)) = args.split_first() else {
            return Err(Rejected::Empty);
        };

        match *verb {
            "begin-session" => match rest {
                [user] if validate_username(user) => Ok(Operation::BeginSession(user.to_string())),
                _ => Err(Rejected::Usage(USAGE_BEGIN_SESSION)),
            },
            "withdraw" => match rest {
                [amount] => validate_amount(amount)
                    .map(Operation::Withdraw)
                    .ok_or(Rejected::Usage(USAGE_WITHDRAW)),
                _ => Err(Rejected::Usage(USAGE_WITHDRAW)),
            },
            "balance" if rest.is_empty() => Ok(Operation::Balance),
            "balance" => Err(Rejected::Usage(USAGE_BALANCE)),
            "end-session" if rest.is_empty() => Ok(Operation::EndSession),
            "end-session" => Err(Rejected::Usage(USAGE_END_SESSION)),
            _ => Err(Rejected::Invalid),
        }
    }
}

/// Bank console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankOperation {
    CreateUser {
        user: String,
        pin: String,
        balance: i32,
    },
    Deposit {
        user: String,
        amount: i32,
    },
    Balance {
        user: String,
    },
}

impl BankOperation {
    /// Every `create-user` violation gets the same usage line, whichever
    /// argument was wrong.
    pub fn parse(line: &str) -> Result<Self, Rejected> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, rest)) = args.split_first() else {
            return Err(Rejected::Empty);
        };

        match *verb {
            "create-user" => match rest {
                [user, pin, balance] if validate_username(user) && validate_pin(pin) => {
                    validate_amount(balance)
                        .map(|balance| BankOperation::CreateUser {
                            user: user.to_string(),
                            pin: pin.to_string(),
                            balance,
                        })
                        .ok_or(Rejected::Usage(USAGE_CREATE_USER))
                }
                _ => Err(Rejected::Usage(USAGE_CREATE_USER)),
            },
            "deposit" => match rest {
                [user, amount] if validate_username(user) => validate_amount(amount)
                    .map(|amount| BankOperation::Deposit {
                        user: user.to_string(),
                        amount,
                    })
                    .ok_or(Rejected::Usage(USAGE_DEPOSIT)),
                _ => Err(Rejected::Usage(USAGE_DEPOSIT)),
            },
            "balance" => match rest {
                [user] if validate_username(user) => Ok(BankOperation::Balance {
                    user: user.to_string(),
                }),
                _ => Err(Rejected::Usage(USAGE_BANK_BALANCE)),
            },
            _ => Err(Rejected::Invalid),
        }
    }
}
