use core::fmt;

use crate::validate_functions::{validate_amount, validate_username};

/// Plaintext of an ATM -> Bank frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRequest {
    BeginSession { user: String },
    Withdraw { user: String, amount: i32 },
    Balance { user: String },
}

/// Plaintext of a Bank -> ATM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageResponse {
    Success,
    NoSuchUser,
    InsufficientFunds,
    Dispensed(i32),
    Balance(i32),
    InvalidCommand,
}

impl MessageRequest {
    /// Parse a decrypted request. `None` for anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let args: Vec<&str> = text.split_whitespace().collect();
        let request = match args.as_slice() {
            ["begin-session", user] => MessageRequest::BeginSession {
                user: user.to_string(),
            },
            ["withdraw", user, amount] => MessageRequest::Withdraw {
                user: user.to_string(),
                amount: validate_amount(amount)?,
            },
            ["balance", user] => MessageRequest::Balance {
                user: user.to_string(),
            },
            _ => return None,
        };
        validate_username(request.user()).then_some(request)
    }

    pub fn user(&self) -> &str {
        match self {
            MessageRequest::BeginSession { user }
            | MessageRequest::Withdraw { user, .. }
            | MessageRequest::Balance { user } => user,
        }
    }
}

impl MessageResponse {
    /// Parse a decrypted response against the known literals.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_end();
        match text {
            "success" => return Some(MessageResponse::Success),
            "No such user" => return Some(MessageResponse::NoSuchUser),
            "Insufficient funds" => return Some(MessageResponse::InsufficientFunds),
            "Invalid command" => return Some(MessageResponse::InvalidCommand),
            _ => {}
        }

        let amount = text.strip_prefix('$')?;
        match amount.strip_suffix(" dispensed") {
            Some(dispensed) => validate_amount(dispensed).map(MessageResponse::Dispensed),
            None => validate_amount(amount).map(MessageResponse::Balance),
        }
    }

    /// Whether the Bank could have sent this in answer to `request`.
    pub fn answers(&self, request: &MessageRequest) -> bool {
        match (request, self) {
            (_, MessageResponse::NoSuchUser) => true,
            (MessageRequest::BeginSession { .. }, MessageResponse::Success) => true,
            (MessageRequest::Withdraw { amount, .. }, MessageResponse::Dispensed(dispensed)) => dispensed == amount,
            (MessageRequest::Withdraw { .. }, MessageResponse::InsufficientFunds) => true,
            (MessageRequest::Balance { .. }, MessageResponse::Balance(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MessageRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageRequest::BeginSession { user } => write!(f, "begin-session {}", user),
            MessageRequest::Withdraw { user, amount } => write!(f, "withdraw {} {}", user, amount),
            MessageRequest::Balance { user } => write!(f, "balance {}", user),
        }
    }
}

impl fmt::Display for MessageResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageResponse::Success => write!(f, "success"),
            MessageResponse::NoSuchUser => write!(f, "No such user"),
            MessageResponse::InsufficientFunds => write!(f, "Insufficient funds"),
            MessageResponse::Dispensed(amount) => write!(f, "${} dispensed", amount),
            MessageResponse::Balance(balance) => write!(f, "${}", balance),
            MessageResponse::InvalidCommand => write!(f, "Invalid command"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_text() {
        let req = MessageRequest::Withdraw {
            user: "alice".into(),
            amount: 30,
        };
        assert_eq!(req.to_string(), "withdraw alice 30");
        assert_eq!(MessageRequest::parse("withdraw alice 30"), Some(req));
        assert_eq!(
            MessageRequest::parse("begin-session bob\n"),
            Some(MessageRequest::BeginSession { user: "bob".into() })
        );
    }

    #[test]
    fn test_request_rejects_malformed() {
        assert_eq!(MessageRequest::parse(""), None);
        assert_eq!(MessageRequest::parse("withdraw alice"), None);
        assert_eq!(MessageRequest::parse("withdraw alice -5"), None);
        assert_eq!(MessageRequest::parse("withdraw alice 99999999999"), None);
        assert_eq!(MessageRequest::parse("balance al1ce"), None);
        assert_eq!(MessageRequest::parse("balance alice extra"), None);
        assert_eq!(MessageRequest::parse("create-user eve 1234 10"), None);
        assert_eq!(MessageRequest::parse("deposit eve 10"), None);
    }

    #[test]
    fn test_response_literals() {
        assert_eq!(MessageResponse::Dispensed(30).to_string(), "$30 dispensed");
        assert_eq!(MessageResponse::Balance(70).to_string(), "$70");
        assert_eq!(
            MessageResponse::parse("$30 dispensed"),
            Some(MessageResponse::Dispensed(30))
        );
        assert_eq!(MessageResponse::parse("$70"), Some(MessageResponse::Balance(70)));
        assert_eq!(
            MessageResponse::parse("Insufficient funds"),
            Some(MessageResponse::InsufficientFunds)
        );
        assert_eq!(MessageResponse::parse("success"), Some(MessageResponse::Success));
        assert_eq!(MessageResponse::parse("No such user"), Some(MessageResponse::NoSuchUser));
        assert_eq!(MessageResponse::parse("$"), None);
        assert_eq!(MessageResponse::parse("$-1"), None);
        assert_eq!(MessageResponse::parse("hello"), None);
    }

    #[test]
    fn test_response_must_fit_request() {
        let withdraw = MessageRequest::Withdraw {
            user: "alice".into(),
            amount: 30,
        };
        let balance = MessageRequest::Balance { user: "alice".into() };
        let begin = MessageRequest::BeginSession { user: "alice".into() };

        assert!(MessageResponse::Dispensed(30).answers(&withdraw));
        assert!(MessageResponse::InsufficientFunds.answers(&withdraw));
        assert!(!MessageResponse::Dispensed(500).answers(&withdraw));
        assert!(!MessageResponse::Balance(30).answers(&withdraw));

        assert!(MessageResponse::Balance(70).answers(&balance));
        assert!(!MessageResponse::Dispensed(500).answers(&balance));
        assert!(!MessageResponse::Success.answers(&balance));

        assert!(MessageResponse::Success.answers(&begin));
        assert!(MessageResponse::NoSuchUser.answers(&begin));
        assert!(!MessageResponse::Balance(70).answers(&begin));
        assert!(!MessageResponse::InvalidCommand.answers(&begin));
    }
}
