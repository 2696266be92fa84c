//! Bank-side command handling.
//!
//! Two entry points feed the same ledger: console lines typed by the
//! operator ([`Bank::handle_local`]) and encrypted datagrams relayed from
//! the ATM ([`Bank::handle_datagram`]). The caller serializes both onto one
//! dispatcher, so handlers take `&mut self`.

use tracing::{debug, warn};

use crate::card::CardStore;
use crate::crypto::{GCM_IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::frame::WireMessage;
use crate::keys::KeyMaterial;
use crate::ledger::Ledger;
use crate::message_type::{MessageRequest, MessageResponse};
use crate::operations::{BankOperation, Rejected, USAGE_DEPOSIT};

pub const TOO_RICH: &str = "Too rich for this program";
pub const NO_SUCH_USER: &str = "No such user";

/// The most recent request answered and its reply. Only this request can
/// be resent by the ATM, which waits for each reply before moving on.
#[derive(Debug)]
struct LastReply {
    iv: [u8; GCM_IV_SIZE],
    tag: [u8; TAG_SIZE],
    reply: Vec<u8>,
}

#[derive(Debug)]
pub struct Bank {
    keys: KeyMaterial,
    ledger: Ledger,
    cards: CardStore,
    high_water: u64,
    last: Option<LastReply>,
}

impl Bank {
    pub fn new(keys: KeyMaterial, cards: CardStore) -> Self {
        Self {
            keys,
            ledger: Ledger::new(),
            cards,
            high_water: 0,
            last: None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Highest request sequence number executed so far; 0 before the first.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Run one console line. `None` for a blank line.
    pub fn handle_local(&mut self, line: &str) -> Option<String> {
        let op = match BankOperation::parse(line) {
            Ok(op) => op,
            Err(Rejected::Empty) => return None,
            Err(rejected) => return rejected.message().map(str::to_string),
        };

        let reply = match op {
            BankOperation::CreateUser { user, pin, balance } => self.create_user(&user, &pin, balance),
            BankOperation::Deposit { user, amount } => match self.ledger.deposit(&user, amount) {
                Ok(_) => format!("${} added to {}'s account", amount, user),
                Err(Error::NoSuchUser(_)) => NO_SUCH_USER.to_string(),
                Err(Error::Overflow) => TOO_RICH.to_string(),
                Err(_) => USAGE_DEPOSIT.to_string(),
            },
            BankOperation::Balance { user } => match self.ledger.balance(&user) {
                Ok(balance) => format!("${}", balance),
                Err(_) => NO_SUCH_USER.to_string(),
            },
        };
        Some(reply)
    }

    /// The card is written before the ledger entry, so a user never exists
    /// without a card.
    fn create_user(&mut self, user: &str, pin: &str, balance: i32) -> String {
        if self.ledger.contains(user) {
            return format!("Error: user {} already exists", user);
        }
        if let Err(e) = self.cards.create_card(user, pin, self.keys.pin_key()) {
            warn!(user, error = %e, "card creation failed");
            return format!("Error creating card file for {}", user);
        }
        match self.ledger.create_user(user, balance) {
            Ok(()) => format!("Created user {}", user),
            Err(_) => format!("Error: user {} already exists", user),
        }
    }

    /// Handle one datagram from the ATM and return the reply datagram.
    ///
    /// Malformed or unauthenticated frames produce an error and no reply;
    /// the caller drops them. Nothing is executed for such a frame.
    ///
    /// Each request runs at most once. A request must carry a sequence
    /// number above every one executed before; the one exception is an
    /// identical resend of the last request, which gets the same reply.
    pub fn handle_datagram(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        let request = WireMessage::decode(bytes)?;

        let plaintext = match request.open(self.keys.msg_key()) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("dropping request that failed authentication");
                return Err(e);
            }
        };

        let sequence = request.sequence();
        if sequence <= self.high_water {
            return match &self.last {
                Some(last) if last.iv == request.iv && last.tag == request.tag => {
                    debug!(sequence, "repeated request, resending last reply");
                    Ok(last.reply.clone())
                }
                _ => {
                    warn!(sequence, high_water = self.high_water, "dropping stale request");
                    Err(Error::Replayed(sequence))
                }
            };
        }

        let response = match std::str::from_utf8(&plaintext).ok().and_then(MessageRequest::parse) {
            Some(parsed) => self.respond(&parsed),
            None => MessageResponse::InvalidCommand,
        };

        let reply = WireMessage::seal_reply(response.to_string().as_bytes(), self.keys.msg_key(), &request)?.encode()?;
        self.high_water = sequence;
        self.last = Some(LastReply {
            iv: request.iv,
            tag: request.tag,
            reply: reply.clone(),
        });
        Ok(reply)
    }

    fn respond(&self, request: &MessageRequest) -> MessageResponse {
        match request {
            MessageRequest::BeginSession { user } if self.ledger.contains(user) => MessageResponse::Success,
            MessageRequest::BeginSession { .. } => MessageResponse::NoSuchUser,
            MessageRequest::Withdraw { user, amount } => match self.ledger.withdraw(user, *amount) {
                Ok(_) => MessageResponse::Dispensed(*amount),
                Err(Error::InsufficientFunds) => MessageResponse::InsufficientFunds,
                Err(Error::NoSuchUser(_)) => MessageResponse::NoSuchUser,
                Err(_) => MessageResponse::InvalidCommand,
            },
            MessageRequest::Balance { user } => match self.ledger.balance(user) {
                Ok(balance) => MessageResponse::Balance(balance),
                Err(_) => MessageResponse::NoSuchUser,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RequestSequencer;
    use crate::keys::KEY_FILE_SIZE;
    use crate::operations::USAGE_CREATE_USER;

    fn keys() -> KeyMaterial {
        KeyMaterial::from_bytes(&[0x5A; KEY_FILE_SIZE]).unwrap()
    }

    fn bank(dir: &tempfile::TempDir) -> Bank {
        Bank::new(keys(), CardStore::new(dir.path()))
    }

    /// Seals requests the way the ATM does.
    struct Client(RequestSequencer);

    impl Client {
        fn starting_after(last: u64) -> Self {
            Client(RequestSequencer::starting_after(last).unwrap())
        }

        fn seal(&mut self, text: &str) -> WireMessage {
            let iv = self.0.next_iv().unwrap();
            WireMessage::seal_request(text.as_bytes(), keys().msg_key(), &iv).unwrap()
        }
    }

    fn reply_text(reply: &[u8], request: &WireMessage) -> String {
        let opened = WireMessage::decode(reply)
            .unwrap()
            .open_reply(keys().msg_key(), request)
            .unwrap();
        String::from_utf8(opened.to_vec()).unwrap()
    }

    #[test]
    fn test_console_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);

        assert_eq!(bank.handle_local("create-user alice 1234 100").unwrap(), "Created user alice");
        assert!(dir.path().join("alice.card").exists());
        assert_eq!(
            bank.handle_local("create-user alice 9999 5").unwrap(),
            "Error: user alice already exists"
        );
        assert_eq!(bank.handle_local("deposit alice 5").unwrap(), "$5 added to alice's account");
        assert_eq!(bank.handle_local("balance alice").unwrap(), "$105");
        assert_eq!(bank.handle_local("balance bob").unwrap(), "No such user");
        assert_eq!(bank.handle_local("deposit bob 5").unwrap(), "No such user");
        assert_eq!(bank.handle_local("create-user bob 12 5").unwrap(), USAGE_CREATE_USER);
        assert_eq!(bank.handle_local("launch rockets").unwrap(), "Invalid command");
        assert_eq!(bank.handle_local("\n"), None);
    }

    #[test]
    fn test_deposit_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        bank.handle_local("create-user rich 1234 2147483000").unwrap();
        assert_eq!(bank.handle_local("deposit rich 1000").unwrap(), TOO_RICH);
        assert_eq!(bank.handle_local("balance rich").unwrap(), "$2147483000");
    }

    #[test]
    fn test_stale_card_blocks_creation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("carol.card"), [0u8; 32]).unwrap();
        let mut bank = bank(&dir);
        assert_eq!(
            bank.handle_local("create-user carol 1234 10").unwrap(),
            "Error creating card file for carol"
        );
        assert!(!bank.ledger().contains("carol"));
    }

    #[test]
    fn test_remote_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let cases = [
            ("begin-session alice", "success"),
            ("begin-session mallory", "No such user"),
            ("withdraw alice 30", "$30 dispensed"),
            ("withdraw alice 71", "Insufficient funds"),
            ("balance alice", "$70"),
            ("balance mallory", "No such user"),
            ("create-user eve 1234 100", "Invalid command"),
        ];
        for (text, expected) in cases {
            let request = client.seal(text);
            let reply = bank.handle_datagram(&request.encode().unwrap()).unwrap();
            assert_eq!(reply_text(&reply, &request), expected, "{}", text);
        }
        assert_eq!(bank.ledger().balance("alice").unwrap(), 70);
        assert_eq!(bank.high_water(), 7);
    }

    #[test]
    fn test_reply_bound_to_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let first = client.seal("balance alice");
        let reply = bank.handle_datagram(&first.encode().unwrap()).unwrap();
        let second = client.seal("balance alice");

        let parsed = WireMessage::decode(&reply).unwrap();
        assert!(parsed.open_reply(keys().msg_key(), &first).is_ok());
        assert!(matches!(
            parsed.open_reply(keys().msg_key(), &second),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_resent_request_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let frame = client.seal("withdraw alice 40").encode().unwrap();
        let first = bank.handle_datagram(&frame).unwrap();
        let second = bank.handle_datagram(&frame).unwrap();
        assert_eq!(first, second);
        assert_eq!(bank.ledger().balance("alice").unwrap(), 60);
    }

    #[test]
    fn test_captured_withdraw_replayed_later() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let captured = client.seal("withdraw alice 30").encode().unwrap();
        bank.handle_datagram(&captured).unwrap();
        for _ in 0..4 {
            let request = client.seal("balance alice");
            bank.handle_datagram(&request.encode().unwrap()).unwrap();
        }

        assert!(matches!(bank.handle_datagram(&captured), Err(Error::Replayed(1))));
        assert_eq!(bank.ledger().balance("alice").unwrap(), 70);
        assert_eq!(bank.high_water(), 5);
    }

    #[test]
    fn test_lower_sequence_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let mut current = Client::starting_after(1_000);
        bank.handle_datagram(&current.seal("balance alice").encode().unwrap()).unwrap();

        // Authentic, never seen, but numbered below what already ran.
        let mut behind = Client::starting_after(10);
        let frame = behind.seal("withdraw alice 100").encode().unwrap();
        assert!(matches!(bank.handle_datagram(&frame), Err(Error::Replayed(11))));
        assert_eq!(bank.ledger().balance("alice").unwrap(), 100);
    }

    #[test]
    fn test_forged_ciphertext_under_last_iv() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let request = client.seal("balance alice");
        bank.handle_datagram(&request.encode().unwrap()).unwrap();

        let mut forged = request.clone();
        forged.ciphertext[0] ^= 0x01;
        assert!(matches!(
            bank.handle_datagram(&forged.encode().unwrap()),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_tampered_request_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let mut client = Client::starting_after(0);
        bank.handle_local("create-user alice 1234 100").unwrap();

        let mut frame = client.seal("withdraw alice 100").encode().unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x80;
        assert!(matches!(bank.handle_datagram(&frame), Err(Error::Integrity)));
        assert!(matches!(bank.handle_datagram(&frame[..10]), Err(Error::Frame(_))));
        assert_eq!(bank.ledger().balance("alice").unwrap(), 100);
        assert_eq!(bank.high_water(), 0);
    }

    #[test]
    fn test_wrong_key_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = bank(&dir);
        let foreign = KeyMaterial::from_bytes(&[0x01; KEY_FILE_SIZE]).unwrap();
        let frame = WireMessage::seal(b"balance alice", foreign.msg_key())
            .unwrap()
            .encode()
            .unwrap();
        assert!(bank.handle_datagram(&frame).unwrap_err().is_integrity());
    }
}
