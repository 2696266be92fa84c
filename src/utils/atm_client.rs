//! ATM command dispatcher.
//!
//! Each console line runs to completion before the next is read: parse,
//! check session state, at most one Bank round trip, then the lines to
//! print. PINs are checked here against the user's card and never leave
//! the ATM.
//!
//! A reply counts only if it opens against the request just sent and is a
//! possible answer to it; anything else is rejected without effect.

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::atm_session::{Session, MAX_ATTEMPTS};
use crate::card::CardStore;
use crate::error::{Error, Result};
use crate::frame::{RequestSequencer, WireMessage};
use crate::keys::KeyMaterial;
use crate::message_type::{MessageRequest, MessageResponse};
use crate::operations::{Operation, Rejected};
use crate::transport::Transport;

pub const PIN_PROMPT: &str = "PIN? ";
pub const ALREADY_LOGGED_IN: &str = "A user is already logged in";
pub const NO_USER_LOGGED_IN: &str = "No user logged in";
pub const NO_SUCH_USER: &str = "No such user";
pub const NOT_AUTHORIZED: &str = "Not authorized";
pub const AUTHORIZED: &str = "Authorized";
pub const USER_LOGGED_OUT: &str = "User logged out";
pub const UNABLE_TO_REACH_BANK: &str = "Unable to reach bank";
pub const RESPONSE_REJECTED: &str = "Bank response rejected";

pub fn locked_message(user: &str) -> String {
    format!("Too many attempts. {}'s card file has been locked.", user)
}

fn link_failure(e: &Error) -> &'static str {
    match e {
        Error::Timeout(_) | Error::Io(_) => UNABLE_TO_REACH_BANK,
        _ => RESPONSE_REJECTED,
    }
}

pub struct Atm<T> {
    keys: KeyMaterial,
    cards: CardStore,
    link: T,
    session: Session,
    sequencer: RequestSequencer,
}

impl<T: Transport> Atm<T> {
    pub fn new(keys: KeyMaterial, cards: CardStore, link: T) -> Result<Self> {
        Self::with_max_attempts(keys, cards, link, MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(keys: KeyMaterial, cards: CardStore, link: T, max_attempts: u32) -> Result<Self> {
        Ok(Self {
            keys,
            cards,
            link,
            session: Session::new(max_attempts),
            sequencer: RequestSequencer::from_clock()?,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    /// `ATM: ` or `ATM (<user>): `.
    pub fn prompt(&self) -> String {
        match self.session.current_user() {
            Some(user) => format!("ATM ({}): ", user),
            None => "ATM: ".to_string(),
        }
    }

    /// Run one console line and return the lines to print.
    ///
    /// `read_pin` is called at most once, only after the Bank has confirmed
    /// the user. `None` from it counts as a wrong PIN.
    pub fn process_command<F>(&mut self, line: &str, read_pin: F) -> Vec<String>
    where
        F: FnOnce() -> Option<Zeroizing<String>>,
    {
        let op = match Operation::parse(line) {
            Ok(op) => op,
            Err(Rejected::Empty) => return Vec::new(),
            Err(rejected) => return rejected.message().map(str::to_string).into_iter().collect(),
        };

        match op {
            Operation::BeginSession(user) => self.begin_session(&user, read_pin),
            Operation::Withdraw(amount) => self.remote(|user| MessageRequest::Withdraw { user, amount }),
            Operation::Balance => self.remote(|user| MessageRequest::Balance { user }),
            Operation::EndSession => match self.session.log_out() {
                Ok(_) => vec![USER_LOGGED_OUT.to_string()],
                Err(_) => vec![NO_USER_LOGGED_IN.to_string()],
            },
        }
    }

    fn begin_session<F>(&mut self, user: &str, read_pin: F) -> Vec<String>
    where
        F: FnOnce() -> Option<Zeroizing<String>>,
    {
        if self.session.is_logged_in() {
            return vec![ALREADY_LOGGED_IN.to_string()];
        }
        if self.session.is_locked(user) {
            debug!(user, "refusing locked username");
            return vec![locked_message(user)];
        }

        let request = MessageRequest::BeginSession { user: user.to_string() };
        match self.exchange(&request) {
            Ok(MessageResponse::Success) => {}
            Ok(MessageResponse::NoSuchUser) => {
                let mut lines = vec![NO_SUCH_USER.to_string()];
                if self.session.record_unknown(user) {
                    lines.push(locked_message(user));
                }
                return lines;
            }
            Ok(other) => {
                warn!(response = %other, "unexpected reply to begin-session");
                return vec![RESPONSE_REJECTED.to_string()];
            }
            Err(e) => {
                warn!(error = %e, "begin-session aborted");
                return vec![link_failure(&e).to_string()];
            }
        }

        let verified = match read_pin() {
            Some(pin) => self.cards.verify_pin(user, pin.trim_end_matches(['\r', '\n']), self.keys.pin_key()),
            None => Ok(false),
        };
        match verified {
            Ok(true) => match self.session.log_in(user) {
                Ok(()) => vec![AUTHORIZED.to_string()],
                Err(_) => vec![locked_message(user)],
            },
            Ok(false) => self.fail_login(user, vec![NOT_AUTHORIZED.to_string()]),
            Err(e) => {
                warn!(user, error = %e, "card unreadable");
                let lines = vec![format!("Unable to access {}'s card", user), NOT_AUTHORIZED.to_string()];
                self.fail_login(user, lines)
            }
        }
    }

    fn fail_login(&mut self, user: &str, mut lines: Vec<String>) -> Vec<String> {
        if self.session.record_failure(user) {
            lines.push(locked_message(user));
        }
        lines
    }

    /// Send a request on behalf of the logged-in user and print the reply.
    fn remote<F>(&mut self, build: F) -> Vec<String>
    where
        F: FnOnce(String) -> MessageRequest,
    {
        let Some(user) = self.session.current_user() else {
            return vec![NO_USER_LOGGED_IN.to_string()];
        };
        let request = build(user.to_string());
        match self.exchange(&request) {
            Ok(response) => vec![response.to_string()],
            Err(e) => {
                warn!(error = %e, "request aborted");
                vec![link_failure(&e).to_string()]
            }
        }
    }

    /// Seal, send, receive, authenticate and parse one exchange.
    fn exchange(&mut self, request: &MessageRequest) -> Result<MessageResponse> {
        let plaintext = Zeroizing::new(request.to_string());
        let iv = self.sequencer.next_iv()?;
        let sealed = WireMessage::seal_request(plaintext.as_bytes(), self.keys.msg_key(), &iv)?;

        let reply = self.link.round_trip(&sealed.encode()?)?;
        let opened = WireMessage::decode(&reply)?.open_reply(self.keys.msg_key(), &sealed)?;
        let text = std::str::from_utf8(&opened)
            .map_err(|_| Error::UnexpectedResponse("reply is not UTF-8".into()))?;
        match MessageResponse::parse(text) {
            Some(response) if response.answers(request) => Ok(response),
            _ => Err(Error::UnexpectedResponse(text.to_string())),
        }
    }
}
