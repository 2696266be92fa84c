//! ATM-side login state.
//!
//! States: `LoggedOut` and `LoggedIn(user)`, at most one user at a time.
//! Next to the state sits a per-username failure counter. A username whose
//! counter has reached the ceiling is locked: no login for it succeeds until
//! the counter is reset. Counters for users the Bank confirmed live as long
//! as the ATM process; counters for names the Bank denied are capped at
//! [`MAX_UNKNOWN_USERS`], oldest dropped first.

use std::collections::{HashMap, VecDeque};

use tracing::{info, warn};

/// Default failure ceiling.
pub const MAX_ATTEMPTS: u32 = 3;

/// Default cap on tracked usernames the Bank reported as unknown.
pub const MAX_UNKNOWN_USERS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn(String),
}

/// Illegal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    AlreadyLoggedIn,
    NotLoggedIn,
    Locked,
}

/// Failed login counts, keyed by username.
#[derive(Debug)]
pub struct LoginAttempts {
    counts: HashMap<String, u32>,
    unknown: VecDeque<String>,
    unknown_capacity: usize,
}

impl Default for LoginAttempts {
    fn default() -> Self {
        Self::with_unknown_capacity(MAX_UNKNOWN_USERS)
    }
}

impl LoginAttempts {
    pub fn with_unknown_capacity(capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            unknown: VecDeque::new(),
            unknown_capacity: capacity.max(1),
        }
    }

    pub fn get(&self, user: &str) -> u32 {
        self.counts.get(user).copied().unwrap_or(0)
    }

    /// Usernames with a counter.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Failure for a user the Bank confirmed. Returns the new count.
    pub fn record_failure(&mut self, user: &str) -> u32 {
        self.unknown.retain(|name| name != user);
        self.bump(user)
    }

    /// Failure for a name the Bank does not know. Returns the new count.
    pub fn record_unknown(&mut self, user: &str) -> u32 {
        if !self.counts.contains_key(user) {
            while self.unknown.len() >= self.unknown_capacity {
                let Some(oldest) = self.unknown.pop_front() else {
                    break;
                };
                self.counts.remove(&oldest);
            }
            self.unknown.push_back(user.to_string());
        }
        self.bump(user)
    }

    fn bump(&mut self, user: &str) -> u32 {
        let count = self.counts.entry(user.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&mut self, user: &str) {
        self.counts.remove(user);
        self.unknown.retain(|name| name != user);
    }
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    attempts: LoginAttempts,
    max_attempts: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl Session {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_attempts(max_attempts, LoginAttempts::default())
    }

    pub fn with_attempts(max_attempts: u32, attempts: LoginAttempts) -> Self {
        Self {
            state: SessionState::LoggedOut,
            attempts,
            max_attempts,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&str> {
        match &self.state {
            SessionState::LoggedIn(user) => Some(user),
            SessionState::LoggedOut => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn attempts(&self, user: &str) -> u32 {
        self.attempts.get(user)
    }

    /// Usernames currently holding a failure count.
    pub fn tracked_users(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_locked(&self, user: &str) -> bool {
        self.attempts.get(user) >= self.max_attempts
    }

    /// Count a failed login. Returns true when this failure locks the user.
    pub fn record_failure(&mut self, user: &str) -> bool {
        let count = self.attempts.record_failure(user);
        self.check_lock(user, count)
    }

    /// Count a login for a name the Bank does not know.
    pub fn record_unknown(&mut self, user: &str) -> bool {
        let count = self.attempts.record_unknown(user);
        self.check_lock(user, count)
    }

    fn check_lock(&self, user: &str, count: u32) -> bool {
        let locked = count >= self.max_attempts;
        if locked {
            warn!(user, count, "username locked");
        }
        locked
    }

    /// `LoggedOut -> LoggedIn(user)`. The caller has already confirmed the
    /// user with the Bank and verified the PIN.
    pub fn log_in(&mut self, user: &str) -> Result<(), SessionError> {
        if self.is_logged_in() {
            return Err(SessionError::AlreadyLoggedIn);
        }
        if self.is_locked(user) {
            return Err(SessionError::Locked);
        }
        self.state = SessionState::LoggedIn(user.to_string());
        info!(user, "session opened");
        Ok(())
    }

    /// `LoggedIn(user) -> LoggedOut`, clearing that user's failure count.
    pub fn log_out(&mut self) -> Result<String, SessionError> {
        match std::mem::replace(&mut self.state, SessionState::LoggedOut) {
            SessionState::LoggedIn(user) => {
                self.attempts.reset(&user);
                info!(user = user.as_str(), "session closed");
                Ok(user)
            }
            SessionState::LoggedOut => Err(SessionError::NotLoggedIn),
        }
    }
}
