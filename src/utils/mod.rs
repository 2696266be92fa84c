//! Secure ATM/Bank protocol over a datagram relay.
//!
//! The ATM and the Bank share two symmetric keys provisioned by `init`: one
//! protects PINs stored on cards, the other authenticates and encrypts every
//! datagram exchanged through the router.

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod atm_client;
pub mod atm_session;
pub mod bank_server;
pub mod card;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod message_type;
pub mod operations;
pub mod transport;
pub mod validate_functions;

pub use error::{Error, Result};
