//! Property-based tests using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use proptest::prelude::*;
use utils::{
    atm_session::{Session, SessionError},
    crypto::{self, GCM_IV_SIZE, KEY_SIZE},
    frame::{WireMessage, HEADER_SIZE, MAX_FRAME_LENGTH, MAX_PLAINTEXT_LENGTH},
    ledger::Ledger,
    Error,
};

fn arb_pin() -> impl Strategy<Value = String> {
    "[0-9]{4}"
}

proptest! {
    #[test]
    fn gcm_round_trip(
        key in any::<[u8; KEY_SIZE]>(),
        iv in any::<[u8; GCM_IV_SIZE]>(),
        message in prop::collection::vec(any::<u8>(), 0..=MAX_PLAINTEXT_LENGTH),
    ) {
        let (ciphertext, tag) = crypto::gcm_encrypt(&message, &key, &iv).unwrap();
        prop_assert_eq!(ciphertext.len(), message.len());
        prop_assert_eq!(crypto::gcm_decrypt(&ciphertext, &key, &iv, &tag).unwrap(), message);
    }

    #[test]
    fn any_single_byte_tamper_fails(
        key in any::<[u8; KEY_SIZE]>(),
        message in prop::collection::vec(any::<u8>(), 1..256),
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let wire = WireMessage::seal(&message, &key).unwrap().encode().unwrap();
        let i = HEADER_SIZE + position.index(wire.len() - HEADER_SIZE);
        let mut bad = wire.clone();
        bad[i] ^= mask;

        let parsed = WireMessage::decode(&bad).unwrap();
        for _ in 0..2 {
            prop_assert!(matches!(parsed.open(&key), Err(Error::Integrity)));
        }
    }

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..MAX_FRAME_LENGTH + 64)) {
        let _ = WireMessage::decode(&bytes);
    }

    #[test]
    fn cbc_is_deterministic_per_iv(
        key in any::<[u8; KEY_SIZE]>(),
        iv in any::<[u8; 16]>(),
        pin in arb_pin(),
        other in arb_pin(),
    ) {
        let first = crypto::cbc_encrypt_block(pin.as_bytes(), &key, &iv).unwrap();
        let second = crypto::cbc_encrypt_block(pin.as_bytes(), &key, &iv).unwrap();
        prop_assert_eq!(first, second);

        if other != pin {
            let third = crypto::cbc_encrypt_block(other.as_bytes(), &key, &iv).unwrap();
            prop_assert_ne!(first, third);
        }
    }

    #[test]
    fn deposit_then_withdraw_is_neutral(initial in 0..=i32::MAX / 2, fraction in 0.0f64..=1.0) {
        let amount = (f64::from(initial) * fraction) as i32;
        let ledger = Ledger::new();
        ledger.create_user("alice", initial).unwrap();

        ledger.deposit("alice", amount).unwrap();
        ledger.withdraw("alice", amount).unwrap();
        prop_assert_eq!(ledger.balance("alice").unwrap(), initial);
    }

    #[test]
    fn overdraw_leaves_balance(initial in 0..i32::MAX) {
        let ledger = Ledger::new();
        ledger.create_user("bob", initial).unwrap();

        prop_assert!(matches!(
            ledger.withdraw("bob", initial + 1),
            Err(Error::InsufficientFunds)
        ));
        prop_assert_eq!(ledger.balance("bob").unwrap(), initial);
    }

    #[test]
    fn locked_at_ceiling(failures in 3u32..20) {
        let mut session = Session::new(3);
        for _ in 0..failures {
            session.record_failure("bob");
        }
        prop_assert!(session.is_locked("bob"));
        prop_assert_eq!(session.log_in("bob"), Err(SessionError::Locked));
        prop_assert!(session.log_in("alice").is_ok());
    }
}
