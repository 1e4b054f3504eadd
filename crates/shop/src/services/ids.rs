//! Purchase IDs and access keys.
//!
//! The purchase ID alphabet leaves out easily confused characters (`0`/`O`,
//! `1`/`I`/`J`). Keys are 16 characters of a 57-symbol alphabet, about
//! 93 bits.

use rand::seq::IndexedRandom;

use voucher_store_core::{AccessKey, PaymentKey, PurchaseId};

/// Alphabet for purchase IDs.
pub const PURCHASE_ID_ALPHABET: &[u8] = b"ABCDEFGHKLMNPQRSTUVWXYZ23456789";

/// Length of a purchase ID.
pub const PURCHASE_ID_LENGTH: usize = 6;

/// Alphabet for access and payment keys.
pub const KEY_ALPHABET: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHKLMNPQRSTUVWXYZ123456789";

/// Length of access and payment keys.
pub const KEY_LENGTH: usize = 16;

/// Generates identifiers for new purchases.
pub trait IdSource: Send + Sync {
    /// A candidate purchase ID. May collide with an existing one.
    fn purchase_id(&self) -> PurchaseId;

    /// A fresh access key.
    fn access_key(&self) -> AccessKey;

    /// A fresh payment key.
    fn payment_key(&self) -> PaymentKey;
}

/// Thread-local RNG backed [`IdSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn purchase_id(&self) -> PurchaseId {
        PurchaseId::new(random_string(PURCHASE_ID_ALPHABET, PURCHASE_ID_LENGTH))
    }

    fn access_key(&self) -> AccessKey {
        AccessKey::new(random_string(KEY_ALPHABET, KEY_LENGTH))
    }

    fn payment_key(&self) -> PaymentKey {
        PaymentKey::new(random_string(KEY_ALPHABET, KEY_LENGTH))
    }
}

fn random_string(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .filter_map(|_| alphabet.choose(&mut rng).copied().map(char::from))
        .collect()
}
