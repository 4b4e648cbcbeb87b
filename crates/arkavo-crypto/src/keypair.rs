//! Ephemeral X25519 key pairs.

use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

/// An X25519 key pair used for exactly one seal or unseal operation.
///
/// The secret half is zeroized when the pair is dropped
/// (`x25519_dalek::StaticSecret` implements `ZeroizeOnDrop`).
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair from the given RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a key pair from stored secret bytes.
    #[must_use]
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half as raw bytes.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Secret half as raw bytes, for persistence.
    ///
    /// The key store is the only intended caller; the bytes must go
    /// straight into the durable store, never into logs or the wire.
    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Borrow the secret for a key agreement.
    #[must_use]
    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material.
        f.debug_struct("EphemeralKeyPair").field("public", &self.public_bytes()).finish()
    }
}
