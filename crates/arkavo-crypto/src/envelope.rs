//! Sealed message envelope.
//!
//! Fixed binary layout, all fields at constant offsets:
//!
//! ```text
//! [key hint: 32 bytes][sender public: 32 bytes][nonce: 24 bytes][ciphertext]
//! ```
//!
//! `key hint` names the recipient key the message was sealed against; the
//! receiving key store consumes exactly that one-time key before
//! unsealing. `sender public` is the sender's ephemeral X25519 key for
//! the key agreement. The ciphertext includes the 16-byte Poly1305 tag.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use x25519_dalek::PublicKey;
use zeroize::Zeroize;

use crate::{error::CryptoError, keypair::EphemeralKeyPair};

/// Width of an X25519 public key in bytes.
pub const KEY_SIZE: usize = 32;

/// Width of the XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Envelope header size: key hint + sender public + nonce.
const HEADER_SIZE: usize = KEY_SIZE + KEY_SIZE + NONCE_SIZE;

/// HKDF info string binding derived keys to this envelope format.
const HKDF_INFO: &[u8] = b"arkavo-envelope-v1";

/// A sealed message with the metadata needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Public key of the recipient one-time key this was sealed against.
    pub key_hint: [u8; KEY_SIZE],
    /// Sender's ephemeral public key for the key agreement.
    pub sender_public: [u8; KEY_SIZE],
    /// Random 24-byte XChaCha20 nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to the fixed wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.key_hint);
        bytes.extend_from_slice(&self.sender_public);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Parse from the fixed wire layout.
    ///
    /// # Errors
    ///
    /// - `CryptoError::MalformedEnvelope` if `bytes` is shorter than the
    ///   88-byte header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CryptoError::MalformedEnvelope {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut key_hint = [0u8; KEY_SIZE];
        key_hint.copy_from_slice(&bytes[..KEY_SIZE]);

        let mut sender_public = [0u8; KEY_SIZE];
        sender_public.copy_from_slice(&bytes[KEY_SIZE..2 * KEY_SIZE]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[2 * KEY_SIZE..HEADER_SIZE]);

        Ok(Self { key_hint, sender_public, nonce, ciphertext: bytes[HEADER_SIZE..].to_vec() })
    }
}

/// Seal plaintext against a recipient's public key.
///
/// Performs X25519 between the sender's one-time secret and the
/// recipient key, derives the message key with HKDF-SHA256, and encrypts
/// with XChaCha20-Poly1305 under a random nonce.
pub fn seal<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient_public: [u8; KEY_SIZE],
    sender: &EphemeralKeyPair,
    rng: &mut R,
) -> Envelope {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let shared = sender.secret().diffie_hellman(&PublicKey::from(recipient_public));
    let mut key = derive_message_key(shared.as_bytes(), &recipient_public);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    key.zeroize();

    Envelope {
        key_hint: recipient_public,
        sender_public: sender.public_bytes(),
        nonce,
        ciphertext,
    }
}

/// Open an envelope with the recipient one-time key named by its hint.
///
/// # Errors
///
/// - `CryptoError::DecryptionFailed` if the authentication tag does not
///   verify (corrupted payload or wrong recipient key).
pub fn unseal(envelope: &Envelope, recipient: &EphemeralKeyPair) -> Result<Vec<u8>, CryptoError> {
    let shared = recipient.secret().diffie_hellman(&PublicKey::from(envelope.sender_public));
    let mut key = derive_message_key(shared.as_bytes(), &envelope.key_hint);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let result = cipher.decrypt(XNonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref());
    key.zeroize();

    result.map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
}

/// Derive the 32-byte message key from an ECDH shared secret.
///
/// The recipient key doubles as the HKDF salt, binding the derived key
/// to the specific one-time key the envelope names.
fn derive_message_key(shared_secret: &[u8], recipient_public: &[u8; KEY_SIZE]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(recipient_public), shared_secret);

    let mut key = [0u8; 32];
    let Ok(()) = hk.expand(HKDF_INFO, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    key
}
