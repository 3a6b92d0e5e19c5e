//! Seekable stream cipher and key derivation for container images.
//!
//! The header's contract (see `header.rs`) requires that the byte emitted
//! at absolute offset `p` depend only on `p` and the derived key, never on
//! bytes processed before it — `FileBlock` and `File` both seek to interior
//! offsets constantly. An AEAD mode authenticates a whole message and is
//! not seek-safe at an arbitrary offset, so this uses CTR-mode block
//! ciphers instead, whose keystream at byte `p` is independently derivable.
//!
//! Key derivation: Argon2id(password, salt=header IV) → 32-byte key.
//! Password authentication: blake3(derived key), stored in the header —
//! this lets `open()` reject a wrong password without decrypting a single
//! payload byte.

use aes::Aes256;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20::ChaCha20;
use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr64BE;

use crate::error::{Error, Result};

/// Byte length of the header IV (four 64-bit words), also used as the
/// Argon2 salt. Individual ciphers use a leading slice of this.
pub const IV_LEN: usize = 32;

/// Cipher selector stored as a single byte in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherId {
    None,
    Aes256Ctr,
    ChaCha20,
    /// Values 3..=17 are recognized (the header format reserves this
    /// range) but not implemented by this build; opening such an image
    /// fails with [`Error::BadHeader`].
    Reserved(u8),
}

impl CipherId {
    pub fn to_byte(self) -> u8 {
        match self {
            CipherId::None => 0,
            CipherId::Aes256Ctr => 1,
            CipherId::ChaCha20 => 2,
            CipherId::Reserved(b) => b,
        }
    }

    pub fn from_byte(b: u8) -> CipherId {
        match b {
            0 => CipherId::None,
            1 => CipherId::Aes256Ctr,
            2 => CipherId::ChaCha20,
            other => CipherId::Reserved(other),
        }
    }

    pub fn is_implemented(self) -> bool {
        matches!(self, CipherId::None | CipherId::Aes256Ctr | CipherId::ChaCha20)
    }
}

/// Derive a 256-bit key from a password and the header IV using Argon2id.
///
/// `rounds` scales the time cost; each image fixes this at creation and
/// carries it in the header so the same image always re-derives the same
/// key from the same password.
pub fn derive_key(password: &str, iv: &[u8; IV_LEN], rounds: u8) -> Result<[u8; 32]> {
    let t_cost = 2 + rounds as u32;
    let params = Params::new(64 * 1024, t_cost, 1, Some(32))
        .map_err(|_| Error::BadHeader)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), iv, &mut key)
        .map_err(|_| Error::BadHeader)?;
    Ok(key)
}

/// Authentication hash stored in the header; comparing this on open lets
/// the image reject a wrong password before touching the superblock.
pub fn password_hash(key: &[u8; 32]) -> [u8; 32] {
    blake3::hash(key).into()
}

enum CipherCore {
    None,
    Aes256Ctr(Box<Ctr64BE<Aes256>>),
    ChaCha20(Box<ChaCha20>),
}

impl CipherCore {
    fn new(id: CipherId, key: &[u8; 32], iv: &[u8; IV_LEN]) -> Result<Self> {
        match id {
            CipherId::None => Ok(CipherCore::None),
            CipherId::Aes256Ctr => Ok(CipherCore::Aes256Ctr(Box::new(
                Ctr64BE::<Aes256>::new(key.into(), iv[..16].into()),
            ))),
            CipherId::ChaCha20 => Ok(CipherCore::ChaCha20(Box::new(ChaCha20::new(
                key.into(),
                iv[..12].into(),
            )))),
            CipherId::Reserved(_) => Err(Error::BadHeader),
        }
    }

    fn seek(&mut self, pos: u64) {
        match self {
            CipherCore::None => {}
            CipherCore::Aes256Ctr(c) => c.seek(pos),
            CipherCore::ChaCha20(c) => c.seek(pos),
        }
    }

    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            CipherCore::None => {}
            CipherCore::Aes256Ctr(c) => c.apply_keystream(buf),
            CipherCore::ChaCha20(c) => c.apply_keystream(buf),
        }
    }
}

/// A stream cipher keyed for one image, seekable to any absolute byte
/// offset within the encrypted region of the container.
pub struct CipherStream {
    core: CipherCore,
}

impl CipherStream {
    pub fn new(id: CipherId, key: &[u8; 32], iv: &[u8; IV_LEN]) -> Result<Self> {
        Ok(CipherStream {
            core: CipherCore::new(id, key, iv)?,
        })
    }

    /// XOR `buf` with the keystream at absolute offset `abs_offset`,
    /// in place. Used symmetrically for both directions: callers read
    /// ciphertext from the host file and pass it here to recover
    /// plaintext, or XOR plaintext here before writing it out.
    pub fn apply_at(&mut self, abs_offset: u64, buf: &mut [u8]) {
        self.core.seek(abs_offset);
        self.core.apply(buf);
    }
}
