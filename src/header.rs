//! Header — unencrypted prefix of a container image.
//!
//! # On-disk layout (66 bytes, all multi-byte fields big-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0     32   iv            four 64-bit words
//!   32      1   rounds        Argon2id time-cost multiplier (1..255)
//!   33      1   cipher_id     0=none 1=AES-256-CTR 2=ChaCha20 3..17=reserved
//!   34     32   password_hash blake3(derived key)
//! ```
//!
//! `HEADER_SIZE = 66 = 4*8 + 1 + 1 + 32`, matching `beginning()` in the
//! lineage this format descends from. Everything from `HEADER_SIZE` onward
//! is passed through the cipher; the header itself never is — `open()`
//! must be able to authenticate the password before it can decrypt
//! anything.

use byteorder::WriteBytesExt;
use std::io::{self, Read, Write};

use crate::cipher::{self, CipherId, IV_LEN};
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = IV_LEN + 1 + 1 + 32;

#[derive(Debug, Clone)]
pub struct Header {
    pub iv: [u8; IV_LEN],
    pub rounds: u8,
    pub cipher_id: CipherId,
    pub password_hash: [u8; 32],
}

impl Header {
    /// Create a new header for a freshly-created image: generates a random
    /// IV and derives+hashes the password.
    pub fn create(password: &str, cipher_id: CipherId, rounds: u8) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        getrandom_fill(&mut iv)?;
        let key = cipher::derive_key(password, &iv, rounds)?;
        let password_hash = cipher::password_hash(&key);
        Ok(Header {
            iv,
            rounds,
            cipher_id,
            password_hash,
        })
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.iv)?;
        w.write_u8(self.rounds)?;
        w.write_u8(self.cipher_id.to_byte())?;
        w.write_all(&self.password_hash)?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        read_exact_or_bad_header(&mut r, &mut iv)?;
        let rounds = read_u8_or_bad_header(&mut r)?;
        let cipher_id = CipherId::from_byte(read_u8_or_bad_header(&mut r)?);
        let mut password_hash = [0u8; 32];
        read_exact_or_bad_header(&mut r, &mut password_hash)?;
        Ok(Header {
            iv,
            rounds,
            cipher_id,
            password_hash,
        })
    }

    /// Authenticate `password` against the stored hash without decrypting
    /// any payload byte. Returns the derived key on success.
    pub fn authenticate(&self, password: &str) -> Result<[u8; 32]> {
        if !self.cipher_id.is_implemented() {
            return Err(Error::BadHeader);
        }
        let key = cipher::derive_key(password, &self.iv, self.rounds)?;
        if cipher::password_hash(&key) != self.password_hash {
            return Err(Error::AuthFailed);
        }
        Ok(key)
    }
}

fn getrandom_fill(buf: &mut [u8]) -> io::Result<()> {
    use rand_core::RngCore;
    rand_core::OsRng.fill_bytes(buf);
    Ok(())
}

/// A short read here means the image is too small to even hold a header —
/// classified as `BadHeader` (§7), not the generic `Io` variant, so callers
/// can tell "not a cryptvfs image" apart from a disk I/O failure.
fn read_exact_or_bad_header<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::BadHeader),
        Err(e) => Err(e.into()),
    }
}

fn read_u8_or_bad_header<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact_or_bad_header(r, &mut buf)?;
    Ok(buf[0])
}
