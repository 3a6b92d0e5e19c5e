use crate::cipher::CipherId;

/// Default block size. Payload per block is this minus the 12-byte
/// per-block metadata header (see `block.rs`).
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Argon2id round multiplier used by `cipher::derive_key` when no override
/// is given.
pub const DEFAULT_KDF_ROUNDS: u8 = 3;

/// Parameters fixed at image-creation time and carried in the header for
/// the life of the image.
#[derive(Debug, Clone, Copy)]
pub struct ImageConfig {
    pub block_size: u32,
    pub cipher: CipherId,
    pub kdf_rounds: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            cipher: CipherId::Aes256Ctr,
            kdf_rounds: DEFAULT_KDF_ROUNDS,
        }
    }
}

impl ImageConfig {
    pub fn payload_size(&self) -> u32 {
        self.block_size - crate::block::BLOCK_META_SIZE
    }
}
