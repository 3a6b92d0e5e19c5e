use thiserror::Error;

/// Flat error taxonomy for every public operation on an image.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("illegal filename")]
    IllegalFilename,

    #[error("folder not empty")]
    FolderNotEmpty,

    #[error("out of space")]
    OutOfSpace,

    #[error("not readable")]
    NotReadable,

    #[error("not writable")]
    NotWritable,

    #[error("authentication failed")]
    AuthFailed,

    #[error("bad header")]
    BadHeader,

    #[error("corrupt chain")]
    CorruptChain,

    #[error("out of range")]
    OutOfRange,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lets `File`/`FileHandle` implement `std::io::{Read, Write, Seek}` with
/// plain `?` even though their internal operations return our own `Error`.
impl From<Error> for std::io::Error {
    fn from(e: Error) -> std::io::Error {
        match e {
            Error::Io(io_err) => io_err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
