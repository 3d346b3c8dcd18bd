use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidConfig(String),
    InvalidProfile(String),
    InvalidData(String),
    /// A caller-supplied buffer is shorter than the engine requires.
    BufferTooSmall {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidProfile(msg) => write!(f, "invalid batch profile: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::BufferTooSmall {
                buffer,
                expected,
                actual,
            } => write!(
                f,
                "buffer `{buffer}` too small: expected at least {expected} scalars, got {actual}"
            ),
            Error::ThreadPool(msg) => write!(f, "thread pool: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Fails with [`Error::BufferTooSmall`] unless `len >= expected`.
#[inline]
pub(crate) fn ensure_len(buffer: &'static str, len: usize, expected: usize) -> Result<()> {
    if len < expected {
        return Err(Error::BufferTooSmall {
            buffer,
            expected,
            actual: len,
        });
    }
    Ok(())
}
