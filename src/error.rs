use thiserror::Error;

use crate::encryption;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An Object has the wrong type, e.g. the Object is an Array where a Name would be expected.
    #[error("object has wrong type; expected type {expected} but found type {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },
    /// Dictionary key was not found.
    #[error("missing required dictionary key \"{0}\"")]
    DictKey(String),
    /// Error raised by the standard security handler.
    #[error("encryption error: {0}")]
    Encryption(#[from] encryption::EncryptionError),
    /// The trailer has no /Encrypt dictionary.
    #[error("the document is not encrypted")]
    NotEncrypted,
    /// IO error
    #[error("IO error: {0}")]
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // Errors raised by the stream adapters carry the original `EncryptionError`.
        if !err.get_ref().is_some_and(|inner| inner.is::<encryption::EncryptionError>()) {
            return Error::IO(err);
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<encryption::EncryptionError>()) {
            Some(Ok(inner)) => Error::Encryption(*inner),
            Some(Err(inner)) => Error::IO(std::io::Error::new(kind, inner)),
            None => Error::IO(kind.into()),
        }
    }
}
