mod aes256;
mod algorithms;
mod context;
pub mod crypt_filters;
mod dictionary;
mod legacy;
mod options;
mod password;
mod rc4;
mod streams;

use crate::{Object, ObjectId};
use bitflags::bitflags;
use thiserror::Error;

pub use algorithms::{EncryptionAlgorithm, EncryptionAlgorithms, PasswordAlgorithm, enabled_algorithms};
pub use context::{AuthResult, EncryptionContext};
pub use options::{EncryptionOptions, EncryptionOptionsBuilder};
pub use streams::{AesReader, AesWriter, DecryptReader, EncryptWriter, Rc4Reader, Rc4Writer};

/// Length of the initialization vector prepended to AES encrypted strings and streams.
pub const AES_IV_LENGTH: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("unsupported encryption filter: {0}")]
    UnsupportedFilter(String),
    #[error("invalid encryption dictionary: {0}")]
    InvalidEncryptionDict(&'static str),
    #[error("the password could not be prepared with SASLprep: {0}")]
    InvalidPassword(#[from] stringprep::Error),
    #[error("internal error: {0}")]
    InternalLogic(&'static str),
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(&'static str),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl From<EncryptionError> for std::io::Error {
    fn from(err: EncryptionError) -> Self {
        let kind = match err {
            EncryptionError::UnexpectedEof(_) => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::InvalidData,
        };

        std::io::Error::new(kind, err)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct Permissions: u32 {
        /// (Security handlers of revision 2) Print the document.
        /// (Security handlers of revision 3 or greater) Print the document (possibly not at the
        /// highest quality level, depending on whether [`Permissions::PRINTABLE_IN_HIGH_QUALITY`]
        /// is also set).
        const PRINTABLE = 1 << 2;

        /// Modify the contents of the document by operations other than those controlled by
        /// [`Permissions::ANNOTABLE`], [`Permissions::FILLABLE`] and [`Permissions::ASSEMBLABLE`].
        const MODIFIABLE = 1 << 3;

        /// Copy or otherwise extract text and graphics from the document. However, for the limited
        /// purpose of providing this content to assistive technology, a PDF reader should behave
        /// as if this bit was set to 1.
        const COPYABLE = 1 << 4;

        /// Add or modify text annotations, fill in interactive form fields, and if
        /// [`Permissions::MODIFIABLE`] is also set, create or modify interactive form fields
        /// (including signature fields).
        const ANNOTABLE = 1 << 5;

        /// Fill in existing interactive fields (including signature fields), even if
        /// [`Permissions::ANNOTABLE`] is clear.
        const FILLABLE = 1 << 8;

        /// Copy or otherwise extract text and graphics from the document for the purpose of
        /// providing this content to assistive technology.
        ///
        /// Deprecated since PDF 2.0: must always be set for backward compatibility with PDF
        /// viewers following earlier specifications.
        const COPYABLE_FOR_ACCESSIBILITY = 1 << 9;

        /// (Security handlers of revision 3 or greater) Assemble the document (insert, rotate, or
        /// delete pages and create document outline items or thumbnail images), even if
        /// [`Permissions::MODIFIABLE`] is not set.
        const ASSEMBLABLE = 1 << 10;

        /// (Security handlers of revision 3 or greater) Print the document to a representation
        /// from which a faithful copy of the PDF content could be generated, based on an
        /// implementation-dependent algorithm. When this bit is clear (and
        /// [`Permissions::PRINTABLE`] is set), printing shall be limited to a low-level
        /// representation of the appearance, possibly of degraded quality.
        const PRINTABLE_IN_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Bits 7-8 and 13-32 of the P entry are reserved and must be 1.
    pub const RESERVED: u32 = 0xFFFF_F0C0;

    /// The unsigned 32-bit P value with all reserved bits set.
    pub fn p_value(&self) -> u32 {
        self.bits() | Self::RESERVED
    }

    /// The P value the way it is written to the encryption dictionary: the 32-bit quantity
    /// reinterpreted as a signed integer.
    pub fn to_p_value(&self) -> i64 {
        self.p_value() as i32 as i64
    }

    /// Interprets the integer stored under /P as an unsigned 32-bit quantity. The reserved bits
    /// are retained so that the value takes part in key derivation unchanged.
    pub fn from_p_value(value: i64) -> Self {
        Self::from_bits_retain((value & 0xFFFF_FFFF) as u32)
    }
}

pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), EncryptionError> {
    getrandom::fill(buf).map_err(|_| EncryptionError::InternalLogic("the system random source is unavailable"))
}

/// Whether `obj` is left in plaintext by the security handler.
fn is_exempt(algorithm: &PasswordAlgorithm, obj: &Object) -> bool {
    let Ok(stream) = obj.as_stream() else {
        return false;
    };

    // The cross-reference stream shall not be encrypted and strings appearing in the
    // cross-reference stream dictionary shall not be encrypted.
    if stream.dict.has_type(b"XRef") {
        return true;
    }

    // Metadata streams stay readable when the handler was told not to encrypt them.
    if !algorithm.is_metadata_encrypted() && stream.dict.has_type(b"Metadata") {
        return true;
    }

    // A stream may select the Identity crypt filter through its Crypt filter decode parameters
    // (if the Name entry is missing, Identity is used as well).
    let uses_crypt_filter = stream
        .filters()
        .map(|filters| filters.contains(&&b"Crypt"[..]))
        .unwrap_or(false);

    uses_crypt_filter
        && stream
            .dict
            .get(b"DecodeParms")
            .and_then(Object::as_dict)
            .ok()
            .and_then(|params| params.get(b"Name").and_then(Object::as_name).ok())
            .is_none_or(|name| name == b"Identity")
}

/// Encrypts every string and stream in `obj` with the key of the indirect object `obj_id`.
pub fn encrypt_object(
    algorithm: &PasswordAlgorithm,
    context: &mut EncryptionContext,
    obj_id: ObjectId,
    obj: &mut Object,
) -> crate::Result<()> {
    if is_exempt(algorithm, obj) {
        return Ok(());
    }

    // Encryption applies to all strings and streams in the document's PDF file, i.e., we have to
    // recursively process array and dictionary objects to encrypt any string and stream objects
    // stored inside of those.
    let content = match obj {
        Object::Array(objects) => {
            for obj in objects {
                encrypt_object(algorithm, context, obj_id, obj)?;
            }

            return Ok(());
        }
        Object::Dictionary(objects) => {
            for (_, obj) in objects.iter_mut() {
                encrypt_object(algorithm, context, obj_id, obj)?;
            }

            return Ok(());
        }
        Object::String(content, _) => &*content,
        Object::Stream(stream) => &stream.content,
        // Encryption is not applied to other object types such as integers and boolean values.
        _ => return Ok(()),
    };

    let mut ciphertext = Vec::new();
    algorithm.encrypt_to(&mut ciphertext, content, context, obj_id)?;

    match obj {
        Object::Stream(stream) => stream.set_content(ciphertext),
        Object::String(content, _) => *content = ciphertext,
        _ => (),
    }

    Ok(())
}

/// Decrypts every string and stream in `obj` with the key of the indirect object `obj_id`.
pub fn decrypt_object(
    algorithm: &PasswordAlgorithm,
    context: &mut EncryptionContext,
    obj_id: ObjectId,
    obj: &mut Object,
) -> crate::Result<()> {
    if is_exempt(algorithm, obj) {
        return Ok(());
    }

    let content = match obj {
        Object::Array(objects) => {
            for obj in objects {
                decrypt_object(algorithm, context, obj_id, obj)?;
            }

            return Ok(());
        }
        Object::Dictionary(objects) => {
            for (_, obj) in objects.iter_mut() {
                decrypt_object(algorithm, context, obj_id, obj)?;
            }

            return Ok(());
        }
        Object::String(content, _) => &*content,
        Object::Stream(stream) => &stream.content,
        _ => return Ok(()),
    };

    let mut plaintext = Vec::new();
    algorithm.decrypt_to(&mut plaintext, content, context, obj_id)?;

    match obj {
        Object::Stream(stream) => stream.set_content(plaintext),
        Object::String(content, _) => *content = plaintext,
        _ => (),
    }

    Ok(())
}
