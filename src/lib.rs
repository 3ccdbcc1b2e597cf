//! Standard security handler of PDF documents.
//!
//! Covers password authentication, file key derivation and the encryption of strings and
//! streams for revisions 2 to 6 of the handler (RC4, AES-128 and AES-256).
//!
//! ```
//! use pdfcrypt::{AuthResult, EncryptionContext, EncryptionOptions, PasswordAlgorithm, Permissions};
//!
//! let document_id = b"0123456789abcdef";
//!
//! let mut handler = EncryptionOptions::builder()
//!     .user_password("user")
//!     .owner_password("owner")
//!     .permissions(Permissions::PRINTABLE)
//!     .build()
//!     .into_handler()?;
//!
//! let mut context = EncryptionContext::new();
//! handler.ensure_encryption_initialized(document_id, &mut context)?;
//!
//! let mut ciphertext = Vec::new();
//! handler.encrypt_to(&mut ciphertext, b"(Hello)", &mut context, (7, 0))?;
//!
//! // Reading the document back.
//! let parsed = PasswordAlgorithm::try_from(&handler.to_dictionary()?)?;
//! let mut context = EncryptionContext::new();
//! assert_eq!(parsed.authenticate("user", document_id, &mut context)?, AuthResult::User);
//!
//! let mut plaintext = Vec::new();
//! parsed.decrypt_to(&mut plaintext, &ciphertext, &mut context, (7, 0))?;
//! assert_eq!(plaintext, b"(Hello)");
//! # Ok::<(), pdfcrypt::Error>(())
//! ```

mod object;
pub use object::{Dictionary, Object, ObjectId, Stream, StringFormat};

pub mod encryption;
pub use encryption::{
    AuthResult, EncryptionAlgorithm, EncryptionAlgorithms, EncryptionContext, EncryptionError, EncryptionOptions,
    EncryptionOptionsBuilder, PasswordAlgorithm, Permissions, enabled_algorithms,
};

mod error;
pub use error::{Error, Result};
