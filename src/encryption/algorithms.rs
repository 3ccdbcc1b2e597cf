use super::context::{AuthResult, EncryptionContext};
use super::crypt_filters::CryptFilter;
use super::password::{pad_password, prepare_password};
use super::streams::{AesReader, AesWriter, DecryptReader, EncryptWriter, Rc4Reader, Rc4Writer};
use super::{AES_IV_LENGTH, EncryptionError, Permissions};
use crate::ObjectId;
use bitflags::bitflags;
use log::{debug, warn};
use std::fmt;
use std::io::{Read, Write};
use std::sync::OnceLock;
use zeroize::Zeroizing;

/// The encryption schemes of the standard security handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncryptionAlgorithm {
    /// RC4 with a 40-bit key (V 1, R 2 or 3).
    Rc4V1,
    /// RC4 with a key of 40 to 128 bits (V 2, R 3).
    Rc4V2,
    /// AES-128 in CBC mode (V 4, R 4).
    AesV2,
    /// AES-256 in CBC mode with the SHA-256 password hash (V 5, R 5).
    AesV3R5,
    /// AES-256 in CBC mode with the hardened password hash of PDF 2.0 (V 5, R 6).
    AesV3R6,
}

bitflags! {
    /// A set of [`EncryptionAlgorithm`]s.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct EncryptionAlgorithms: u32 {
        const RC4V1 = 1 << 0;
        const RC4V2 = 1 << 1;
        const AESV2 = 1 << 2;
        const AESV3R5 = 1 << 3;
        const AESV3R6 = 1 << 4;
    }
}

/// The algorithms available in this build. The legacy RC4 schemes can be compiled out by
/// disabling the `rc4` feature.
pub fn enabled_algorithms() -> EncryptionAlgorithms {
    static ENABLED: OnceLock<EncryptionAlgorithms> = OnceLock::new();

    *ENABLED.get_or_init(|| {
        let mut enabled = EncryptionAlgorithms::AESV2 | EncryptionAlgorithms::AESV3R5 | EncryptionAlgorithms::AESV3R6;
        if cfg!(feature = "rc4") {
            enabled |= EncryptionAlgorithms::RC4V1 | EncryptionAlgorithms::RC4V2;
        }
        enabled
    })
}

impl EncryptionAlgorithm {
    pub fn flag(self) -> EncryptionAlgorithms {
        match self {
            EncryptionAlgorithm::Rc4V1 => EncryptionAlgorithms::RC4V1,
            EncryptionAlgorithm::Rc4V2 => EncryptionAlgorithms::RC4V2,
            EncryptionAlgorithm::AesV2 => EncryptionAlgorithms::AESV2,
            EncryptionAlgorithm::AesV3R5 => EncryptionAlgorithms::AESV3R5,
            EncryptionAlgorithm::AesV3R6 => EncryptionAlgorithms::AESV3R6,
        }
    }

    pub fn is_enabled(self) -> bool {
        enabled_algorithms().contains(self.flag())
    }

    pub fn name(self) -> &'static str {
        match self {
            EncryptionAlgorithm::Rc4V1 => "RC4V1",
            EncryptionAlgorithm::Rc4V2 => "RC4V2",
            EncryptionAlgorithm::AesV2 => "AESV2",
            EncryptionAlgorithm::AesV3R5 => "AESV3R5",
            EncryptionAlgorithm::AesV3R6 => "AESV3R6",
        }
    }

    /// The MD5 based schemes of revisions 2 to 4.
    pub(crate) fn is_legacy(self) -> bool {
        matches!(self, EncryptionAlgorithm::Rc4V1 | EncryptionAlgorithm::Rc4V2 | EncryptionAlgorithm::AesV2)
    }

    pub(crate) fn crypt_filter(self) -> CryptFilter {
        match self {
            EncryptionAlgorithm::Rc4V1 | EncryptionAlgorithm::Rc4V2 => CryptFilter::Rc4,
            EncryptionAlgorithm::AesV2 => CryptFilter::Aes128,
            EncryptionAlgorithm::AesV3R5 | EncryptionAlgorithm::AesV3R6 => CryptFilter::Aes256,
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The standard security handler of a document.
///
/// A handler is either created from scratch with [`PasswordAlgorithm::create`], in which case
/// the credentials are derived by [`PasswordAlgorithm::ensure_encryption_initialized`], or read
/// from an encryption dictionary with `PasswordAlgorithm::try_from(&Dictionary)`, in which case
/// the file encryption key is recovered by [`PasswordAlgorithm::authenticate`].
#[derive(Clone)]
pub struct PasswordAlgorithm {
    pub(crate) algorithm: EncryptionAlgorithm,
    pub(crate) revision: u8,
    pub(crate) key_length: u32,
    pub(crate) permissions: Permissions,
    pub(crate) encrypt_metadata: bool,
    pub(crate) owner_value: Vec<u8>,
    pub(crate) user_value: Vec<u8>,
    pub(crate) owner_encrypted: Vec<u8>,
    pub(crate) user_encrypted: Vec<u8>,
    pub(crate) permissions_encrypted: Vec<u8>,
    pub(crate) parsed: bool,
    pub(crate) initialized: bool,
    pub(crate) owner_password_set: bool,
    pub(crate) user_password: Zeroizing<String>,
    pub(crate) owner_password: Zeroizing<String>,
}

impl PasswordAlgorithm {
    /// Creates a handler for a new document. The requested `permissions` are combined with the
    /// reserved bits of the P entry. `key_length` is given in bits; `None` selects the default of
    /// the algorithm.
    pub fn create(
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
        algorithm: EncryptionAlgorithm,
        key_length: Option<u32>,
    ) -> Result<Self, EncryptionError> {
        Self::create_with_metadata(user_password, owner_password, permissions, algorithm, key_length, true)
    }

    /// Like [`PasswordAlgorithm::create`], but allows to leave metadata streams unencrypted.
    pub fn create_with_metadata(
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
        algorithm: EncryptionAlgorithm,
        key_length: Option<u32>,
        encrypt_metadata: bool,
    ) -> Result<Self, EncryptionError> {
        if !algorithm.is_enabled() {
            return Err(EncryptionError::UnsupportedFilter(format!("{} is not enabled", algorithm)));
        }

        let (revision, key_length) = match algorithm {
            EncryptionAlgorithm::Rc4V1 => {
                if !encrypt_metadata {
                    return Err(EncryptionError::InvalidEncryptionDict(
                        "RC4V1 cannot leave metadata unencrypted",
                    ));
                }
                match key_length {
                    None | Some(40) => (2, 40),
                    Some(_) => {
                        return Err(EncryptionError::InvalidEncryptionDict(
                            "invalid encryption key length for RC4V1, only 40 bit is supported",
                        ));
                    }
                }
            }
            EncryptionAlgorithm::Rc4V2 => {
                let key_length = key_length.unwrap_or(128);
                if key_length % 8 != 0 || !(40..=128).contains(&key_length) {
                    return Err(EncryptionError::InvalidEncryptionDict(
                        "invalid encryption key length for RC4V2, only a multiple of 8 from 40 to 128 bit is supported",
                    ));
                }
                // Unencrypted metadata needs the crypt filter form of the dictionary, which
                // always describes a 128-bit key.
                if encrypt_metadata {
                    (3, key_length)
                } else if key_length == 128 {
                    (4, 128)
                } else {
                    return Err(EncryptionError::InvalidEncryptionDict(
                        "unencrypted metadata requires a 128-bit RC4V2 key",
                    ));
                }
            }
            EncryptionAlgorithm::AesV2 => match key_length {
                None | Some(128) => (4, 128),
                Some(_) => {
                    return Err(EncryptionError::InvalidEncryptionDict(
                        "invalid encryption key length for AESV2, only 128 bit is supported",
                    ));
                }
            },
            EncryptionAlgorithm::AesV3R5 | EncryptionAlgorithm::AesV3R6 => match key_length {
                None | Some(256) => (if algorithm == EncryptionAlgorithm::AesV3R5 { 5 } else { 6 }, 256),
                Some(_) => {
                    return Err(EncryptionError::InvalidEncryptionDict(
                        "invalid encryption key length for AESV3, only 256 bit is supported",
                    ));
                }
            },
        };

        debug!("creating {} security handler (revision {}, {}-bit key)", algorithm, revision, key_length);

        Ok(Self {
            algorithm,
            revision,
            key_length,
            permissions: Permissions::from_bits_retain(permissions.p_value()),
            encrypt_metadata,
            owner_value: Vec::new(),
            user_value: Vec::new(),
            owner_encrypted: Vec::new(),
            user_encrypted: Vec::new(),
            permissions_encrypted: Vec::new(),
            parsed: false,
            initialized: false,
            owner_password_set: !owner_password.is_empty(),
            user_password: Zeroizing::new(user_password.to_owned()),
            owner_password: Zeroizing::new(owner_password.to_owned()),
        })
    }

    /// Derives the credentials of a handler created from scratch and stores the file encryption
    /// key in `context`, which is then authenticated as owner. The plaintext passwords are wiped
    /// afterwards.
    ///
    /// For handlers that already carry credentials this only checks that `context` has been
    /// authenticated.
    pub fn ensure_encryption_initialized(
        &mut self,
        document_id: &[u8],
        context: &mut EncryptionContext,
    ) -> Result<(), EncryptionError> {
        if self.initialized {
            if !context.is_authenticated() {
                return Err(EncryptionError::InternalLogic("unexpected non authenticated context"));
            }

            // The credentials are already filled, it's neither necessary nor possible to
            // regenerate them.
            return Ok(());
        }

        let key = if self.algorithm.is_legacy() {
            let user_password = pad_password(self.user_password.as_bytes());
            let owner_password = pad_password(self.owner_password.as_bytes());

            self.owner_value = self.compute_owner_value_r4(&owner_password, &user_password).to_vec();

            let key = self.compute_encryption_key_r4(document_id, &user_password, &self.owner_value);
            self.user_value = self.compute_user_value_r4(&key, document_id).to_vec();

            key
        } else {
            let user_password = prepare_password(&self.user_password)?;
            let owner_password = prepare_password(&self.owner_password)?;

            let mut key = Zeroizing::new(vec![0u8; 32]);
            super::fill_random(&mut key)?;

            let (user_value, user_encrypted) = self.compute_user_values_r6(&key, &user_password)?;
            self.user_value = user_value;
            self.user_encrypted = user_encrypted;

            let (owner_value, owner_encrypted) = self.compute_owner_values_r6(&key, &owner_password)?;
            self.owner_value = owner_value;
            self.owner_encrypted = owner_encrypted;

            self.permissions_encrypted = self.compute_permissions(&key)?;

            key
        };

        context.set_encryption_key(&key);
        context.set_document_id(document_id);
        // When creating the handler from scratch we can assume we are the owner of the document.
        context.set_auth_result(AuthResult::Owner);

        self.user_password = Zeroizing::new(String::new());
        self.owner_password = Zeroizing::new(String::new());
        self.initialized = true;

        debug!("initialized {} security handler", self.algorithm);

        Ok(())
    }

    /// Checks `password` against the user and owner credentials and, on success, stores the
    /// recovered file encryption key in `context`.
    ///
    /// A wrong password is not an error: the result is [`AuthResult::Failed`].
    pub fn authenticate(
        &self,
        password: &str,
        document_id: &[u8],
        context: &mut EncryptionContext,
    ) -> Result<AuthResult, EncryptionError> {
        if !self.initialized {
            return Err(EncryptionError::InternalLogic(
                "the security handler has no credentials to authenticate against",
            ));
        }

        let (result, key) = if self.algorithm.is_legacy() {
            self.authenticate_r4(password.as_bytes(), document_id)
        } else {
            self.authenticate_r6(password)?
        };

        match &key {
            Some(key) => context.set_encryption_key(key),
            None => context.set_encryption_key(&[]),
        }
        context.set_auth_result(result);
        context.set_document_id(document_id);

        if let Some(key) = &key {
            if !self.algorithm.is_legacy() && !self.permissions_match(key) {
                warn!("the /Perms entry does not match /P and /EncryptMetadata");
            }
        }

        debug!(
            "authenticated against {} security handler (revision {}): {:?}",
            self.algorithm, self.revision, result
        );

        Ok(result)
    }

    /// Checks the encrypted Perms entry against P and EncryptMetadata with the key held by
    /// `context`. Handlers before revision 5 have no Perms entry and always pass.
    pub fn validate_permissions(&self, context: &EncryptionContext) -> bool {
        if self.algorithm.is_legacy() {
            return true;
        }

        context.is_authenticated() && self.permissions_match(context.encryption_key())
    }

    fn ensure_authenticated(&self, context: &EncryptionContext) -> Result<(), EncryptionError> {
        if !self.initialized || !context.is_authenticated() {
            return Err(EncryptionError::InternalLogic("the encryption context is not authenticated"));
        }

        Ok(())
    }

    fn object_key(&self, context: &EncryptionContext, obj_id: ObjectId) -> Zeroizing<Vec<u8>> {
        self.algorithm.crypt_filter().compute_key(context.encryption_key(), obj_id)
    }

    /// Encrypts `input`, the content of a string or stream of the object `obj_id`, into `out`.
    pub fn encrypt_to(
        &self,
        out: &mut Vec<u8>,
        input: &[u8],
        context: &mut EncryptionContext,
        obj_id: ObjectId,
    ) -> Result<(), EncryptionError> {
        self.ensure_authenticated(context)?;

        let key = self.object_key(context, obj_id);
        *out = match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => {
                let mut data = input.to_vec();
                context.rc4_keystream(&key).apply(&mut data);
                data
            }
            filter => filter.encrypt(&key, input)?,
        };

        Ok(())
    }

    /// Decrypts `input`, the content of a string or stream of the object `obj_id`, into `out`.
    pub fn decrypt_to(
        &self,
        out: &mut Vec<u8>,
        input: &[u8],
        context: &mut EncryptionContext,
        obj_id: ObjectId,
    ) -> Result<(), EncryptionError> {
        self.ensure_authenticated(context)?;

        let key = self.object_key(context, obj_id);
        *out = match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => {
                let mut data = input.to_vec();
                context.rc4_keystream(&key).apply(&mut data);
                data
            }
            filter => filter.decrypt(&key, input)?,
        };

        Ok(())
    }

    /// Number of bytes the ciphertext carries in front of the encrypted data.
    pub fn calculate_stream_offset(&self) -> usize {
        match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => 0,
            CryptFilter::Aes128 | CryptFilter::Aes256 => AES_IV_LENGTH,
        }
    }

    /// Length of the ciphertext of a plaintext of `length` bytes.
    pub fn calculate_stream_length(&self, length: usize) -> usize {
        match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => length,
            CryptFilter::Aes128 | CryptFilter::Aes256 => {
                let mut real_length = ((length + 15) & !15) + AES_IV_LENGTH;
                if length % 16 == 0 {
                    real_length += 16;
                }
                real_length
            }
        }
    }

    /// Wraps `source`, which yields `source_len` bytes of ciphertext of the object `obj_id`, in a
    /// reader producing the plaintext.
    pub fn create_encryption_input_stream<R: Read>(
        &self,
        source: R,
        source_len: usize,
        context: &mut EncryptionContext,
        obj_id: ObjectId,
    ) -> Result<DecryptReader<R>, EncryptionError> {
        self.ensure_authenticated(context)?;

        let key = self.object_key(context, obj_id);
        let reader = match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => DecryptReader::Rc4(Rc4Reader::new(source, source_len, context.rc4_keystream(&key))),
            CryptFilter::Aes128 | CryptFilter::Aes256 => DecryptReader::Aes(AesReader::new(source, source_len, &key)),
        };

        Ok(reader)
    }

    /// Wraps `sink` in a writer that encrypts everything written to it with the key of the object
    /// `obj_id`. The writer must be finished to emit the final block.
    pub fn create_encryption_output_stream<W: Write>(
        &self,
        sink: W,
        context: &mut EncryptionContext,
        obj_id: ObjectId,
    ) -> Result<EncryptWriter<W>, EncryptionError> {
        self.ensure_authenticated(context)?;

        let key = self.object_key(context, obj_id);
        let writer = match self.algorithm.crypt_filter() {
            CryptFilter::Rc4 => EncryptWriter::Rc4(Rc4Writer::new(sink, context.rc4_keystream(&key))),
            CryptFilter::Aes128 => EncryptWriter::Aes(AesWriter::new(sink, &key)?),
            CryptFilter::Aes256 => {
                return Err(EncryptionError::NotImplemented(
                    "encryption output streams do not support AESV3 yet",
                ));
            }
        };

        Ok(writer)
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// The length of the file encryption key in bits.
    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    pub fn key_length_bytes(&self) -> usize {
        self.key_length as usize / 8
    }

    /// The P value, including the reserved bits.
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn is_metadata_encrypted(&self) -> bool {
        self.encrypt_metadata
    }

    /// Whether the handler was read from an encryption dictionary.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Whether the credentials (O, U and, for AESV3, OE, UE and Perms) are available.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_owner_password_set(&self) -> bool {
        self.owner_password_set
    }

    /// The O entry.
    pub fn owner_value(&self) -> &[u8] {
        &self.owner_value
    }

    /// The U entry.
    pub fn user_value(&self) -> &[u8] {
        &self.user_value
    }

    /// The OE entry; empty for revisions before 5.
    pub fn owner_encrypted(&self) -> &[u8] {
        &self.owner_encrypted
    }

    /// The UE entry; empty for revisions before 5.
    pub fn user_encrypted(&self) -> &[u8] {
        &self.user_encrypted
    }

    /// The Perms entry; empty for revisions before 5.
    pub fn permissions_encrypted(&self) -> &[u8] {
        &self.permissions_encrypted
    }

    pub fn is_print_allowed(&self) -> bool {
        self.permissions.contains(Permissions::PRINTABLE)
    }

    pub fn is_edit_allowed(&self) -> bool {
        self.permissions.contains(Permissions::MODIFIABLE)
    }

    pub fn is_copy_allowed(&self) -> bool {
        self.permissions.contains(Permissions::COPYABLE)
    }

    pub fn is_edit_notes_allowed(&self) -> bool {
        self.permissions.contains(Permissions::ANNOTABLE)
    }

    pub fn is_fill_and_sign_allowed(&self) -> bool {
        self.permissions.contains(Permissions::FILLABLE)
    }

    pub fn is_accessibility_allowed(&self) -> bool {
        self.permissions.contains(Permissions::COPYABLE_FOR_ACCESSIBILITY)
    }

    pub fn is_doc_assembly_allowed(&self) -> bool {
        self.permissions.contains(Permissions::ASSEMBLABLE)
    }

    pub fn is_high_print_allowed(&self) -> bool {
        self.permissions.contains(Permissions::PRINTABLE_IN_HIGH_QUALITY)
    }
}

impl fmt::Debug for PasswordAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAlgorithm")
            .field("algorithm", &self.algorithm)
            .field("revision", &self.revision)
            .field("key_length", &self.key_length)
            .field("permissions", &format_args!("{:#010X}", self.permissions.bits()))
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("parsed", &self.parsed)
            .field("initialized", &self.initialized)
            .field("owner_password_set", &self.owner_password_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT_ID: &[u8] = b"\x5b\x4c\x1d\x6e\x87\x16\x9a\x2f\x3e\x44\x01\xc2\x9d\x77\x0b\xe1";

    fn create_and_initialize(algorithm: EncryptionAlgorithm, key_length: Option<u32>) -> PasswordAlgorithm {
        let mut handler = PasswordAlgorithm::create(
            "user",
            "owner",
            Permissions::PRINTABLE | Permissions::COPYABLE,
            algorithm,
            key_length,
        )
        .unwrap();

        let mut context = EncryptionContext::new();
        handler.ensure_encryption_initialized(DOCUMENT_ID, &mut context).unwrap();
        assert_eq!(context.auth_result(), AuthResult::Owner);
        assert_eq!(context.encryption_key().len(), handler.key_length_bytes());

        handler
    }

    fn authenticate(handler: &PasswordAlgorithm, password: &str) -> AuthResult {
        let mut context = EncryptionContext::new();
        handler.authenticate(password, DOCUMENT_ID, &mut context).unwrap()
    }

    fn assert_passwords_authenticate(handler: &PasswordAlgorithm) {
        // Assert that the correct passwords authenticate.
        assert_eq!(authenticate(handler, "user"), AuthResult::User);
        assert_eq!(authenticate(handler, "owner"), AuthResult::Owner);

        // Assert that other passwords do not authenticate.
        assert_eq!(authenticate(handler, "wrongpass"), AuthResult::Failed);
        assert_eq!(authenticate(handler, ""), AuthResult::Failed);
    }

    #[test]
    #[cfg(feature = "rc4")]
    fn authenticate_password_r2() {
        let handler = create_and_initialize(EncryptionAlgorithm::Rc4V1, None);
        assert_eq!(handler.revision(), 2);
        assert_eq!(handler.key_length(), 40);
        assert_passwords_authenticate(&handler);
    }

    #[test]
    #[cfg(feature = "rc4")]
    fn authenticate_password_r3() {
        for key_length in [40, 56, 96, 128] {
            let handler = create_and_initialize(EncryptionAlgorithm::Rc4V2, Some(key_length));
            assert_eq!(handler.revision(), 3);
            assert_eq!(handler.key_length(), key_length);
            assert_passwords_authenticate(&handler);
        }
    }

    #[test]
    fn authenticate_password_r4() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV2, None);
        assert_eq!(handler.revision(), 4);
        assert_passwords_authenticate(&handler);
    }

    #[test]
    fn authenticate_password_r5() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV3R5, None);
        assert_eq!(handler.revision(), 5);
        assert_eq!(handler.owner_value().len(), 48);
        assert_eq!(handler.user_encrypted().len(), 32);
        assert_passwords_authenticate(&handler);
    }

    #[test]
    fn authenticate_password_r6() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV3R6, None);
        assert_eq!(handler.revision(), 6);
        assert_eq!(handler.permissions_encrypted().len(), 16);
        assert_passwords_authenticate(&handler);
    }

    #[test]
    fn invalid_key_lengths_are_rejected() {
        let cases = [
            (EncryptionAlgorithm::Rc4V1, 128),
            (EncryptionAlgorithm::Rc4V2, 44),
            (EncryptionAlgorithm::Rc4V2, 32),
            (EncryptionAlgorithm::Rc4V2, 256),
            (EncryptionAlgorithm::AesV2, 256),
            (EncryptionAlgorithm::AesV3R5, 128),
            (EncryptionAlgorithm::AesV3R6, 40),
        ];

        for (algorithm, key_length) in cases {
            if !algorithm.is_enabled() {
                continue;
            }
            let result = PasswordAlgorithm::create("u", "o", Permissions::empty(), algorithm, Some(key_length));
            assert!(
                matches!(result, Err(EncryptionError::InvalidEncryptionDict(_))),
                "{} with {} bits was accepted",
                algorithm,
                key_length
            );
        }
    }

    #[test]
    #[cfg(feature = "rc4")]
    fn unencrypted_metadata_selects_revision_4_for_rc4() {
        let handler = PasswordAlgorithm::create_with_metadata(
            "user",
            "owner",
            Permissions::empty(),
            EncryptionAlgorithm::Rc4V2,
            None,
            false,
        )
        .unwrap();
        assert_eq!(handler.revision(), 4);
        assert!(!handler.is_metadata_encrypted());

        let result = PasswordAlgorithm::create_with_metadata(
            "user",
            "owner",
            Permissions::empty(),
            EncryptionAlgorithm::Rc4V1,
            None,
            false,
        );
        assert!(matches!(result, Err(EncryptionError::InvalidEncryptionDict(_))));
    }

    #[test]
    fn created_handler_requires_initialization() {
        let handler =
            PasswordAlgorithm::create("user", "owner", Permissions::empty(), EncryptionAlgorithm::AesV2, None).unwrap();
        assert!(!handler.is_initialized());
        assert!(!handler.is_parsed());

        let mut context = EncryptionContext::new();
        assert!(matches!(
            handler.authenticate("user", DOCUMENT_ID, &mut context),
            Err(EncryptionError::InternalLogic(_))
        ));

        let mut out = Vec::new();
        assert!(matches!(
            handler.encrypt_to(&mut out, b"data", &mut context, (1, 0)),
            Err(EncryptionError::InternalLogic(_))
        ));
    }

    #[test]
    fn initialization_wipes_passwords() {
        let mut handler =
            PasswordAlgorithm::create("user", "owner", Permissions::empty(), EncryptionAlgorithm::AesV3R6, None)
                .unwrap();

        let mut context = EncryptionContext::new();
        handler.ensure_encryption_initialized(DOCUMENT_ID, &mut context).unwrap();

        assert!(handler.user_password.is_empty());
        assert!(handler.owner_password.is_empty());
        assert!(handler.is_owner_password_set());

        // A second call only checks the context.
        let key = context.encryption_key().to_vec();
        handler.ensure_encryption_initialized(DOCUMENT_ID, &mut context).unwrap();
        assert_eq!(context.encryption_key(), &key[..]);

        let mut fresh = EncryptionContext::new();
        assert!(matches!(
            handler.ensure_encryption_initialized(DOCUMENT_ID, &mut fresh),
            Err(EncryptionError::InternalLogic(_))
        ));
    }

    #[test]
    fn validate_permissions_needs_the_key() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV3R6, None);

        let mut context = EncryptionContext::new();
        assert!(!handler.validate_permissions(&context));

        handler.authenticate("user", DOCUMENT_ID, &mut context).unwrap();
        assert!(handler.validate_permissions(&context));

        let mut tampered = handler.clone();
        tampered.permissions = Permissions::from_bits_retain(Permissions::all().p_value());
        assert!(!tampered.validate_permissions(&context));
    }

    #[test]
    fn failed_authentication_clears_the_key() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV2, None);

        let mut context = EncryptionContext::new();
        handler.authenticate("user", DOCUMENT_ID, &mut context).unwrap();
        assert_eq!(context.encryption_key().len(), 16);

        assert_eq!(
            handler.authenticate("wrongpass", DOCUMENT_ID, &mut context).unwrap(),
            AuthResult::Failed
        );
        assert!(context.encryption_key().is_empty());
        assert!(!context.is_authenticated());
    }

    #[test]
    fn stream_geometry() {
        let handler = create_and_initialize(EncryptionAlgorithm::AesV2, None);
        assert_eq!(handler.calculate_stream_offset(), 16);
        assert_eq!(handler.calculate_stream_length(0), 32);
        assert_eq!(handler.calculate_stream_length(1), 32);
        assert_eq!(handler.calculate_stream_length(15), 32);
        assert_eq!(handler.calculate_stream_length(16), 48);
        assert_eq!(handler.calculate_stream_length(17), 48);

        #[cfg(feature = "rc4")]
        {
            let handler = create_and_initialize(EncryptionAlgorithm::Rc4V2, None);
            assert_eq!(handler.calculate_stream_offset(), 0);
            assert_eq!(handler.calculate_stream_length(17), 17);
        }
    }

    #[test]
    fn permission_queries() {
        let handler = PasswordAlgorithm::create(
            "",
            "",
            Permissions::PRINTABLE | Permissions::ASSEMBLABLE,
            EncryptionAlgorithm::AesV2,
            None,
        )
        .unwrap();

        assert!(handler.is_print_allowed());
        assert!(handler.is_doc_assembly_allowed());
        assert!(!handler.is_edit_allowed());
        assert!(!handler.is_copy_allowed());
        assert!(!handler.is_edit_notes_allowed());
        assert!(!handler.is_fill_and_sign_allowed());
        assert!(!handler.is_accessibility_allowed());
        assert!(!handler.is_high_print_allowed());
        assert!(!handler.is_owner_password_set());
        assert_eq!(handler.permissions().bits(), 0xFFFF_F4C4);
    }

    #[test]
    fn enabled_algorithms_follow_features() {
        let enabled = enabled_algorithms();
        assert!(enabled.contains(EncryptionAlgorithms::AESV2 | EncryptionAlgorithms::AESV3R5 | EncryptionAlgorithms::AESV3R6));
        assert_eq!(enabled.contains(EncryptionAlgorithms::RC4V1), cfg!(feature = "rc4"));
        assert_eq!(EncryptionAlgorithm::Rc4V2.is_enabled(), cfg!(feature = "rc4"));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let handler =
            PasswordAlgorithm::create("hunter2", "swordfish", Permissions::empty(), EncryptionAlgorithm::AesV2, None)
                .unwrap();
        let output = format!("{:?}", handler);
        assert!(!output.contains("hunter2"));
        assert!(!output.contains("swordfish"));
        assert!(output.contains("AesV2"));
    }
}
