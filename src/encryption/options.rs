use super::{EncryptionAlgorithm, EncryptionError, PasswordAlgorithm, Permissions};
use std::fmt;
use zeroize::Zeroizing;

/// Options for encrypting a new document
#[derive(Clone)]
pub struct EncryptionOptions {
    /// Password required to open the document
    pub user_password: Zeroizing<String>,

    /// Password granting full access to the document
    pub owner_password: Zeroizing<String>,

    /// Operations allowed to users who authenticate with the user password
    pub permissions: Permissions,

    /// Encryption scheme
    pub algorithm: EncryptionAlgorithm,

    /// Key length in bits, `None` for the default of the algorithm
    pub key_length: Option<u32>,

    /// Whether metadata streams are encrypted as well
    pub encrypt_metadata: bool,
}

impl Default for EncryptionOptions {
    fn default() -> Self {
        Self {
            user_password: Zeroizing::new(String::new()),
            owner_password: Zeroizing::new(String::new()),
            permissions: Permissions::all(),
            algorithm: EncryptionAlgorithm::AesV3R6,
            key_length: None,
            encrypt_metadata: true,
        }
    }
}

impl EncryptionOptions {
    /// Create a builder for EncryptionOptions
    pub fn builder() -> EncryptionOptionsBuilder {
        EncryptionOptionsBuilder::default()
    }

    /// Creates the security handler described by the options. Invalid combinations of algorithm,
    /// key length and metadata flag are rejected here.
    pub fn into_handler(self) -> Result<PasswordAlgorithm, EncryptionError> {
        PasswordAlgorithm::create_with_metadata(
            &self.user_password,
            &self.owner_password,
            self.permissions,
            self.algorithm,
            self.key_length,
            self.encrypt_metadata,
        )
    }
}

impl fmt::Debug for EncryptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionOptions")
            .field("permissions", &self.permissions)
            .field("algorithm", &self.algorithm)
            .field("key_length", &self.key_length)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

/// Builder for EncryptionOptions
#[derive(Default)]
pub struct EncryptionOptionsBuilder {
    options: EncryptionOptions,
}

impl EncryptionOptionsBuilder {
    /// Set the user password
    pub fn user_password(mut self, value: &str) -> Self {
        self.options.user_password = Zeroizing::new(value.to_owned());
        self
    }

    /// Set the owner password
    pub fn owner_password(mut self, value: &str) -> Self {
        self.options.owner_password = Zeroizing::new(value.to_owned());
        self
    }

    /// Set the permissions granted to the user
    pub fn permissions(mut self, value: Permissions) -> Self {
        self.options.permissions = value;
        self
    }

    pub fn algorithm(mut self, value: EncryptionAlgorithm) -> Self {
        self.options.algorithm = value;
        self
    }

    /// Set the key length in bits
    pub fn key_length(mut self, value: u32) -> Self {
        self.options.key_length = Some(value);
        self
    }

    /// Enable or disable encryption of metadata streams
    pub fn encrypt_metadata(mut self, value: bool) -> Self {
        self.options.encrypt_metadata = value;
        self
    }

    /// Build the EncryptionOptions
    pub fn build(self) -> EncryptionOptions {
        self.options
    }
}
