use super::algorithms::{EncryptionAlgorithm, PasswordAlgorithm};
use super::{EncryptionError, Permissions};
use crate::{Dictionary, Error, Object, dictionary};
use log::{debug, warn};
use zeroize::Zeroizing;

/// Reads a byte string entry and checks that it has at least `len` bytes. Longer values are
/// truncated.
fn fixed_string(dict: &Dictionary, key: &[u8], len: usize, message: &'static str) -> crate::Result<Vec<u8>> {
    let value = dict.get(key)?.as_str()?;

    if value.len() < len {
        return Err(EncryptionError::InvalidEncryptionDict(message).into());
    }

    Ok(value[..len].to_vec())
}

/// The CFM entry of the crypt filter selected by StmF, if any.
fn stream_crypt_method(dict: &Dictionary) -> Option<&[u8]> {
    let name = dict.get(b"StmF").and_then(Object::as_name).unwrap_or(b"StdCF");

    dict.get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|filters| filters.get(name))
        .and_then(Object::as_dict)
        .and_then(|filter| filter.get(b"CFM"))
        .and_then(Object::as_name)
        .ok()
}

/// Rounds a parsed RC4 key length down to a multiple of 8 and clamps it to 40 to 128 bits.
fn normalize_rc4_key_length(length: i64) -> u32 {
    let normalized = (length - length % 8).clamp(40, 128);
    if normalized != length {
        warn!("normalized RC4 key length {} to {} bits", length, normalized);
    }
    normalized as u32
}

impl TryFrom<&Dictionary> for PasswordAlgorithm {
    type Error = Error;

    /// Reads the security handler from an encryption dictionary. The credentials are taken
    /// verbatim; the file encryption key has to be recovered with
    /// [`PasswordAlgorithm::authenticate`].
    fn try_from(dict: &Dictionary) -> Result<Self, Self::Error> {
        // Only the standard security handler is supported.
        let filter = dict.get(b"Filter").and_then(Object::as_name).unwrap_or(b"");
        if filter != b"Standard" {
            let filter = String::from_utf8_lossy(filter).into_owned();
            warn!("unsupported security handler /{}", filter);
            return Err(EncryptionError::UnsupportedFilter(format!("unsupported security handler /{}", filter)).into());
        }

        let version = dict.get(b"V")?.as_i64()?;
        let revision = dict.get(b"R")?.as_i64()?;
        let length = dict.get(b"Length").and_then(Object::as_i64).ok();
        let crypt_method = stream_crypt_method(dict);

        let (algorithm, key_length) = match (version, revision) {
            // (Deprecated in PDF 2.0) RC4 with a file encryption key length of 40 bits.
            (1, 2 | 3) => (EncryptionAlgorithm::Rc4V1, 40),
            // RC4 permitting file encryption key lengths greater than 40 bits, either through V 2
            // or through a V2 crypt filter.
            (2, 3) => (EncryptionAlgorithm::Rc4V2, normalize_rc4_key_length(length.unwrap_or(40))),
            _ if crypt_method == Some(&b"V2"[..]) => {
                // Crypt filters are only defined for V 4, where the key is 128 bits.
                let default = if version == 4 { 128 } else { 40 };
                (EncryptionAlgorithm::Rc4V2, normalize_rc4_key_length(length.unwrap_or(default)))
            }
            // (Deprecated in PDF 2.0) AES-128 through the AESV2 crypt filter.
            (4, 4) => (EncryptionAlgorithm::AesV2, 128),
            // (PDF 2.0) AES-256 through the AESV3 crypt filter.
            (5, 5) => (EncryptionAlgorithm::AesV3R5, 256),
            (5, 6) => (EncryptionAlgorithm::AesV3R6, 256),
            _ => {
                warn!("unsupported encryption method V {} R {}", version, revision);
                return Err(EncryptionError::UnsupportedFilter(format!(
                    "Unsupported encryption method Version={} Revision={}",
                    version, revision
                ))
                .into());
            }
        };

        if !algorithm.is_enabled() {
            warn!("{} is not enabled in this build", algorithm);
            return Err(EncryptionError::UnsupportedFilter(format!("{} is not enabled", algorithm)).into());
        }

        // The O and U entries are 32 bytes long if the value of R is 4 or less and 48 bytes long
        // if the value of R is 5 or greater.
        let value_len = if version == 5 { 48 } else { 32 };
        let owner_value = fixed_string(dict, b"O", value_len, "the /O entry is too short")?;
        let user_value = fixed_string(dict, b"U", value_len, "the /U entry is too short")?;

        let (owner_encrypted, user_encrypted, permissions_encrypted) = if version == 5 {
            (
                fixed_string(dict, b"OE", 32, "the /OE entry is too short")?,
                fixed_string(dict, b"UE", 32, "the /UE entry is too short")?,
                fixed_string(dict, b"Perms", 16, "the /Perms entry is too short")?,
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        let permissions = Permissions::from_p_value(dict.get(b"P")?.as_i64()?);

        // Only a boolean overrides the default.
        let encrypt_metadata = dict.get(b"EncryptMetadata").and_then(Object::as_bool).unwrap_or(true);

        debug!(
            "parsed {} security handler (revision {}, {}-bit key)",
            algorithm, revision, key_length
        );

        Ok(Self {
            algorithm,
            revision: revision as u8,
            key_length,
            permissions,
            encrypt_metadata,
            owner_value,
            user_value,
            owner_encrypted,
            user_encrypted,
            permissions_encrypted,
            parsed: true,
            initialized: true,
            owner_password_set: false,
            user_password: Zeroizing::new(String::new()),
            owner_password: Zeroizing::new(String::new()),
        })
    }
}

impl PasswordAlgorithm {
    /// Reads the security handler from the /Encrypt entry of a trailer dictionary.
    ///
    /// The entry has to be a direct dictionary; resolving references is up to the caller.
    pub fn from_trailer(trailer: &Dictionary) -> crate::Result<Self> {
        let encrypt = trailer.get(b"Encrypt").map_err(|_| Error::NotEncrypted)?;

        Self::try_from(encrypt.as_dict()?)
    }

    /// Writes the encryption dictionary of the handler.
    ///
    /// Fails with [`EncryptionError::InternalLogic`] until the handler is initialized (or
    /// parsed), since the O and U values are not computed before that.
    pub fn to_dictionary(&self) -> Result<Dictionary, EncryptionError> {
        if !self.initialized {
            return Err(EncryptionError::InternalLogic(
                "the encryption dictionary of an uninitialized handler was requested",
            ));
        }

        let mut dict = dictionary! {
            "Filter" => "Standard",
        };

        let crypt_filter_form = self.algorithm == EncryptionAlgorithm::AesV2
            || (self.algorithm == EncryptionAlgorithm::Rc4V2 && !self.encrypt_metadata);

        if crypt_filter_form {
            let method = self.algorithm.crypt_filter().method();

            dict.set(
                "CF",
                dictionary! {
                    "StdCF" => dictionary! {
                        "CFM" => Object::Name(method.to_vec()),
                        "Length" => 16,
                        "AuthEvent" => "DocOpen",
                    },
                },
            );
            dict.set("StrF", "StdCF");
            dict.set("StmF", "StdCF");
            dict.set("V", 4);
            dict.set("R", 4);
            dict.set("Length", 128);

            if !self.encrypt_metadata {
                dict.set("EncryptMetadata", false);
            }
        } else {
            match self.algorithm {
                EncryptionAlgorithm::Rc4V1 => {
                    dict.set("V", 1);
                    dict.set("R", self.revision);
                    dict.set("Length", 40);
                }
                EncryptionAlgorithm::Rc4V2 => {
                    dict.set("V", 2);
                    dict.set("R", 3);
                    dict.set("Length", self.key_length);
                }
                EncryptionAlgorithm::AesV2 => (),
                EncryptionAlgorithm::AesV3R5 | EncryptionAlgorithm::AesV3R6 => {
                    dict.set("V", 5);
                    dict.set("R", self.revision);
                    dict.set("Length", 256);
                    dict.set(
                        "CF",
                        dictionary! {
                            "StdCF" => dictionary! {
                                "CFM" => "AESV3",
                                "Length" => 32,
                                "AuthEvent" => "DocOpen",
                            },
                        },
                    );
                    dict.set("StrF", "StdCF");
                    dict.set("StmF", "StdCF");
                    dict.set("OE", Object::string_hex(self.owner_encrypted.clone()));
                    dict.set("UE", Object::string_hex(self.user_encrypted.clone()));
                    dict.set("Perms", Object::string_hex(self.permissions_encrypted.clone()));

                    if !self.encrypt_metadata {
                        dict.set("EncryptMetadata", false);
                    }
                }
            }
        }

        dict.set("O", Object::string_hex(self.owner_value.clone()));
        dict.set("U", Object::string_hex(self.user_value.clone()));
        dict.set("P", self.permissions.to_p_value());

        Ok(dict)
    }
}
