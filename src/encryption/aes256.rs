use super::algorithms::PasswordAlgorithm;
use super::context::AuthResult;
use super::password::prepare_password;
use super::{EncryptionError, fill_random};
use aes::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyInit as _, KeyIvInit as _};
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256EcbEnc = ecb::Encryptor<aes::Aes256>;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256EcbDec = ecb::Decryptor<aes::Aes256>;

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Computes the password hash of revisions 5 and 6 (algorithm 2.B).
///
/// `user_value` is the 48-byte U entry when hashing an owner password and `None` otherwise.
pub(crate) fn compute_hash(
    revision: u8,
    password: &[u8],
    salt: &[u8],
    user_value: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let mut hasher = Sha256::new();

    hasher.update(password);
    hasher.update(salt);

    if let Some(user_value) = user_value {
        hasher.update(user_value);
    }

    let mut k = Zeroizing::new(hasher.finalize().to_vec());

    // Revision 5 stops after the first SHA-256 hash.
    if revision < 6 {
        return Ok(k);
    }

    let user_value_len = user_value.map(|user_value| user_value.len()).unwrap_or(0);
    let mut k1 = Zeroizing::new(Vec::with_capacity(64 * (password.len() + 64 + user_value_len)));

    for round in 1u32.. {
        // Make a new string, K1, consisting of 64 repetitions of the sequence: input password, K,
        // the 48-byte user key.
        k1.clear();

        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);

            if let Some(user_value) = user_value {
                k1.extend_from_slice(user_value);
            }
        }

        // Encrypt K1 with the AES-128 (CBC, no padding) algorithm, using the first 16 bytes of K
        // as the key and the second 16 bytes of K as the initialization vector. The result of
        // this encryption is E.
        let mut encryptor = Aes128CbcEnc::new_from_slices(&k[..16], &k[16..32])
            .map_err(|_| EncryptionError::InternalLogic("error initializing AES encryption engine"))?;

        for block in k1.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(block.into());
        }

        let e = &k1;

        // Taking the first 16 bytes of E as an unsigned big-endian integer, compute the remainder,
        // modulo 3. If the result is 0, the next hash used is SHA-256, if the result is 1, the
        // next hash used is SHA-384, if the result is 2, the next hash used is SHA-512.
        //
        // The sum of the bytes has the same remainder modulo 3 as the big-endian integer.
        k = Zeroizing::new(match e[..16].iter().map(|v| *v as u32).sum::<u32>() % 3 {
            0 => Sha256::digest(&e[..]).to_vec(),
            1 => Sha384::digest(&e[..]).to_vec(),
            _ => Sha512::digest(&e[..]).to_vec(),
        });

        // Do the above steps at least 64 times, until the last byte of E is less than or equal to
        // the round number minus 32.
        if round >= 64 && e.last().copied().unwrap_or(0) as u32 <= round - 32 {
            break;
        }
    }

    // The first 32 bytes of the final K are the output of the algorithm.
    k.truncate(32);

    Ok(k)
}

/// Encrypts a 32-byte file encryption key with AES-256 in CBC mode, no padding and a zero IV.
fn wrap_key(hash: &[u8], key: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut wrapped = key.to_vec();
    let mut encryptor = Aes256CbcEnc::new_from_slices(hash, &ZERO_IV)
        .map_err(|_| EncryptionError::InternalLogic("error initializing AES encryption engine"))?;

    for block in wrapped.chunks_exact_mut(16) {
        encryptor.encrypt_block_mut(block.into());
    }

    Ok(wrapped)
}

/// Reverses [`wrap_key`].
fn unwrap_key(hash: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let mut key = Zeroizing::new(wrapped[..wrapped.len().min(32)].to_vec());
    let mut decryptor = Aes256CbcDec::new_from_slices(hash, &ZERO_IV)
        .map_err(|_| EncryptionError::InternalLogic("error initializing AES decryption engine"))?;

    for block in key.chunks_exact_mut(16) {
        decryptor.decrypt_block_mut(block.into());
    }

    Ok(key)
}

/// Builds a 48-byte U or O value: 32-byte hash, 8-byte validation salt, 8-byte key salt.
fn hashed_password_value<F>(compute: F) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), EncryptionError>
where
    F: Fn(&[u8]) -> Result<Zeroizing<Vec<u8>>, EncryptionError>,
{
    let mut value = vec![0u8; 48];
    fill_random(&mut value[32..])?;

    let hash = compute(&value[32..40])?;
    value[..32].copy_from_slice(&hash);

    let key_hash = compute(&value[40..48])?;

    Ok((value, key_hash))
}

impl PasswordAlgorithm {
    /// Computes the U and UE values (algorithm 8).
    pub(crate) fn compute_user_values_r6(
        &self,
        key: &[u8],
        user_password: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), EncryptionError> {
        let (user_value, key_hash) =
            hashed_password_value(|salt| compute_hash(self.revision, user_password, salt, None))?;

        let user_encrypted = wrap_key(&key_hash, key)?;

        Ok((user_value, user_encrypted))
    }

    /// Computes the O and OE values (algorithm 9). The U value must already be set.
    pub(crate) fn compute_owner_values_r6(
        &self,
        key: &[u8],
        owner_password: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), EncryptionError> {
        let (owner_value, key_hash) = hashed_password_value(|salt| {
            compute_hash(self.revision, owner_password, salt, Some(&self.user_value))
        })?;

        let owner_encrypted = wrap_key(&key_hash, key)?;

        Ok((owner_value, owner_encrypted))
    }

    fn permissions_block(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];

        // Set bytes 0-3 to the 32 bits of the P value, low-order byte first, and bytes 4-7 to
        // 0xFF, as permissions are extended to 64 bits.
        bytes[..4].copy_from_slice(&self.permissions.bits().to_le_bytes());
        bytes[4..8].copy_from_slice(&[0xFF; 4]);

        // Set byte 8 to 'T' if EncryptMetadata is true, 'F' otherwise.
        bytes[8] = if self.encrypt_metadata { b'T' } else { b'F' };

        // Set bytes 9-11 to the characters 'a', 'd', 'b'. Bytes 12-15 are left zero.
        bytes[9..12].copy_from_slice(b"adb");

        bytes
    }

    /// Computes the Perms value (algorithm 10).
    pub(crate) fn compute_permissions(&self, key: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut bytes = self.permissions_block();

        // Encrypt the 16-byte block using AES-256 in ECB mode with the file encryption key.
        let mut encryptor = Aes256EcbEnc::new_from_slice(key)
            .map_err(|_| EncryptionError::InternalLogic("error initializing AES encryption engine"))?;
        encryptor.encrypt_block_mut((&mut bytes[..]).into());

        Ok(bytes.to_vec())
    }

    /// Checks the Perms value against P and EncryptMetadata (algorithm 13).
    pub(crate) fn permissions_match(&self, key: &[u8]) -> bool {
        if self.permissions_encrypted.len() < 16 {
            return false;
        }

        let Ok(mut decryptor) = Aes256EcbDec::new_from_slice(key) else {
            return false;
        };

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.permissions_encrypted[..16]);
        decryptor.decrypt_block_mut((&mut bytes[..]).into());

        let expected = self.permissions_block();

        // Bytes 9-11 must be "adb", the first bytes must match P and byte 8 the EncryptMetadata
        // flag.
        bytes[9..12] == expected[9..12] && bytes[..4] == expected[..4] && bytes[8] == expected[8]
    }

    /// Tries `password` as user password, then as owner password (algorithm 2.A). Returns the
    /// file encryption key unwrapped from UE or OE on success.
    pub(crate) fn authenticate_r6(
        &self,
        password: &str,
    ) -> Result<(AuthResult, Option<Zeroizing<Vec<u8>>>), EncryptionError> {
        let password = prepare_password(password)?;

        let hashed_user_password = &self.user_value[..32];
        let user_validation_salt = &self.user_value[32..40];
        let user_key_salt = &self.user_value[40..48];

        if compute_hash(self.revision, &password, user_validation_salt, None)?[..] == *hashed_user_password {
            let hash = compute_hash(self.revision, &password, user_key_salt, None)?;
            let key = unwrap_key(&hash, &self.user_encrypted)?;

            return Ok((AuthResult::User, Some(key)));
        }

        let hashed_owner_password = &self.owner_value[..32];
        let owner_validation_salt = &self.owner_value[32..40];
        let owner_key_salt = &self.owner_value[40..48];
        let user_value = Some(&self.user_value[..48]);

        if compute_hash(self.revision, &password, owner_validation_salt, user_value)?[..] == *hashed_owner_password {
            let hash = compute_hash(self.revision, &password, owner_key_salt, user_value)?;
            let key = unwrap_key(&hash, &self.owner_encrypted)?;

            return Ok((AuthResult::Owner, Some(key)));
        }

        Ok((AuthResult::Failed, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{EncryptionAlgorithm, EncryptionContext, Permissions};

    #[test]
    fn revision_6_hash_matches_known_value_and_differs_from_revision_5() {
        let salt = [1, 2, 3, 4, 5, 6, 7, 8];
        let user_value = [0x5Au8; 48];

        let r5 = compute_hash(5, b"Secret1", &salt, None).unwrap();
        let r6 = compute_hash(6, b"Secret1", &salt, None).unwrap();

        assert_eq!(r5.len(), 32);
        assert_eq!(r6.len(), 32);
        assert_ne!(r5, r6);
        assert_eq!(r6, compute_hash(6, b"Secret1", &salt, None).unwrap());
        assert_eq!(
            r6[..],
            [
                0xdd, 0x0b, 0x4e, 0xbc, 0x72, 0x1c, 0x81, 0x25, 0x0e, 0xa5, 0xba, 0xff, 0xc1, 0x35, 0x0b, 0x1d, 0x9f,
                0xf6, 0x92, 0xca, 0xb0, 0x2f, 0xad, 0xd5, 0xfe, 0xeb, 0x11, 0x1a, 0xc1, 0xf0, 0x63, 0xad,
            ]
        );

        // Revision 5 is the plain SHA-256 hash.
        assert_eq!(r5[..], Sha256::digest(b"Secret1\x01\x02\x03\x04\x05\x06\x07\x08")[..]);

        let with_user = compute_hash(6, b"Secret1", &salt, Some(&user_value)).unwrap();
        assert_ne!(with_user, r6);
    }

    #[test]
    fn revision_6_hash_accepts_empty_and_long_passwords() {
        let salt = [0u8; 8];
        assert_eq!(compute_hash(6, b"", &salt, None).unwrap().len(), 32);
        assert_eq!(compute_hash(6, &[b'p'; 127], &salt, Some(&[0u8; 48])).unwrap().len(), 32);
    }

    #[test]
    fn key_wrapping_round_trips() {
        let hash = [7u8; 32];
        let key: Vec<u8> = (0u8..32).collect();

        let wrapped = wrap_key(&hash, &key).unwrap();
        assert_ne!(wrapped, key);
        assert_eq!(*unwrap_key(&hash, &wrapped).unwrap(), key);
    }

    #[test]
    fn user_and_owner_keys_unwrap_to_the_same_key() {
        let mut handler =
            PasswordAlgorithm::create("Secret1", "", Permissions::PRINTABLE, EncryptionAlgorithm::AesV3R6, None)
                .unwrap();
        let mut context = EncryptionContext::new();
        handler.ensure_encryption_initialized(b"document", &mut context).unwrap();
        let key = context.encryption_key().to_vec();

        let (result, user_key) = handler.authenticate_r6("Secret1").unwrap();
        assert_eq!(result, AuthResult::User);
        assert_eq!(user_key.unwrap().to_vec(), key);

        let (result, owner_key) = handler.authenticate_r6("").unwrap();
        assert_eq!(result, AuthResult::Owner);
        assert_eq!(owner_key.unwrap().to_vec(), key);
    }

    #[test]
    fn permissions_block_layout() {
        let mut handler = PasswordAlgorithm::create(
            "",
            "",
            Permissions::PRINTABLE | Permissions::COPYABLE,
            EncryptionAlgorithm::AesV3R5,
            None,
        )
        .unwrap();

        let block = handler.permissions_block();
        assert_eq!(&block[..4], &[0xD4, 0xF0, 0xFF, 0xFF]);
        assert_eq!(&block[4..8], &[0xFF; 4]);
        assert_eq!(block[8], b'T');
        assert_eq!(&block[9..12], b"adb");
        assert_eq!(&block[12..], &[0; 4]);

        handler.encrypt_metadata = false;
        assert_eq!(handler.permissions_block()[8], b'F');
    }

    #[test]
    fn permissions_validate_against_the_file_key() {
        let mut handler =
            PasswordAlgorithm::create("", "", Permissions::PRINTABLE, EncryptionAlgorithm::AesV3R6, None).unwrap();
        let key = [0x42u8; 32];

        handler.permissions_encrypted = handler.compute_permissions(&key).unwrap();
        assert!(handler.permissions_match(&key));
        assert!(!handler.permissions_match(&[0x43u8; 32]));

        handler.permissions = Permissions::from_bits_retain(Permissions::COPYABLE.p_value());
        assert!(!handler.permissions_match(&key));
    }
}
