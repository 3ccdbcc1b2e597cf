use super::algorithms::PasswordAlgorithm;
use super::context::AuthResult;
use super::password::{PAD_BYTES, pad_password};
use super::rc4::Rc4;
use md5::{Digest as _, Md5};
use zeroize::Zeroizing;

/// Order of the XOR keys of the 20 RC4 rounds used for revision 3 and 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Rounds {
    /// Round i uses the key XORed with i.
    Encrypt,
    /// Round i uses the key XORed with 19 - i, undoing [`Rounds::Encrypt`].
    Decrypt,
}

/// Runs the 20 RC4 rounds of revisions 3 and 4 over `data` in place.
fn rc4_rounds(key: &[u8], data: &mut [u8], rounds: Rounds) {
    let mut round_key = Zeroizing::new(vec![0u8; key.len()]);

    for i in 0..20u8 {
        let xor = match rounds {
            Rounds::Encrypt => i,
            Rounds::Decrypt => 19 - i,
        };

        for (in_byte, out_byte) in key.iter().zip(round_key.iter_mut()) {
            *out_byte = in_byte ^ xor;
        }

        Rc4::new(&round_key[..]).keystream().apply(data);
    }
}

impl PasswordAlgorithm {
    /// The RC4 key derived from the owner password (algorithm 3, steps a to d).
    fn owner_password_key_r4(&self, owner_password: &[u8; 32]) -> Zeroizing<Vec<u8>> {
        let n = self.key_length_bytes();

        // Initialise the MD5 hash function and pass the padded owner password as input to this
        // function.
        let mut hash = Md5::digest(owner_password);

        // (Security handlers of revision 3 or greater) Do the following 50 times: Take the output
        // from the previous MD5 hash and pass only the first n bytes as input into a new MD5 hash,
        // where n is the key length in bytes.
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(&hash[..n]);
            }

            Zeroizing::new(hash[..n].to_vec())
        } else {
            // (Security handlers of revision 2) The key is always 5 bytes long.
            Zeroizing::new(hash[..5].to_vec())
        }
    }

    /// Applies the owner key transformation to `input` (algorithm 3).
    ///
    /// With [`Rounds::Encrypt`] and the padded user password as `input` this computes the O
    /// value. With [`Rounds::Decrypt`] and the O value as `input` it recovers the padded user
    /// password.
    pub(crate) fn transform_owner_key_r4(&self, owner_password: &[u8; 32], input: &[u8], rounds: Rounds) -> [u8; 32] {
        let key = self.owner_password_key_r4(owner_password);

        let mut result = [0u8; 32];
        let len = input.len().min(32);
        result[..len].copy_from_slice(&input[..len]);

        if self.revision >= 3 {
            rc4_rounds(&key, &mut result, rounds);
        } else {
            Rc4::new(&key[..]).keystream().apply(&mut result);
        }

        result
    }

    /// Computes the O value from the padded owner and user passwords.
    pub(crate) fn compute_owner_value_r4(&self, owner_password: &[u8; 32], user_password: &[u8; 32]) -> [u8; 32] {
        self.transform_owner_key_r4(owner_password, user_password, Rounds::Encrypt)
    }

    /// Computes the file encryption key (algorithm 2).
    pub(crate) fn compute_encryption_key_r4(
        &self,
        document_id: &[u8],
        user_password: &[u8; 32],
        owner_value: &[u8],
    ) -> Zeroizing<Vec<u8>> {
        let n = self.key_length_bytes();

        let mut hasher = Md5::new();

        // Pass the padded password to the MD5 hash function.
        hasher.update(user_password);

        // Pass the value of the encryption dictionary's O entry to the MD5 hash function.
        hasher.update(&owner_value[..owner_value.len().min(32)]);

        // Convert the integer value of the P entry to a 32-bit unsigned binary number and pass
        // these bytes to the MD5 hash function, low-order byte first.
        hasher.update(self.permissions.bits().to_le_bytes());

        // Pass the first element of the file's file identifier array to the MD5 hash function.
        hasher.update(document_id);

        // If document metadata is not being encrypted, pass 4 bytes with the value 0xFFFFFFFF to
        // the MD5 hash function.
        if !self.encrypt_metadata {
            hasher.update(b"\xff\xff\xff\xff");
        }

        let mut hash = hasher.finalize();

        // (Security handlers of revision 3 or greater) Do the following 50 times: Take the output
        // from the previous MD5 hash and pass the first n bytes of the output as input into a new
        // MD5 hash.
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(&hash[..n]);
            }
        }

        Zeroizing::new(hash[..n].to_vec())
    }

    /// Computes the U value from the file encryption key (algorithms 4 and 5).
    pub(crate) fn compute_user_value_r4(&self, key: &[u8], document_id: &[u8]) -> [u8; 32] {
        let mut result = [0u8; 32];

        if self.revision >= 3 {
            // Pass the padding string and the first element of the file identifier array to the
            // MD5 hash function.
            let mut hasher = Md5::new();
            hasher.update(PAD_BYTES);
            hasher.update(document_id);
            result[..16].copy_from_slice(&hasher.finalize());

            // Encrypt the 16-byte result of the hash with 20 rounds of RC4. The remaining 16 bytes
            // stay zero.
            rc4_rounds(key, &mut result[..16], Rounds::Encrypt);
        } else {
            // Encrypt the padding string with RC4 using the file encryption key.
            result = PAD_BYTES;
            Rc4::new(key).keystream().apply(&mut result);
        }

        result
    }

    /// Compares the first `n` bytes of a computed U value against the stored one, where `n` is
    /// the key length in bytes.
    fn check_key_r4(&self, computed: &[u8], stored: &[u8]) -> bool {
        let n = self.key_length_bytes();
        computed.len() >= n && stored.len() >= n && computed[..n] == stored[..n]
    }

    /// Tries `password` as user password, then as owner password. Returns the recovered file
    /// encryption key on success.
    pub(crate) fn authenticate_r4(
        &self,
        password: &[u8],
        document_id: &[u8],
    ) -> (AuthResult, Option<Zeroizing<Vec<u8>>>) {
        let password = pad_password(password);

        // Algorithm 6: authenticating the user password.
        let key = self.compute_encryption_key_r4(document_id, &password, &self.owner_value);
        if self.check_key_r4(&self.compute_user_value_r4(&key, document_id), &self.user_value) {
            return (AuthResult::User, Some(key));
        }

        // Algorithm 7: authenticating the owner password. Decrypting O with the key derived from
        // the candidate yields the padded user password, which is then checked as above.
        let user_password = Zeroizing::new(self.transform_owner_key_r4(&password, &self.owner_value, Rounds::Decrypt));
        let key = self.compute_encryption_key_r4(document_id, &user_password, &self.owner_value);
        if self.check_key_r4(&self.compute_user_value_r4(&key, document_id), &self.user_value) {
            return (AuthResult::Owner, Some(key));
        }

        (AuthResult::Failed, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{EncryptionAlgorithm, Permissions};

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn document_id() -> Vec<u8> {
        (0u8..16).collect()
    }

    fn handler(algorithm: EncryptionAlgorithm, permissions: Permissions) -> PasswordAlgorithm {
        PasswordAlgorithm::create("user", "owner", permissions, algorithm, None).unwrap()
    }

    #[test]
    #[cfg(feature = "rc4")]
    fn rc4_128_reference_values() {
        let handler = handler(EncryptionAlgorithm::Rc4V2, Permissions::PRINTABLE | Permissions::COPYABLE);
        let user_password = pad_password(b"user");
        let owner_password = pad_password(b"owner");

        let owner_value = handler.compute_owner_value_r4(&owner_password, &user_password);
        assert_eq!(
            owner_value.to_vec(),
            hex("0ba3835f88f90388e74e54584125ce142be0de24c6b0d37746e075b891756671")
        );

        let key = handler.compute_encryption_key_r4(&document_id(), &user_password, &owner_value);
        assert_eq!(*key, hex("746e1c7eca6ada9b48afd690ed4e77ea"));

        let user_value = handler.compute_user_value_r4(&key, &document_id());
        assert_eq!(user_value[..16], hex("a9fc820563d3703c38129863a537a414")[..]);
        assert_eq!(user_value[16..], [0u8; 16]);
    }

    #[test]
    #[cfg(feature = "rc4")]
    fn rc4_40_reference_values() {
        let handler = handler(EncryptionAlgorithm::Rc4V1, Permissions::PRINTABLE);
        let user_password = pad_password(b"user");
        let owner_password = pad_password(b"owner");

        let owner_value = handler.compute_owner_value_r4(&owner_password, &user_password);
        assert_eq!(
            owner_value.to_vec(),
            hex("94e8094419662a774442fb072e3d9f19e9d130ec09a4d0061e78fe920f7ab62f")
        );

        let key = handler.compute_encryption_key_r4(&document_id(), &user_password, &owner_value);
        assert_eq!(*key, hex("f630a15a20"));

        let user_value = handler.compute_user_value_r4(&key, &document_id());
        assert_eq!(
            user_value.to_vec(),
            hex("1bbc8a6b9af238c91ba010885e4c4fff0e3b0ecf44d7597559fd47732ffb4c9c")
        );
    }

    #[test]
    fn reverse_rounds_recover_the_user_password() {
        for algorithm in [EncryptionAlgorithm::Rc4V1, EncryptionAlgorithm::Rc4V2, EncryptionAlgorithm::AesV2] {
            if !algorithm.is_enabled() {
                continue;
            }

            let handler = handler(algorithm, Permissions::empty());
            let user_password = pad_password(b"user");
            let owner_password = pad_password(b"owner");

            let owner_value = handler.compute_owner_value_r4(&owner_password, &user_password);
            let recovered = handler.transform_owner_key_r4(&owner_password, &owner_value, Rounds::Decrypt);
            assert_eq!(recovered, *user_password);
        }
    }

    #[test]
    fn unencrypted_metadata_changes_the_key() {
        let encrypted = handler(EncryptionAlgorithm::AesV2, Permissions::empty());
        let mut unencrypted = encrypted.clone();
        unencrypted.encrypt_metadata = false;

        let user_password = pad_password(b"user");
        let owner_value = [0x11u8; 32];

        assert_ne!(
            encrypted.compute_encryption_key_r4(&document_id(), &user_password, &owner_value),
            unencrypted.compute_encryption_key_r4(&document_id(), &user_password, &owner_value)
        );
    }

    #[test]
    fn permissions_are_bound_into_the_key() {
        let printable = handler(EncryptionAlgorithm::AesV2, Permissions::PRINTABLE);
        let copyable = handler(EncryptionAlgorithm::AesV2, Permissions::COPYABLE);

        let user_password = pad_password(b"user");
        let owner_value = [0x22u8; 32];

        assert_ne!(
            printable.compute_encryption_key_r4(&document_id(), &user_password, &owner_value),
            copyable.compute_encryption_key_r4(&document_id(), &user_password, &owner_value)
        );
    }
}
