use super::rc4::Rc4;
use super::{AES_IV_LENGTH, EncryptionError, fill_random};
use crate::ObjectId;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use md5::{Digest as _, Md5};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The cipher applied to strings and streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CryptFilter {
    /// RC4 with an object key of up to 16 bytes.
    Rc4,
    /// AES-128 in CBC mode with an object key derived from the file key.
    Aes128,
    /// AES-256 in CBC mode using the file key directly.
    Aes256,
}

impl CryptFilter {
    /// The CFM name of the filter.
    pub fn method(&self) -> &'static [u8] {
        match self {
            CryptFilter::Rc4 => b"V2",
            CryptFilter::Aes128 => b"AESV2",
            CryptFilter::Aes256 => b"AESV3",
        }
    }

    /// Derives the key used for the strings and streams of the object `obj_id` (algorithm 1).
    pub fn compute_key(&self, key: &[u8], obj_id: ObjectId) -> Zeroizing<Vec<u8>> {
        if *self == CryptFilter::Aes256 {
            // Use the 32-byte file encryption key for the AES-256 symmetric key algorithm.
            return Zeroizing::new(key.to_vec());
        }

        let mut hasher = Md5::new();

        hasher.update(key);

        // Treating the object number and generation number as binary integers, extend the
        // original n-byte file encryption key to n + 5 bytes by appending the low-order 3 bytes of
        // the object number and the low-order 2 bytes of the generation number in that order,
        // low-order byte first.
        hasher.update(&obj_id.0.to_le_bytes()[..3]);
        hasher.update(&obj_id.1.to_le_bytes()[..2]);

        // If using the AES algorithm, extend the file encryption key an additional 4 bytes by
        // adding the value "sAlT".
        if *self == CryptFilter::Aes128 {
            hasher.update(b"sAlT");
        }

        // Use the first (n + 5) bytes, up to a maximum of 16, of the output from the MD5 hash as
        // the key for the symmetric key algorithm.
        let key_len = std::cmp::min(key.len() + 5, 16);
        Zeroizing::new(hasher.finalize()[..key_len].to_vec())
    }

    /// Encrypts a complete string or stream. AES output starts with a random IV.
    pub fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if *self == CryptFilter::Rc4 {
            return Ok(Rc4::new(key).encrypt(plaintext));
        }

        // The ciphertext needs to be a multiple of 16 bytes to include the padding.
        let ciphertext_len = (plaintext.len() + 16) / 16 * 16;

        let mut iv = [0u8; AES_IV_LENGTH];
        fill_random(&mut iv)?;

        // Combine the IV and the plaintext.
        let mut ciphertext = Vec::with_capacity(AES_IV_LENGTH + ciphertext_len);
        ciphertext.extend_from_slice(&iv);
        ciphertext.extend_from_slice(plaintext);
        ciphertext.resize(AES_IV_LENGTH + ciphertext_len, 0);

        // For an original message length of M, the pad shall consist of 16 - (M mod 16) bytes
        // whose value shall also be 16 - (M mod 16).
        let buffer = &mut ciphertext[AES_IV_LENGTH..];
        let result = match self {
            CryptFilter::Aes128 => Aes128CbcEnc::new_from_slices(key, &iv)
                .map_err(|_| EncryptionError::InternalLogic("invalid AES-128 key length"))?
                .encrypt_padded_mut::<Pkcs7>(buffer, plaintext.len())
                .map(|_| ()),
            _ => Aes256CbcEnc::new_from_slices(key, &iv)
                .map_err(|_| EncryptionError::InternalLogic("invalid AES-256 key length"))?
                .encrypt_padded_mut::<Pkcs7>(buffer, plaintext.len())
                .map(|_| ()),
        };
        result.map_err(|_| EncryptionError::InternalLogic("error padding AES plaintext"))?;

        Ok(ciphertext)
    }

    /// Decrypts a complete string or stream.
    pub fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if *self == CryptFilter::Rc4 {
            return Ok(Rc4::new(key).decrypt(ciphertext));
        }

        // There is nothing to decrypt if the ciphertext is empty or only contains the IV.
        if ciphertext.len() <= AES_IV_LENGTH {
            return Ok(Vec::new());
        }

        if (ciphertext.len() - AES_IV_LENGTH) % 16 != 0 {
            return Err(EncryptionError::InternalLogic(
                "AES ciphertext length is not a multiple of the block size",
            ));
        }

        let (iv, data) = ciphertext.split_at(AES_IV_LENGTH);
        let mut data = data.to_vec();

        let plaintext_len = match self {
            CryptFilter::Aes128 => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| EncryptionError::InternalLogic("invalid AES-128 key length"))?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(|plaintext| plaintext.len()),
            _ => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| EncryptionError::InternalLogic("invalid AES-256 key length"))?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(|plaintext| plaintext.len()),
        }
        .map_err(|_| EncryptionError::InternalLogic("invalid AES padding"))?;

        data.truncate(plaintext_len);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    const FILE_KEY: &str = "746e1c7eca6ada9b48afd690ed4e77ea";

    #[test]
    fn object_keys() {
        let key = hex(FILE_KEY);

        assert_eq!(
            *CryptFilter::Rc4.compute_key(&key, (7, 0)),
            hex("ae806ac2cfc4873cf73ef435252c17c6")
        );
        assert_eq!(
            *CryptFilter::Aes128.compute_key(&key, (7, 0)),
            hex("38fbf45324173bd66270a78cabea532e")
        );
        assert_eq!(*CryptFilter::Aes256.compute_key(&[9u8; 32], (7, 0)), vec![9u8; 32]);

        // A 40-bit key yields a 10-byte object key.
        assert_eq!(CryptFilter::Rc4.compute_key(&key[..5], (1, 0)).len(), 10);
    }

    #[test]
    fn rc4_string() {
        let key = CryptFilter::Rc4.compute_key(&hex(FILE_KEY), (7, 0));
        let ciphertext = CryptFilter::Rc4.encrypt(&key, b"Hello, world!").unwrap();
        assert_eq!(ciphertext, hex("f4b59b6678dde4c1dff05b9fc6"));
        assert_eq!(CryptFilter::Rc4.decrypt(&key, &ciphertext).unwrap(), b"Hello, world!");
    }

    #[test]
    fn aes_ciphertext_layout() {
        for (filter, key) in [(CryptFilter::Aes128, vec![1u8; 16]), (CryptFilter::Aes256, vec![2u8; 32])] {
            for len in [0usize, 1, 15, 16, 17, 100] {
                let plaintext = vec![0xA5u8; len];
                let ciphertext = filter.encrypt(&key, &plaintext).unwrap();
                assert_eq!(ciphertext.len(), AES_IV_LENGTH + (len / 16 + 1) * 16);
                assert_eq!(filter.decrypt(&key, &ciphertext).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn aes_uses_a_fresh_iv() {
        let key = [3u8; 16];
        let first = CryptFilter::Aes128.encrypt(&key, b"same").unwrap();
        let second = CryptFilter::Aes128.encrypt(&key, b"same").unwrap();
        assert_ne!(first[..AES_IV_LENGTH], second[..AES_IV_LENGTH]);
    }

    #[test]
    fn aes_short_input_is_empty() {
        let key = [3u8; 16];
        assert!(CryptFilter::Aes128.decrypt(&key, b"").unwrap().is_empty());
        assert!(CryptFilter::Aes128.decrypt(&key, &[0u8; 16]).unwrap().is_empty());
        assert!(CryptFilter::Aes128.decrypt(&key, &[0u8; 7]).unwrap().is_empty());
    }

    #[test]
    fn aes_rejects_malformed_ciphertext() {
        let key = [3u8; 16];

        assert!(matches!(
            CryptFilter::Aes128.decrypt(&key, &[0u8; 40]),
            Err(EncryptionError::InternalLogic(_))
        ));

        // Flipping the last byte of the final block destroys the padding.
        let mut ciphertext = CryptFilter::Aes128.encrypt(&key, b"0123456789").unwrap();
        let last = ciphertext.len() - 17;
        ciphertext[last] ^= 0x0F;
        assert!(matches!(
            CryptFilter::Aes128.decrypt(&key, &ciphertext),
            Err(EncryptionError::InternalLogic(_))
        ));
    }

    #[test]
    fn aes_rejects_wrong_key_size() {
        assert!(matches!(
            CryptFilter::Aes128.encrypt(&[0u8; 5], b"data"),
            Err(EncryptionError::InternalLogic(_))
        ));
        assert!(matches!(
            CryptFilter::Aes256.decrypt(&[0u8; 16], &[0u8; 32]),
            Err(EncryptionError::InternalLogic(_))
        ));
    }
}
