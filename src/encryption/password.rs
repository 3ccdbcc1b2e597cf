use super::EncryptionError;
use zeroize::Zeroizing;

// If the password string is less than 32 bytes long, pad it by appending the required number of
// additional bytes from the beginning of the following padding string.
pub(crate) const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00,
    0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Passwords of revision 5 and 6 are truncated to this many UTF-8 bytes after normalization.
pub(crate) const MAX_UTF8_PASSWORD_LEN: usize = 127;

/// Pads or truncates `password` to exactly 32 bytes (revisions 2 to 4).
pub(crate) fn pad_password(password: &[u8]) -> Zeroizing<[u8; 32]> {
    let len = password.len().min(32);

    let mut padded = Zeroizing::new([0u8; 32]);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PAD_BYTES[..32 - len]);

    padded
}

/// Normalizes `password` with the SASLprep profile of stringprep and truncates the UTF-8 result to
/// 127 bytes (revisions 5 and 6).
pub(crate) fn prepare_password(password: &str) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let prepared = stringprep::saslprep(password)?;
    let mut bytes = Zeroizing::new(prepared.as_bytes().to_vec());
    bytes.truncate(MAX_UTF8_PASSWORD_LEN);

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_are_padded() {
        let padded = pad_password(b"user");
        assert_eq!(&padded[..4], b"user");
        assert_eq!(&padded[4..], &PAD_BYTES[..28]);

        assert_eq!(*pad_password(b""), PAD_BYTES);
    }

    #[test]
    fn long_passwords_are_truncated() {
        let password = [b'x'; 40];
        assert_eq!(*pad_password(&password), [b'x'; 32]);
    }

    #[test]
    fn saslprep_maps_and_truncates() {
        // U+00A0 NO-BREAK SPACE maps to a regular space.
        assert_eq!(&prepare_password("a\u{00A0}b").unwrap()[..], b"a b");
        // U+00AD SOFT HYPHEN is mapped to nothing.
        assert_eq!(&prepare_password("pass\u{00AD}word").unwrap()[..], b"password");

        let long = "\u{00E9}".repeat(100);
        let prepared = prepare_password(&long).unwrap();
        assert_eq!(prepared.len(), MAX_UTF8_PASSWORD_LEN);
    }

    #[test]
    fn prohibited_characters_are_rejected() {
        // U+0007 BELL is a prohibited control character.
        assert!(matches!(
            prepare_password("bell\u{0007}"),
            Err(EncryptionError::InvalidPassword(_))
        ));
    }
}
