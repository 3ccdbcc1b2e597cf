use pdfcrypt::{EncryptionAlgorithm, EncryptionContext, EncryptionOptions, PasswordAlgorithm, Permissions};

/// First element of the trailer /ID array shared by the tests.
#[allow(dead_code)]
pub const DOCUMENT_ID: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

/// Every algorithm compiled into this build.
#[allow(dead_code)]
pub fn algorithms() -> Vec<EncryptionAlgorithm> {
    [
        EncryptionAlgorithm::Rc4V1,
        EncryptionAlgorithm::Rc4V2,
        EncryptionAlgorithm::AesV2,
        EncryptionAlgorithm::AesV3R5,
        EncryptionAlgorithm::AesV3R6,
    ]
    .into_iter()
    .filter(|algorithm| algorithm.is_enabled())
    .collect()
}

/// Creates a handler with the "user"/"owner" passwords and initializes it against
/// [`DOCUMENT_ID`].
#[allow(dead_code)]
pub fn new_handler(algorithm: EncryptionAlgorithm) -> (PasswordAlgorithm, EncryptionContext) {
    let mut handler = EncryptionOptions::builder()
        .user_password("user")
        .owner_password("owner")
        .permissions(Permissions::PRINTABLE | Permissions::COPYABLE)
        .algorithm(algorithm)
        .build()
        .into_handler()
        .unwrap();

    let mut context = EncryptionContext::new();
    handler.ensure_encryption_initialized(&DOCUMENT_ID, &mut context).unwrap();

    (handler, context)
}
