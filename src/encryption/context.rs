use super::rc4::{Rc4Cache, Rc4Keystream};
use log::trace;
use std::fmt;
use zeroize::Zeroizing;

/// Outcome of authenticating a password against the security handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthResult {
    /// No password has been checked yet.
    #[default]
    Unknown,
    /// The password matched neither credential.
    Failed,
    /// The password is the user password.
    User,
    /// The password is the owner password.
    Owner,
}

/// Per-session state of an encrypted document.
///
/// Holds the file encryption key recovered by authentication, the outcome of that
/// authentication and scratch state of the stream ciphers. The key is only meaningful once
/// [`EncryptionContext::is_authenticated`] returns `true`. Key material is wiped when the
/// context is dropped.
#[derive(Clone, Default)]
pub struct EncryptionContext {
    encryption_key: Zeroizing<[u8; 32]>,
    key_len: usize,
    auth_result: AuthResult,
    document_id: Vec<u8>,
    rc4_cache: Option<Box<Rc4Cache>>,
}

impl EncryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_result(&self) -> AuthResult {
        self.auth_result
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth_result, AuthResult::User | AuthResult::Owner)
    }

    /// The file encryption key. Empty until a key has been derived or recovered.
    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key[..self.key_len]
    }

    /// The first element of the trailer /ID array the key was derived against.
    pub fn document_id(&self) -> &[u8] {
        &self.document_id
    }

    pub(crate) fn set_encryption_key(&mut self, key: &[u8]) {
        let len = key.len().min(self.encryption_key.len());
        self.encryption_key.fill(0);
        self.encryption_key[..len].copy_from_slice(&key[..len]);
        self.key_len = len;
        // A new key invalidates any schedule derived from the previous one.
        self.rc4_cache = None;
    }

    pub(crate) fn set_auth_result(&mut self, auth_result: AuthResult) {
        self.auth_result = auth_result;
    }

    pub(crate) fn set_document_id(&mut self, document_id: &[u8]) {
        self.document_id = document_id.to_vec();
    }

    /// Returns a fresh RC4 keystream for `key`, reusing the cached key schedule when the same
    /// object key was used last.
    pub(crate) fn rc4_keystream(&mut self, key: &[u8]) -> Rc4Keystream {
        if let Some(cache) = self.rc4_cache.as_deref().filter(|cache| cache.matches(key)) {
            trace!("reusing cached RC4 key schedule");
            return cache.keystream();
        }

        trace!("computing RC4 key schedule");
        let cache = Box::new(Rc4Cache::new(key));
        let keystream = cache.keystream();
        self.rc4_cache = Some(cache);
        keystream
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("encryption_key", &"<redacted>")
            .field("key_len", &self.key_len)
            .field("auth_result", &self.auth_result)
            .field("document_id_len", &self.document_id.len())
            .field("rc4_cache", &self.rc4_cache.is_some())
            .finish()
    }
}
