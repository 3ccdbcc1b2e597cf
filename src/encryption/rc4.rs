// The RC4 algorithm is very simple to implement, so it is kept in-tree rather than pulled in
// as a dependency for the legacy security handlers.
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Rc4 {
    initial_state: [u8; 256],
}

impl Rc4 {
    pub fn new<Key: AsRef<[u8]>>(key: Key) -> Self {
        let key = key.as_ref();
        debug_assert!(!key.is_empty() && key.len() <= 256);

        let mut initial_state = [0_u8; 256];
        for (i, v) in initial_state.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j = 0_u8;
        for (i, key_byte) in (0..256).zip(key.iter().cycle()) {
            j = j.wrapping_add(initial_state[i]).wrapping_add(*key_byte);
            initial_state.swap(i, j as usize);
        }

        Self { initial_state }
    }

    /// Starts a keystream from the beginning.
    pub fn keystream(&self) -> Rc4Keystream {
        Rc4Keystream {
            state: self.initial_state,
            i: 0,
            j: 0,
        }
    }

    /// Allocates a new Vec<u8> of the same length as `input` and encrypts
    ///  `input` into it.
    pub fn encrypt<Input>(&self, input: Input) -> Vec<u8>
    where
        Input: AsRef<[u8]>,
    {
        let mut output = input.as_ref().to_vec();
        self.keystream().apply(&mut output);
        output
    }

    /// Allocates a new Vec<u8> of the same length as `input` and decrypts
    ///  `input` into it.
    pub fn decrypt<Input>(&self, input: Input) -> Vec<u8>
    where
        Input: AsRef<[u8]>,
    {
        // Rc4 is symmetric
        self.encrypt(input)
    }
}

/// Running RC4 state. Successive calls to [`Rc4Keystream::apply`] continue where the previous
/// call stopped, which lets a stream be transformed in arbitrary chunks.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Rc4Keystream {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4Keystream {
    /// Encrypts/decrypts `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        let state = &mut self.state;
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(state[self.i as usize]);
            state.swap(self.i as usize, self.j as usize);
            let key_byte = state[(state[self.i as usize].wrapping_add(state[self.j as usize])) as usize];
            *byte ^= key_byte;
        }
    }
}

/// Key schedule of the most recently used object key.
///
/// Objects are usually processed one after the other, and a stream is often read more than once
/// (e.g. to sniff its filters before decoding it). Keeping the permutation of the last key avoids
/// rerunning the key schedule in that case.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Rc4Cache {
    key: Vec<u8>,
    cipher: Rc4,
}

impl Rc4Cache {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            cipher: Rc4::new(key),
        }
    }

    pub fn matches(&self, key: &[u8]) -> bool {
        self.key == key
    }

    pub fn keystream(&self) -> Rc4Keystream {
        self.cipher.keystream()
    }
}
