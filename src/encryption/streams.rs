use super::rc4::Rc4Keystream;
use super::{AES_IV_LENGTH, EncryptionError, fill_random};
use aes::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use log::trace;
use std::io::{self, Read, Write};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK_SIZE: usize = 16;
const READ_CHUNK: usize = 4096;

/// Decrypts an RC4 encrypted stream of known length while it is read.
pub struct Rc4Reader<R> {
    inner: R,
    remaining: usize,
    keystream: Rc4Keystream,
}

impl<R: Read> Rc4Reader<R> {
    pub fn new(inner: R, len: usize, keystream: Rc4Keystream) -> Self {
        Self {
            inner,
            remaining: len,
            keystream,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Rc4Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = buf.len().min(self.remaining);
        if max == 0 {
            return Ok(0);
        }

        let n = self.inner.read(&mut buf[..max])?;
        self.keystream.apply(&mut buf[..n]);
        self.remaining -= n;

        Ok(n)
    }
}

/// Encrypts everything written to it with RC4.
pub struct Rc4Writer<W> {
    inner: W,
    keystream: Rc4Keystream,
    buffer: Vec<u8>,
}

impl<W: Write> Rc4Writer<W> {
    pub fn new(inner: W, keystream: Rc4Keystream) -> Self {
        Self {
            inner,
            keystream,
            buffer: Vec::new(),
        }
    }

    /// RC4 has no trailing data, finishing only flushes the sink.
    pub fn try_finish(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.try_finish()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Rc4Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.keystream.apply(&mut self.buffer);

        // The keystream has advanced over the whole buffer, so all of it has to reach the sink.
        self.inner.write_all(&self.buffer)?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum AesDecryptor {
    Aes128(Aes128CbcDec),
    Aes256(Aes256CbcDec),
}

impl AesDecryptor {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self, EncryptionError> {
        let decryptor = match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv).map(AesDecryptor::Aes128),
            32 => Aes256CbcDec::new_from_slices(key, iv).map(AesDecryptor::Aes256),
            _ => return Err(EncryptionError::InternalLogic("invalid AES key length")),
        };

        decryptor.map_err(|_| EncryptionError::InternalLogic("error initializing AES decryption engine"))
    }

    fn decrypt_block(&mut self, block: &mut [u8]) {
        match self {
            AesDecryptor::Aes128(decryptor) => decryptor.decrypt_block_mut(block.into()),
            AesDecryptor::Aes256(decryptor) => decryptor.decrypt_block_mut(block.into()),
        }
    }
}

/// Strips the PKCS#7 padding of the final block.
fn unpad(block: &[u8; BLOCK_SIZE]) -> Result<&[u8], EncryptionError> {
    let n = block[BLOCK_SIZE - 1] as usize;
    if n == 0 || n > BLOCK_SIZE || block[BLOCK_SIZE - n..].iter().any(|&v| v as usize != n) {
        return Err(EncryptionError::InternalLogic("invalid AES padding"));
    }

    Ok(&block[..BLOCK_SIZE - n])
}

/// Decrypts an AES-CBC encrypted stream of known length while it is read.
///
/// The stream starts with the 16-byte IV. The final block is held back until the end of the
/// input so that its padding can be removed.
pub struct AesReader<R> {
    inner: R,
    remaining: usize,
    key: Zeroizing<Vec<u8>>,
    decryptor: Option<AesDecryptor>,
    pending: Vec<u8>,
    held: Option<Zeroizing<[u8; BLOCK_SIZE]>>,
    output: Zeroizing<Vec<u8>>,
    position: usize,
    done: bool,
}

impl<R: Read> AesReader<R> {
    /// `len` is the length of the ciphertext including the IV. A 16-byte key selects AES-128, a
    /// 32-byte key AES-256.
    pub fn new(inner: R, len: usize, key: &[u8]) -> Self {
        Self {
            inner,
            remaining: len,
            key: Zeroizing::new(key.to_vec()),
            decryptor: None,
            pending: Vec::new(),
            held: None,
            output: Zeroizing::new(Vec::new()),
            position: 0,
            done: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_limited(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = buf.len().min(self.remaining);
        if max == 0 {
            return Ok(0);
        }

        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n;

        Ok(n)
    }

    fn read_iv(&mut self) -> io::Result<()> {
        let mut iv = [0u8; AES_IV_LENGTH];
        let mut filled = 0;

        while filled < AES_IV_LENGTH {
            match self.read_limited(&mut iv[filled..]) {
                Ok(0) => return Err(EncryptionError::UnexpectedEof("the AES stream is shorter than its IV").into()),
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        self.decryptor = Some(AesDecryptor::new(&self.key, &iv)?);

        Ok(())
    }

    /// Decrypts the next chunk of input into `output`.
    fn fill(&mut self) -> io::Result<()> {
        if self.decryptor.is_none() {
            self.read_iv()?;
        }

        self.output.clear();
        self.position = 0;

        let mut chunk = [0u8; READ_CHUNK];
        let n = loop {
            match self.read_limited(&mut chunk) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => break result?,
            }
        };

        if n == 0 {
            return self.finish_input();
        }

        self.pending.extend_from_slice(&chunk[..n]);

        let Some(decryptor) = self.decryptor.as_mut() else {
            return Err(EncryptionError::InternalLogic("the AES decryptor is not initialized").into());
        };

        let full = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        for block in self.pending[..full].chunks_exact(BLOCK_SIZE) {
            if let Some(previous) = self.held.take() {
                self.output.extend_from_slice(&previous[..]);
            }

            let mut plaintext = Zeroizing::new([0u8; BLOCK_SIZE]);
            plaintext.copy_from_slice(block);
            decryptor.decrypt_block(&mut plaintext[..]);
            self.held = Some(plaintext);
        }
        self.pending.drain(..full);

        Ok(())
    }

    fn finish_input(&mut self) -> io::Result<()> {
        self.done = true;

        if !self.pending.is_empty() {
            return Err(EncryptionError::InternalLogic("the AES stream ends with a partial block").into());
        }

        // A stream made of the IV alone decrypts to nothing.
        if let Some(last) = self.held.take() {
            let plaintext = unpad(&last)?;
            self.output.extend_from_slice(plaintext);
        }

        trace!("AES stream fully decrypted");

        Ok(())
    }
}

impl<R: Read> Read for AesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.position < self.output.len() {
                let n = buf.len().min(self.output.len() - self.position);
                buf[..n].copy_from_slice(&self.output[self.position..self.position + n]);
                self.position += n;
                return Ok(n);
            }

            if self.done || buf.is_empty() {
                return Ok(0);
            }

            self.fill()?;
        }
    }
}

/// Encrypts everything written to it with AES-128 in CBC mode.
///
/// A random IV is written in front of the first ciphertext block. The writer has to be finished
/// with [`AesWriter::finish`] or [`AesWriter::try_finish`] to emit the padded final block;
/// dropping it finishes it as well, ignoring errors.
pub struct AesWriter<W: Write> {
    inner: Option<W>,
    encryptor: Aes128CbcEnc,
    iv: [u8; AES_IV_LENGTH],
    iv_written: bool,
    pending: Zeroizing<Vec<u8>>,
    finished: bool,
}

impl<W: Write> AesWriter<W> {
    pub fn new(inner: W, key: &[u8]) -> Result<Self, EncryptionError> {
        let mut iv = [0u8; AES_IV_LENGTH];
        fill_random(&mut iv)?;

        let encryptor = Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| EncryptionError::InternalLogic("error initializing AES encryption engine"))?;

        Ok(Self {
            inner: Some(inner),
            encryptor,
            iv,
            iv_written: false,
            pending: Zeroizing::new(Vec::with_capacity(BLOCK_SIZE)),
            finished: false,
        })
    }

    fn sink(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("the AES writer has already been finished"))
    }

    fn write_iv(&mut self) -> io::Result<()> {
        if !self.iv_written {
            let iv = self.iv;
            self.sink()?.write_all(&iv)?;
            self.iv_written = true;
        }

        Ok(())
    }

    /// Pads and writes the final block. Further writes fail.
    pub fn try_finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }

        self.write_iv()?;

        // For an original message length of M, the pad shall consist of 16 - (M mod 16) bytes
        // whose value shall also be 16 - (M mod 16).
        let pad = BLOCK_SIZE - self.pending.len();
        self.pending.resize(BLOCK_SIZE, pad as u8);

        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&self.pending);
        self.encryptor.encrypt_block_mut((&mut block[..]).into());
        self.pending.clear();

        let sink = self.sink()?;
        sink.write_all(&block)?;
        sink.flush()?;

        self.finished = true;

        Ok(())
    }

    /// Finishes the stream and returns the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.try_finish()?;
        self.inner
            .take()
            .ok_or_else(|| io::Error::other("the AES writer has already been finished"))
    }
}

impl<W: Write> Write for AesWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::other("write after the AES stream was finished"));
        }

        self.write_iv()?;

        self.pending.extend_from_slice(buf);

        let full = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        if full == 0 {
            return Ok(buf.len());
        }

        let mut ciphertext = self.pending[..full].to_vec();
        for block in ciphertext.chunks_exact_mut(BLOCK_SIZE) {
            self.encryptor.encrypt_block_mut(block.into());
        }
        self.pending.drain(..full);

        self.sink()?.write_all(&ciphertext)?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink()?.flush()
    }
}

impl<W: Write> Drop for AesWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.try_finish();
        }
    }
}

/// Plaintext view of an encrypted stream, as returned by
/// [`PasswordAlgorithm::create_encryption_input_stream`](super::PasswordAlgorithm::create_encryption_input_stream).
pub enum DecryptReader<R> {
    Rc4(Rc4Reader<R>),
    Aes(AesReader<R>),
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecryptReader::Rc4(reader) => reader.read(buf),
            DecryptReader::Aes(reader) => reader.read(buf),
        }
    }
}

/// Encrypting sink, as returned by
/// [`PasswordAlgorithm::create_encryption_output_stream`](super::PasswordAlgorithm::create_encryption_output_stream).
pub enum EncryptWriter<W: Write> {
    Rc4(Rc4Writer<W>),
    Aes(AesWriter<W>),
}

impl<W: Write> EncryptWriter<W> {
    pub fn try_finish(&mut self) -> io::Result<()> {
        match self {
            EncryptWriter::Rc4(writer) => writer.try_finish(),
            EncryptWriter::Aes(writer) => writer.try_finish(),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            EncryptWriter::Rc4(writer) => writer.finish(),
            EncryptWriter::Aes(writer) => writer.finish(),
        }
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EncryptWriter::Rc4(writer) => writer.write(buf),
            EncryptWriter::Aes(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EncryptWriter::Rc4(writer) => writer.flush(),
            EncryptWriter::Aes(writer) => writer.flush(),
        }
    }
}
