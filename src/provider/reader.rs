//! Per-thread read handles.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use super::{lock, Shared};
use crate::container::layout::{block_of, block_skip, ciphertext_offset, clamp_len, Header};
use crate::crypto::{clear_bytes, iv_for_block, AesKey, CipherReader, CtrTransform, AES_BLOCK_SIZE};
use crate::error::{ProviderError, Result};

/// A thread's read handle, shared only with `release()` and commit so they
/// can close it.
pub(super) type Slot = Arc<Mutex<Option<ReadHandle>>>;

/// Open file handle plus the header of the epoch it was opened in.
pub(super) struct ReadHandle {
    pub(super) file: File,
    pub(super) header: Header,
    pub(super) generation: u64,
}

impl ReadHandle {
    pub(super) fn new(file: File, header: Header, generation: u64) -> Self {
        Self {
            file,
            header,
            generation,
        }
    }

    /// Decrypt up to `buf.len()` bytes from plaintext `offset`.
    ///
    /// Seeks to the enclosing block, starts a keystream at that block's
    /// IV, discards the bytes before `offset`, then decrypts the request.
    pub(super) fn decrypt_at(
        &mut self,
        key: &AesKey,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let len = clamp_len(self.header.plaintext_size, offset, buf.len() as u64) as usize;
        if len == 0 {
            return Ok(0);
        }

        let block = block_of(offset);
        let skip = block_skip(offset);
        log::debug!("read offset={} len={} block={} skip={}", offset, len, block, skip);

        let transform =
            CtrTransform::new_decryptor(key.as_bytes(), &iv_for_block(&self.header.iv, block))?;
        self.file
            .seek(SeekFrom::Start(ciphertext_offset(block * AES_BLOCK_SIZE as u64)))?;

        let out = &mut buf[..len];
        let mut stream = CipherReader::new(&mut self.file, transform);
        let result = match stream.skip_exact(skip) {
            Ok(()) => stream.read_exact(out),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            clear_bytes(out);
            return Err(ProviderError::Io(e));
        }
        Ok(len)
    }
}

/// Slot for the calling thread, created on its first read.
pub(super) fn slot_for_current_thread(shared: &Shared) -> Slot {
    let mut slots = lock(&shared.slots);
    Arc::clone(
        slots
            .entry(std::thread::current().id())
            .or_insert_with(|| Arc::new(Mutex::new(None))),
    )
}

/// Read handle owned by one thread.
///
/// Holds its own file handle, so reads never touch the provider's
/// per-thread map. A commit or `release()` on the provider invalidates the
/// handle; the next read reopens the container transparently.
pub struct Reader {
    shared: Arc<Shared>,
    handle: Option<ReadHandle>,
}

impl Reader {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            handle: None,
        }
    }

    /// Read up to `length` plaintext bytes starting at `offset`.
    pub fn read(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let available = clamp_len(self.shared.header()?.plaintext_size, offset, length);
        let available = usize::try_from(available)
            .map_err(|_| ProviderError::Unsupported("read length exceeds address space"))?;

        let mut buf = vec![0u8; available];
        let n = self.read_into(offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.shared.read_at(&mut self.handle, offset, buf)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.shared.header()?.plaintext_size)
    }
}
