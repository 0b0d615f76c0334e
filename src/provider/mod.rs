//! Seekable, thread-safe data provider over an AES-256-CTR container.
//!
//! Reads decrypt on the fly from any byte offset; nothing decrypted is
//! cached or written back to disk. Every reading thread gets its own file
//! handle, so concurrent reads never share a seek position or a keystream.
//!
//! Saving goes through a `WriteSession`: plaintext is encrypted under a
//! freshly sampled IV into a sibling temp file, which then atomically
//! replaces the container.
//!
//! Shared state is limited to the lazily loaded `Header` (IV and plaintext
//! size). It lives in an `Epoch` guarded by an `RwLock`; a commit or
//! `release()` moves to the next epoch, which forces every reader to reopen.

mod reader;
mod writer;


use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::ThreadId;

use crate::config::ProviderConfig;
use crate::container::layout::{self, clamp_len, Header};
use crate::container::{FileOps, StdFileOps};
use crate::crypto::AesKey;
use crate::error::{ProviderError, Result};

pub use reader::Reader;
pub use writer::{WriteMode, WriteSession};

use reader::{ReadHandle, Slot};
use writer::ActiveWrite;

/// Generation counter plus the header that belongs to it.
struct Epoch {
    generation: u64,
    header: Option<Header>,
}

impl Epoch {
    /// Drop the cached header and invalidate every open read handle.
    fn advance(&mut self) {
        self.generation += 1;
        self.header = None;
    }
}

/// State shared by the provider, its owned readers and its write session.
struct Shared {
    path: PathBuf,
    key: AesKey,
    config: ProviderConfig,
    fs: Arc<dyn FileOps>,
    epoch: RwLock<Epoch>,
    /// Per-thread read handles used by `Provider::read`.
    slots: Mutex<HashMap<ThreadId, Slot>>,
    write_state: Mutex<Option<ActiveWrite>>,
    next_session: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn generation(&self) -> u64 {
        read_lock(&self.epoch).generation
    }

    /// Header of the current epoch, loading it on first use.
    fn header(&self) -> Result<Header> {
        if let Some(header) = read_lock(&self.epoch).header {
            return Ok(header);
        }

        let mut epoch = write_lock(&self.epoch);
        if let Some(header) = epoch.header {
            return Ok(header);
        }
        let header = layout::load_header(&self.path)?;
        log::info!(
            "Opened encrypted file {:?} size {}",
            self.path,
            header.plaintext_size
        );
        epoch.header = Some(header);
        Ok(header)
    }

    /// Open a fresh read-only handle paired with the header of the epoch it
    /// was opened in. The epoch lock is held across the open so a commit
    /// cannot swap the file in between.
    fn open_handle(&self) -> Result<ReadHandle> {
        {
            let epoch = read_lock(&self.epoch);
            if let Some(header) = epoch.header {
                let file = File::open(&self.path)?;
                return Ok(ReadHandle::new(file, header, epoch.generation));
            }
        }

        let mut epoch = write_lock(&self.epoch);
        let mut file = File::open(&self.path)?;
        let header = match epoch.header {
            Some(header) => header,
            None => {
                let header = layout::read_header(&mut file, &self.path)?;
                log::info!(
                    "Opened encrypted file {:?} size {}",
                    self.path,
                    header.plaintext_size
                );
                epoch.header = Some(header);
                header
            }
        };
        Ok(ReadHandle::new(file, header, epoch.generation))
    }

    /// Decrypt into `buf` from `offset`, reusing `slot`'s handle when it is
    /// still current. I/O failures drop the handle so the next call reopens.
    fn read_at(
        &self,
        slot: &mut Option<ReadHandle>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let generation = self.generation();
        let mut handle = match slot.take() {
            Some(handle) if handle.generation == generation => handle,
            _ => {
                let handle = self.open_handle()?;
                log::debug!(
                    "Opened read handle on {:?} for {:?}",
                    self.path,
                    std::thread::current().id()
                );
                handle
            }
        };

        match handle.decrypt_at(&self.key, offset, buf) {
            Ok(n) => {
                *slot = Some(handle);
                Ok(n)
            }
            Err(ProviderError::Io(e)) => Err(ProviderError::Io(e)),
            Err(e) => {
                *slot = Some(handle);
                Err(e)
            }
        }
    }

    /// Close every per-thread read handle. Returns how many were dropped.
    fn close_readers(&self) -> usize {
        let mut slots = lock(&self.slots);
        let closed = slots.len();
        slots.clear();
        closed
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let name = self
            .path
            .file_name()
            .ok_or(ProviderError::Unsupported("container path has no file name"))?;
        let mut temp_name = name.to_os_string();
        temp_name.push(&self.config.temp_suffix);
        Ok(self.path.with_file_name(temp_name))
    }
}

/// Random-access, thread-safe reader and rewriter of one container file.
///
/// `Provider` is `Send + Sync`; share it between threads by reference or
/// through an `Arc`. Dropping it performs `release()`.
pub struct Provider {
    shared: Arc<Shared>,
}

impl Provider {
    /// Open an existing container with the default configuration.
    ///
    /// Fails with `CorruptHeader` if the file is shorter than its IV prefix.
    pub fn open(path: impl AsRef<Path>, key: AesKey) -> Result<Self> {
        Self::open_with(path, key, ProviderConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, key: AesKey, config: ProviderConfig) -> Result<Self> {
        Self::open_with_ops(path, key, config, Arc::new(StdFileOps))
    }

    /// Open with a custom `FileOps` used by the commit protocol.
    pub fn open_with_ops(
        path: impl AsRef<Path>,
        key: AesKey,
        config: ProviderConfig,
        fs: Arc<dyn FileOps>,
    ) -> Result<Self> {
        let provider = Self::unopened(path.as_ref(), key, config, fs)?;
        provider.shared.header()?;
        Ok(provider)
    }

    /// Seal `plaintext` into a new container at `path` and open it.
    ///
    /// Goes through the same temp-file-then-rename path as a rewrite, so an
    /// existing file at `path` is replaced atomically.
    pub fn create(path: impl AsRef<Path>, key: AesKey, plaintext: &[u8]) -> Result<Self> {
        Self::create_with(path, key, ProviderConfig::default(), plaintext)
    }

    pub fn create_with(
        path: impl AsRef<Path>,
        key: AesKey,
        config: ProviderConfig,
        plaintext: &[u8],
    ) -> Result<Self> {
        let provider = Self::unopened(path.as_ref(), key, config, Arc::new(StdFileOps))?;
        let mut session = provider.begin_write(WriteMode::Overwrite)?;
        session.write(plaintext)?;
        session.commit()?;
        provider.shared.header()?;
        Ok(provider)
    }

    fn unopened(
        path: &Path,
        key: AesKey,
        config: ProviderConfig,
        fs: Arc<dyn FileOps>,
    ) -> Result<Self> {
        let path = std::path::absolute(path)?;
        Ok(Self {
            shared: Arc::new(Shared {
                path,
                key,
                config: config.clamped(),
                fs,
                epoch: RwLock::new(Epoch {
                    generation: 0,
                    header: None,
                }),
                slots: Mutex::new(HashMap::new()),
                write_state: Mutex::new(None),
                next_session: AtomicU64::new(0),
            }),
        })
    }

    /// Read up to `length` plaintext bytes starting at `offset`.
    ///
    /// Requests running past the end return the available prefix; an
    /// `offset` at or beyond `size()` returns an empty buffer.
    ///
    /// The calling thread's file handle stays open until `release()` or the
    /// next commit, even after the thread exits. Long-lived thread pools
    /// that churn threads should hold a `Provider::reader()` per worker.
    pub fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let available = clamp_len(self.shared.header()?.plaintext_size, offset, length);
        let available = usize::try_from(available)
            .map_err(|_| ProviderError::Unsupported("read length exceeds address space"))?;

        let mut buf = vec![0u8; available];
        let n = self.read_into(offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Decrypt into `buf` starting at `offset`. Returns the number of bytes
    /// produced, which is short only at the end of the plaintext.
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let slot = reader::slot_for_current_thread(&self.shared);
        let mut handle = lock(&slot);
        self.shared.read_at(&mut handle, offset, buf)
    }

    /// An owned reader for the calling thread, independent of the shared
    /// per-thread slots.
    pub fn reader(&self) -> Reader {
        Reader::new(Arc::clone(&self.shared))
    }

    /// Plaintext size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.shared.header()?.plaintext_size)
    }

    /// Stable identifier: the container's absolute path.
    pub fn uid(&self) -> String {
        self.shared.path.to_string_lossy().into_owned()
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Containers carry no title.
    pub fn title(&self) -> Option<String> {
        None
    }

    pub fn can_write(&self) -> bool {
        true
    }

    /// Appending is rejected: a save always rewrites the whole container.
    pub fn supports_appending(&self) -> bool {
        false
    }

    /// Sibling temp file a write session encrypts into.
    pub fn temp_path(&self) -> Result<PathBuf> {
        self.shared.temp_path()
    }

    /// Close every per-thread handle and abort any active write session.
    ///
    /// The provider stays usable; later reads reopen the file and reload
    /// the header.
    pub fn release(&self) {
        let closed = self.shared.close_readers();
        write_lock(&self.shared.epoch).advance();

        let active = lock(&self.shared.write_state).take();
        if let Some(active) = active {
            log::warn!(
                "Releasing {:?} with an unfinished write session, discarding it",
                self.shared.path
            );
            active.discard(self.shared.fs.as_ref());
        }

        log::info!("Closing file {:?} ({} read handles)", self.shared.path, closed);
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("path", &self.shared.path)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
