//! Rewrite-on-save: the write session and its commit protocol.
//!
//! State machine: IDLE -> WRITING -> (COMMITTED | ABORTED) -> IDLE.
//! At most one session is active per provider.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{lock, write_lock, Provider, Shared};
use crate::container::{FileOps, TempFile};
use crate::crypto::{generate_iv, CipherWriter, CtrTransform};
use crate::error::{CommitStep, ProviderError, Result};

/// How a write session treats the existing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole container.
    Overwrite,
    /// Rejected: appending would continue the old file's counter range.
    Append,
}

/// Bookkeeping for the session currently writing into the temp file.
pub(super) struct ActiveWrite {
    id: u64,
    temp_path: PathBuf,
    writer: CipherWriter<BufWriter<Box<dyn TempFile>>>,
    written: u64,
    /// Set once a write fails; the session can then only be aborted.
    failed: Option<io::ErrorKind>,
}

impl ActiveWrite {
    /// Close and delete the temp file. Best effort.
    pub(super) fn discard(self, fs: &dyn FileOps) {
        let temp_path = self.temp_path;
        drop(self.writer);
        if let Err(e) = fs.remove_file(&temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to cleanup temp file {:?}: {}", temp_path, e);
            }
        }
    }
}

impl Provider {
    /// Start rewriting the container.
    ///
    /// Samples a fresh random IV, writes it to the sibling temp file and
    /// prepares an encryptor over the rest of that file. Readers keep
    /// seeing the old container until `WriteSession::commit` succeeds.
    pub fn begin_write(&self, mode: WriteMode) -> Result<WriteSession> {
        if mode == WriteMode::Append {
            return Err(ProviderError::Unsupported(
                "appending is not supported, rewrite the whole container",
            ));
        }

        let shared = &self.shared;
        let mut state = lock(&shared.write_state);
        if state.is_some() {
            return Err(ProviderError::WriteInProgress);
        }

        // Never reuse an IV with the same key: every rewrite gets a new one.
        let iv = generate_iv();
        let transform = CtrTransform::new_encryptor(shared.key.as_bytes(), &iv)?;

        let temp_path = shared.temp_path()?;
        let file = shared.fs.create_temp(&temp_path)?;

        let mut out = BufWriter::new(file);
        if let Err(e) = out.write_all(&iv) {
            drop(out);
            if let Err(cleanup) = shared.fs.remove_file(&temp_path) {
                log::warn!("Failed to cleanup temp file {:?}: {}", temp_path, cleanup);
            }
            return Err(e.into());
        }

        let id = shared.next_session.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Writing changes to {:?} to temporary file {:?}",
            shared.path,
            temp_path
        );
        *state = Some(ActiveWrite {
            id,
            temp_path,
            writer: CipherWriter::new(out, transform),
            written: 0,
            failed: None,
        });

        Ok(WriteSession {
            shared: Arc::clone(shared),
            id,
        })
    }
}

impl Shared {
    /// Remove session `id` from the write state, if it is still the active one.
    fn take_write(&self, id: u64) -> Result<ActiveWrite> {
        let mut state = lock(&self.write_state);
        match state.take() {
            Some(active) if active.id == id => Ok(active),
            other => {
                *state = other;
                Err(ProviderError::Unsupported("write session is no longer active"))
            }
        }
    }

    /// Flush the temp file and swap it in for the container.
    ///
    /// Every failure before the rename leaves the container untouched and
    /// deletes the temp file. A failed rename keeps the temp file around.
    fn commit(&self, active: ActiveWrite) -> Result<()> {
        let ActiveWrite {
            temp_path,
            writer,
            written,
            failed,
            ..
        } = active;

        let fail = |step: CommitStep, source: io::Error, keep_temp: bool| {
            log::error!("Commit of {:?} failed at {} step: {}", self.path, step, source);
            if !keep_temp {
                if let Err(e) = self.fs.remove_file(&temp_path) {
                    log::warn!("Failed to cleanup temp file {:?}: {}", temp_path, e);
                }
            }
            Err(ProviderError::CommitFailed { step, source })
        };

        if let Some(kind) = failed {
            drop(writer);
            return fail(
                CommitStep::Write,
                io::Error::new(kind, "an earlier write to the session failed"),
                false,
            );
        }

        let file = match writer
            .finish()
            .and_then(|out| out.into_inner().map_err(|e| e.into_error()))
        {
            Ok(file) => file,
            Err(e) => return fail(CommitStep::Flush, e, false),
        };

        if self.config.sync_on_commit {
            if let Err(e) = self.fs.sync(file.as_ref()) {
                drop(file);
                return fail(CommitStep::Sync, e, false);
            }
        }
        drop(file);

        // Holding the epoch lock first keeps readers from reopening the old
        // file between clearing the slots and the rename.
        let mut epoch = write_lock(&self.epoch);
        let closed = self.close_readers();
        if let Err(e) = self.fs.rename(&temp_path, &self.path) {
            drop(epoch);
            return fail(CommitStep::Rename, e, true);
        }
        // The new file carries a new IV and size; reload both lazily.
        epoch.advance();
        drop(epoch);

        log::info!(
            "Writing complete, replaced {:?} with new file of size {} ({} read handles closed)",
            self.path,
            written,
            closed
        );
        Ok(())
    }
}

/// An in-progress rewrite of a container.
///
/// Dropping the session without calling `commit` aborts it.
pub struct WriteSession {
    shared: Arc<Shared>,
    id: u64,
}

impl WriteSession {
    /// Encrypt `data` and append it to the temp file.
    ///
    /// After a failed write the session is poisoned: later writes fail and
    /// `commit` aborts. The live container is never touched.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.shared.write_state);
        let active = match state.as_mut() {
            Some(active) if active.id == self.id => active,
            _ => return Err(ProviderError::Unsupported("write session is no longer active")),
        };

        if let Some(kind) = active.failed {
            return Err(ProviderError::Io(io::Error::new(
                kind,
                "an earlier write to the session failed",
            )));
        }

        let limit = self.shared.config.max_plaintext_len;
        if active.written.saturating_add(data.len() as u64) > limit {
            return Err(ProviderError::CapacityExceeded { limit });
        }

        if let Err(e) = active.writer.write_all(data) {
            log::error!("Failed to write encrypted file - {}", e);
            active.failed = Some(e.kind());
            return Err(ProviderError::Io(e));
        }
        active.written += data.len() as u64;
        Ok(())
    }

    /// Plaintext bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        lock(&self.shared.write_state)
            .as_ref()
            .filter(|active| active.id == self.id)
            .map_or(0, |active| active.written)
    }

    /// Replace the container with everything written so far.
    ///
    /// On success, all read handles are closed and the next read loads the
    /// new IV and size. On failure the old container is intact and the
    /// session is over.
    pub fn commit(self) -> Result<()> {
        let active = self.shared.take_write(self.id)?;
        self.shared.commit(active)
    }

    /// Discard the temp file. The container is untouched.
    pub fn abort(self) -> Result<()> {
        let active = self.shared.take_write(self.id)?;
        log::info!("Aborting write to {:?}", self.shared.path);
        active.discard(self.shared.fs.as_ref());
        Ok(())
    }
}

impl Write for WriteSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriteSession::write(self, buf).map_err(|e| match e {
            ProviderError::Io(e) => e,
            other => io::Error::other(other),
        })?;
        Ok(buf.len())
    }

    /// Buffered ciphertext reaches the temp file on `commit`.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if let Ok(active) = self.shared.take_write(self.id) {
            log::warn!(
                "Write session for {:?} dropped without commit, discarding it",
                self.shared.path
            );
            active.discard(self.shared.fs.as_ref());
        }
    }
}
