//! The body spool (part of C5, §4.5, §8 property 7): a write-once/read-many
//! buffer that keeps the first slice of the message body in memory and
//! spills the rest to a temp file once it grows past `max_mem`.
//!
//! Grounded on the teacher's `MessageHandler::handle_body`, which hands the
//! filter raw chunks with no buffering of its own — the accumulation here is
//! new, built the way the on-domain `miltr` crate treats oversized payloads
//! (spill rather than hold an unbounded `Vec` in memory), using `tempfile`
//! (a teacher dependency the original code never exercised) for the on-disk
//! half.

use std::io::{Read, Seek, SeekFrom, Write};

use bytes::{Bytes, BytesMut};
use tempfile::NamedTempFile;

use crate::error::{Error, UsageError};

/// What to do when a message's body would exceed `max_total` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail the whole message with an application error.
    Reject,
    /// Drop everything collected so far and stop accumulating.
    Clear,
    /// Keep the first `max_total` bytes, silently drop the rest.
    Truncate,
}

/// Accumulates one message body. `write` is called once per `B` event in
/// arrival order; `read_all`/`seek_to_start` may be called any number of
/// times afterward, but never interleaved with further writes.
pub struct BodySpool {
    mem: BytesMut,
    spill: Option<NamedTempFile>,
    max_mem: usize,
    max_total: usize,
    policy: OverflowPolicy,
    total_len: usize,
    read_started: bool,
}

impl BodySpool {
    pub fn new(max_mem: usize, max_total: usize, policy: OverflowPolicy) -> Self {
        Self {
            mem: BytesMut::new(),
            spill: None,
            max_mem,
            max_total,
            policy,
            total_len: 0,
            read_started: false,
        }
    }

    /// Append one `B` event's chunk.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.read_started {
            return Err(UsageError::WriteAfterRead.into());
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let prospective = self.total_len + chunk.len();
        if prospective > self.max_total {
            return match self.policy {
                OverflowPolicy::Reject => Err(Error::application(format!(
                    "body of at least {prospective} bytes exceeds the configured max of {} bytes",
                    self.max_total
                ))),
                OverflowPolicy::Clear => {
                    self.mem.clear();
                    self.spill = None;
                    self.total_len = 0;
                    Ok(())
                }
                OverflowPolicy::Truncate => {
                    let allowed = self.max_total.saturating_sub(self.total_len);
                    self.append(&chunk[..allowed.min(chunk.len())])
                }
            };
        }

        self.append(chunk)
    }

    fn append(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.spill.is_none() && self.mem.len() + chunk.len() <= self.max_mem {
            self.mem.extend_from_slice(chunk);
        } else {
            if self.spill.is_none() {
                let mut file = NamedTempFile::new()?;
                file.write_all(&self.mem)?;
                self.mem = BytesMut::new();
                self.spill = Some(file);
            }
            self.spill.as_mut().unwrap().write_all(chunk)?;
        }
        self.total_len += chunk.len();
        Ok(())
    }

    /// Materialize the whole body as one buffer. Flips the spool into
    /// read-only mode: any further `write` returns [`UsageError::WriteAfterRead`].
    pub fn read_all(&mut self) -> Result<Bytes, Error> {
        self.read_started = true;
        match &mut self.spill {
            Some(file) => {
                file.as_file_mut().seek(SeekFrom::Start(0))?;
                let mut buf = Vec::with_capacity(self.total_len);
                file.as_file_mut().read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
            None => Ok(self.mem.clone().freeze()),
        }
    }

    /// Rewind to the start without reading; also flips the spool read-only.
    pub fn seek_to_start(&mut self) -> Result<(), Error> {
        self.read_started = true;
        if let Some(file) = &mut self.spill {
            file.as_file_mut().seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }

    pub fn spill_path(&self) -> Option<std::path::PathBuf> {
        self.spill.as_ref().map(|f| f.path().to_path_buf())
    }

    /// Remove the spill file, if any. Idempotent — safe to call from both an
    /// explicit `close()` and a `Drop` impl further up the stack.
    pub fn close(&mut self) {
        self.spill.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_body_stays_in_memory() {
        let mut spool = BodySpool::new(1024, 4096, OverflowPolicy::Reject);
        spool.write(b"hello ").unwrap();
        spool.write(b"world").unwrap();
        assert!(!spool.is_spilled());
        assert_eq!(spool.read_all().unwrap(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn body_past_max_mem_spills_to_disk_and_round_trips() {
        let mut spool = BodySpool::new(8, 4096, OverflowPolicy::Reject);
        spool.write(b"0123456789").unwrap();
        spool.write(b"abcdef").unwrap();
        assert!(spool.is_spilled());
        assert_eq!(spool.read_all().unwrap(), Bytes::from_static(b"0123456789abcdef"));
    }

    #[test]
    fn write_after_read_fails() {
        let mut spool = BodySpool::new(1024, 4096, OverflowPolicy::Reject);
        spool.write(b"abc").unwrap();
        spool.read_all().unwrap();
        let err = spool.write(b"more").unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::WriteAfterRead)));
    }

    #[test]
    fn reject_policy_errors_once_cap_exceeded() {
        let mut spool = BodySpool::new(1024, 8, OverflowPolicy::Reject);
        assert!(spool.write(b"0123456789").is_err());
    }

    #[test]
    fn truncate_policy_keeps_first_n_bytes() {
        let mut spool = BodySpool::new(1024, 8, OverflowPolicy::Truncate);
        spool.write(b"0123456789").unwrap();
        assert_eq!(spool.len(), 8);
        assert_eq!(spool.read_all().unwrap(), Bytes::from_static(b"01234567"));
    }

    #[test]
    fn clear_policy_drops_everything_collected() {
        let mut spool = BodySpool::new(1024, 8, OverflowPolicy::Clear);
        spool.write(b"0123456789").unwrap();
        assert_eq!(spool.len(), 0);
        assert!(spool.read_all().unwrap().is_empty());
    }

    #[test]
    fn close_removes_the_spill_file() {
        let mut spool = BodySpool::new(4, 4096, OverflowPolicy::Reject);
        spool.write(b"0123456789").unwrap();
        let path = spool.spill_path().unwrap();
        assert!(path.exists());
        spool.close();
        assert!(!path.exists());
        spool.close(); // idempotent
    }
}
