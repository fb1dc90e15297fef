//! Bounded in-memory byte pipes
//!
//! A pipe connects exactly one producer ([`PipeWriter`]) to exactly one
//! consumer ([`PipeReader`]). Bytes travel as chunks through a bounded
//! `async_channel`, so a producer that runs ahead of a slow consumer is
//! suspended instead of buffering without limit.
//!
//! Closing rules:
//! - dropping (or [`PipeWriter::close`]-ing) the writer makes the reader return
//!   end-of-stream once buffered bytes are consumed;
//! - [`PipeWriter::fail`] closes the writer abnormally: the reader returns one
//!   `UnexpectedEof` error carrying the reason, then end-of-stream;
//! - writing after the reader was dropped fails with `BrokenPipe`.

use async_channel::{Receiver, Sender};
use futures::io::AsyncRead;
use futures::stream::Stream;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

/// Sizing for a pipe's bounded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Number of chunks that may be buffered before the writer is suspended
    pub capacity: usize,
    /// Maximum size in bytes of a single chunk
    pub chunk_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            chunk_size: 1024,
        }
    }
}

impl PipeConfig {
    /// Upper bound of bytes held in the pipe at any time
    pub fn max_buffered(&self) -> usize {
        self.capacity * self.chunk_size
    }
}

/// State visible to both ends of a pipe
#[derive(Debug, Default)]
struct Shared {
    /// Set once, before the writer drops, when the producer failed
    failure: OnceLock<String>,
}

/// Create a connected writer/reader pair
pub fn pipe(config: PipeConfig) -> (PipeWriter, PipeReader) {
    let (tx, rx) = async_channel::bounded(config.capacity.max(1));
    let shared = Arc::new(Shared::default());

    let writer = PipeWriter {
        tx,
        chunk_size: config.chunk_size.max(1),
        shared: shared.clone(),
    };
    let reader = PipeReader {
        rx: Box::pin(rx),
        pending: Vec::new(),
        pos: 0,
        shared,
        failure_reported: false,
    };

    (writer, reader)
}

/// Producer end of a pipe
#[derive(Debug)]
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
    chunk_size: usize,
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Write all of `data`, waiting while the buffer is full
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(self.chunk_size) {
            self.tx.send(chunk.to_vec()).await.map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "read end of pipe is closed")
            })?;
        }
        Ok(())
    }

    /// Whether the reader has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the pipe normally
    pub fn close(self) {}

    /// Close the pipe abnormally; the reader sees `reason` as an error
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.shared.failure.set(reason.into());
    }
}

/// Consumer end of a pipe
///
/// Implements [`AsyncRead`], so the usual `futures::io::AsyncReadExt` helpers
/// (`read`, `read_to_end`, `read_to_string`) are available.
#[derive(Debug)]
pub struct PipeReader {
    rx: Pin<Box<Receiver<Vec<u8>>>>,
    pending: Vec<u8>,
    pos: usize,
    shared: Arc<Shared>,
    failure_reported: bool,
}

impl PipeReader {
    /// Whether the writer has closed and every buffered byte was consumed
    pub fn is_finished(&self) -> bool {
        self.pos >= self.pending.len() && self.rx.is_closed() && self.rx.is_empty()
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        loop {
            if this.pos < this.pending.len() {
                let available = &this.pending[this.pos..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                this.pos += n;
                return Poll::Ready(Ok(n));
            }

            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }

            match this.rx.as_mut().poll_next(cx) {
                Poll::Ready(Some(chunk)) => {
                    this.pending = chunk;
                    this.pos = 0;
                }
                Poll::Ready(None) => {
                    if !this.failure_reported {
                        if let Some(reason) = this.shared.failure.get() {
                            this.failure_reported = true;
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                reason.clone(),
                            )));
                        }
                    }
                    return Poll::Ready(Ok(0));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::AsyncReadExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[smol_potat::test]
    async fn test_bytes_arrive_in_order() {
        let (mut writer, mut reader) = pipe(PipeConfig::default());

        writer.write_all(b"first ").await.unwrap();
        writer.write_all(b"second").await.unwrap();
        writer.close();

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "first second");
        assert!(reader.is_finished());
    }

    #[smol_potat::test]
    async fn test_writer_is_suspended_when_buffer_full() {
        let config = PipeConfig {
            capacity: 1,
            chunk_size: 2,
        };
        let (mut writer, mut reader) = pipe(config);
        let done = Arc::new(AtomicBool::new(false));

        let done_flag = done.clone();
        let task = smol::spawn(async move {
            writer.write_all(b"abcdef").await.unwrap();
            done_flag.store(true, Ordering::SeqCst);
        });

        smol::Timer::after(Duration::from_millis(50)).await;
        assert!(!done.load(Ordering::SeqCst), "writer should be blocked");

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        task.await;

        assert_eq!(out, b"abcdef");
        assert!(done.load(Ordering::SeqCst));
    }

    #[smol_potat::test]
    async fn test_write_after_reader_dropped_is_broken_pipe() {
        let (mut writer, reader) = pipe(PipeConfig::default());
        drop(reader);

        assert!(writer.is_closed());
        let err = writer.write_all(b"lost").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[smol_potat::test]
    async fn test_read_after_close_is_eof() {
        let (writer, mut reader) = pipe(PipeConfig::default());
        writer.close();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[smol_potat::test]
    async fn test_failure_reported_once_after_buffered_data() {
        let (mut writer, mut reader) = pipe(PipeConfig::default());
        writer.write_all(b"partial").await.unwrap();
        writer.fail("connection reset");

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"partial");

        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(err.to_string(), "connection reset");

        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_max_buffered() {
        let config = PipeConfig {
            capacity: 4,
            chunk_size: 512,
        };
        assert_eq!(config.max_buffered(), 2048);
    }
}
