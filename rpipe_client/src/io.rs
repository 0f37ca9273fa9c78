use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A prefetching reader over a byte source.
///
/// A worker thread pulls from the source in `chunk`-sized requests and
/// parks once `chunk` bytes are queued; the single consumer drains through
/// [`Prefetcher::read`]. The chunk target can be raised mid-stream (the
/// server advertises its block size only after the first request) but
/// never lowered.
#[derive(Clone)]
pub struct Prefetcher {
    shared: Arc<Shared>,
}

struct Shared {
    buffer: Mutex<Buffer>,
    cond: Condvar,
}

struct Buffer {
    blocks: VecDeque<Bytes>,
    queued: usize,
    chunk: usize,
    eof: bool,
}

impl Prefetcher {
    /// Spawn the worker thread over `source`.
    pub fn spawn(mut source: impl Read + Send + 'static, chunk: usize) -> Self {
        let this = Self::with_buffer(Buffer {
            blocks: VecDeque::new(),
            queued: 0,
            chunk,
            eof: false,
        });
        let shared = this.shared.clone();
        std::thread::spawn(move || {
            crate::debug!("Prefetch thread starting with chunk size {chunk}");
            loop {
                let want = shared.guard().chunk;
                let mut buf = vec![0u8; want];
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.truncate(n);
                        let mut buffer = shared.guard();
                        while buffer.queued >= buffer.chunk {
                            buffer = shared
                                .cond
                                .wait(buffer)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                        buffer.queued += n;
                        buffer.blocks.push_back(Bytes::from(buf));
                        shared.cond.notify_all();
                        crate::trace!("Prefetched {n} bytes");
                    }
                    Err(e) => {
                        crate::error!("Prefetch read failed: {e}");
                        break;
                    }
                }
            }
            shared.guard().eof = true;
            shared.cond.notify_all();
            crate::debug!("Prefetch thread done");
        });
        this
    }

    /// An in-memory source; no worker thread involved.
    pub fn preloaded(data: Vec<u8>, chunk: usize) -> Self {
        let queued = data.len();
        let mut blocks = VecDeque::new();
        if queued > 0 {
            blocks.push_back(Bytes::from(data));
        }
        Self::with_buffer(Buffer {
            blocks,
            queued,
            chunk,
            eof: true,
        })
    }

    fn with_buffer(buffer: Buffer) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(buffer),
                cond: Condvar::new(),
            }),
        }
    }

    /// Block until data or end of input; returns up to `chunk` bytes and
    /// whether the source is exhausted. `(empty, true)` is the final read.
    pub fn read(&self) -> (Bytes, bool) {
        let mut buffer = self.shared.guard();
        while buffer.blocks.is_empty() && !buffer.eof {
            buffer = self
                .shared
                .cond
                .wait(buffer)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let out = buffer.take_chunk();
        let eof = buffer.eof && buffer.blocks.is_empty();
        drop(buffer);
        self.shared.cond.notify_all();
        (out, eof)
    }

    /// Raise the prefetch target; lowering is ignored.
    pub fn increase_chunk(&self, chunk: usize) {
        let mut buffer = self.shared.guard();
        if chunk > buffer.chunk {
            crate::debug!("Raising chunk size to {chunk}");
            buffer.chunk = chunk;
            drop(buffer);
            self.shared.cond.notify_all();
        }
    }
}

impl Shared {
    fn guard(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Buffer {
    /// Stitch queued blocks together, up to the chunk target. A single
    /// oversized block is split so the cap holds.
    fn take_chunk(&mut self) -> Bytes {
        let Some(mut head) = self.blocks.pop_front() else {
            return Bytes::new();
        };
        if head.len() > self.chunk {
            let rest = head.split_off(self.chunk);
            self.blocks.push_front(rest);
            self.queued -= head.len();
            return head;
        }
        self.queued -= head.len();
        if self
            .blocks
            .front()
            .map(|next| head.len() + next.len() > self.chunk)
            .unwrap_or(true)
        {
            return head;
        }
        let mut out = Vec::from(head);
        loop {
            match self.blocks.front() {
                Some(next) if out.len() + next.len() <= self.chunk => {
                    let next = self.blocks.pop_front().unwrap_or_default();
                    self.queued -= next.len();
                    out.extend_from_slice(&next);
                }
                _ => break,
            }
        }
        Bytes::from(out)
    }
}

/// A reader that feeds a running checksum as bytes pass through.
pub struct TapReader<R> {
    inner: R,
    digest: Arc<Mutex<Sha256>>,
}

impl<R: Read> TapReader<R> {
    pub fn new(inner: R) -> (Self, Arc<Mutex<Sha256>>) {
        let digest = Arc::new(Mutex::new(Sha256::new()));
        (
            Self {
                inner,
                digest: digest.clone(),
            },
            digest,
        )
    }
}

impl<R: Read> Read for TapReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&buf[..n]);
        Ok(n)
    }
}

/// A writer that feeds a running checksum as bytes pass through.
pub struct TapWriter<W> {
    inner: W,
    digest: Arc<Mutex<Sha256>>,
}

impl<W: std::io::Write> TapWriter<W> {
    pub fn new(inner: W) -> (Self, Arc<Mutex<Sha256>>) {
        let digest = Arc::new(Mutex::new(Sha256::new()));
        (
            Self {
                inner,
                digest: digest.clone(),
            },
            digest,
        )
    }
}

impl<W: std::io::Write> std::io::Write for TapWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Render a finished checksum the way the CLI prints it.
pub fn hex_digest(digest: &Arc<Mutex<Sha256>>) -> String {
    let digest = digest
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
