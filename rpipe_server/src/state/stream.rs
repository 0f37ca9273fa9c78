use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rpipe_wire::{Version, DEFAULT_TTL_SECS, PIPE_MAX_BYTES};
use std::collections::VecDeque;

const STREAM_ID_LEN: usize = 32;

fn new_stream_id() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), STREAM_ID_LEN)
}

/// The per-channel pipe: an ordered queue of opaque byte blocks plus the
/// identity and lifecycle flags of the upload that created it.
///
/// `id`, `version` and `encrypted` are fixed at creation. Expiry is never
/// stored; it is derived from the last mutation time and the current ttl,
/// so it cannot go stale.
#[derive(Clone, Debug)]
pub struct Stream {
    id: String,
    version: Version,
    encrypted: bool,
    data: VecDeque<Bytes>,
    queued: usize,
    pub upload_complete: bool,
    /// True until a consuming reader takes its first block.
    pub new: bool,
    /// Admin-set; a locked stream neither expires nor may be deleted.
    pub locked: bool,
    ttl: u32,
    last_touched: DateTime<Utc>,
    capacity: usize,
}

impl Stream {
    pub fn open(
        version: Version,
        encrypted: bool,
        upload_complete: bool,
        ttl: Option<u32>,
        first: Bytes,
    ) -> Self {
        let mut data = VecDeque::new();
        let mut queued = 0;
        if !first.is_empty() {
            queued = first.len();
            data.push_back(first);
        }
        Self {
            id: new_stream_id(),
            version,
            encrypted,
            data,
            queued,
            upload_complete,
            new: true,
            locked: false,
            ttl: ttl.unwrap_or(DEFAULT_TTL_SECS),
            last_touched: Utc::now(),
            capacity: PIPE_MAX_BYTES,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn blocks(&self) -> usize {
        self.data.len()
    }

    pub fn full(&self) -> bool {
        self.queued >= self.capacity
    }

    /// True when appending `extra` bytes would overshoot the pipe bound.
    pub fn would_overflow(&self, extra: usize) -> bool {
        self.queued + extra > self.capacity
    }

    pub(crate) fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }

    pub fn expire(&self) -> DateTime<Utc> {
        self.last_touched + Duration::seconds(i64::from(self.ttl))
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        !self.locked && self.expire() < now
    }

    pub fn touch(&mut self) {
        self.last_touched = Utc::now();
    }

    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    pub fn push(&mut self, block: Bytes) {
        self.queued += block.len();
        self.data.push_back(block);
        self.touch();
    }

    /// Pop the head block, then greedily fold in further head blocks while
    /// the combined size stays within `soft_limit`.
    pub fn pop_coalesced(&mut self, soft_limit: usize) -> Bytes {
        let Some(head) = self.data.pop_front() else {
            return Bytes::new();
        };
        self.queued -= head.len();
        if self
            .data
            .front()
            .map(|next| head.len() + next.len() > soft_limit)
            .unwrap_or(true)
        {
            self.touch();
            return head;
        }
        let mut out = Vec::from(head);
        loop {
            match self.data.front() {
                Some(next) if out.len() + next.len() <= soft_limit => {
                    let next = self.data.pop_front().unwrap_or_default();
                    self.queued -= next.len();
                    out.extend_from_slice(&next);
                }
                _ => break,
            }
        }
        self.touch();
        Bytes::from(out)
    }

    /// Drain the whole queue into one block without consuming the stream's
    /// read state; used by peek and whole-pipe web reads.
    pub fn concat(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.queued);
        for block in &self.data {
            out.extend_from_slice(block);
        }
        Bytes::from(out)
    }

    pub(crate) fn into_blocks(self) -> Vec<Bytes> {
        self.data.into_iter().collect()
    }

    #[cfg(test)]
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub(crate) fn from_parts(meta: super::persist::StreamMeta, blocks: Vec<Bytes>) -> Self {
        let queued = blocks.iter().map(Bytes::len).sum();
        Self {
            id: meta.id,
            version: meta.version,
            encrypted: meta.encrypted,
            data: blocks.into(),
            queued,
            upload_complete: meta.upload_complete,
            new: meta.new,
            locked: meta.locked,
            ttl: meta.ttl,
            last_touched: meta.last_touched,
            capacity: PIPE_MAX_BYTES,
        }
    }
}
