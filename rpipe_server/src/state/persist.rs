use super::stream::Stream;
use super::UnlockedState;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rpipe_wire::Version;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Saved states written by anything older than this are discarded stream
/// by stream on load.
const MIN_SAVE_STATE_VERSION: &str = "7.3.0";

/// Per-stream header record in the save file; the queued blocks follow it
/// raw and are deliberately not part of the JSON.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StreamMeta {
    pub id: String,
    pub version: Version,
    pub encrypted: bool,
    pub upload_complete: bool,
    pub new: bool,
    pub locked: bool,
    pub ttl: u32,
    pub last_touched: DateTime<Utc>,
}

impl StreamMeta {
    fn of(stream: &Stream) -> Self {
        Self {
            id: stream.id().to_owned(),
            version: stream.version().clone(),
            encrypted: stream.encrypted(),
            upload_complete: stream.upload_complete,
            new: stream.new,
            locked: stream.locked,
            ttl: stream.ttl(),
            last_touched: stream.last_touched(),
        }
    }
}

/// Save the whole stream map.
///
/// Line-oriented: a version line, a stream-count line, then per stream a
/// `<channel> <nblocks> <json>` header followed by each block as a decimal
/// length line plus the raw bytes. Only valid once the shutdown flag is up,
/// which guarantees no concurrent mutation.
pub(super) fn save(state: &UnlockedState, file: &Path) -> crate::Result<()> {
    if !state.shutdown {
        crate::bail!("refusing to save state before shutdown");
    }
    crate::info!("Saving state to {}", file.display());
    let mut out = open_restricted(file)?;
    writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "{}", state.streams.len())?;
    for (channel, stream) in &state.streams {
        let meta = serde_json::to_string(&StreamMeta::of(stream))?;
        writeln!(out, "{channel} {} {meta}", stream.blocks())?;
        for block in stream.clone().into_blocks() {
            writeln!(out, "{}", block.len())?;
            out.write_all(&block)?;
        }
    }
    out.flush()?;
    crate::info!("State saved: {} channel(s)", state.streams.len());
    Ok(())
}

/// Load a previously saved state. Missing files and too-old files leave
/// the state empty; loading over live streams is refused.
pub(super) fn load(state: &mut UnlockedState, file: &Path) -> crate::Result<()> {
    if !state.streams.is_empty() {
        crate::bail!("refusing to load a state on top of an existing state");
    }
    if !file.exists() {
        crate::warn!("State file {} not found; state is empty", file.display());
        return Ok(());
    }
    crate::info!("Loading state from {}", file.display());
    let raw = fs::read(file)?;
    let mut cur = Cursor::new(&raw);

    let version = Version::parse(cur.line()?);
    if version < Version::parse(MIN_SAVE_STATE_VERSION) {
        crate::error!("Saved state version too old: {version}; state is empty");
        return Ok(());
    }
    let count: usize = cur.line()?.parse()?;
    let min = Version::parse(MIN_SAVE_STATE_VERSION);
    for _ in 0..count {
        let header = cur.line()?;
        let mut fields = header.splitn(3, ' ');
        let (channel, nblocks, meta) = match (fields.next(), fields.next(), fields.next()) {
            (Some(c), Some(n), Some(m)) => (c.to_owned(), n.parse::<usize>()?, m),
            _ => crate::bail!("malformed stream header: {header:?}"),
        };
        let meta: StreamMeta = serde_json::from_str(meta)?;
        let mut blocks = Vec::with_capacity(nblocks);
        for _ in 0..nblocks {
            let len: usize = cur.line()?.parse()?;
            blocks.push(Bytes::copy_from_slice(cur.take(len)?));
        }
        if meta.version < min {
            crate::warn!("Discarding channel {channel}: stream version {} too old", meta.version);
            continue;
        }
        state.streams.insert(channel, Stream::from_parts(meta, blocks));
    }
    state.stats = Default::default();
    for channel in state.streams.keys() {
        state.stats.channels.entry(channel.clone()).or_default();
    }
    crate::info!("State loaded: {} channel(s)", state.streams.len());
    Ok(())
}

#[cfg(unix)]
fn open_restricted(file: &Path) -> crate::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(file)?)
}

#[cfg(not(unix))]
fn open_restricted(file: &Path) -> crate::Result<fs::File> {
    Ok(fs::File::create(file)?)
}

struct Cursor<'a> {
    raw: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Self { raw, at: 0 }
    }

    fn line(&mut self) -> crate::Result<&'a str> {
        let rest = &self.raw[self.at..];
        let end = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| crate::anyhow!("truncated state file"))?;
        self.at += end + 1;
        Ok(std::str::from_utf8(&rest[..end])?)
    }

    fn take(&mut self, n: usize) -> crate::Result<&'a [u8]> {
        if self.raw.len() - self.at < n {
            crate::bail!("truncated state file");
        }
        let out = &self.raw[self.at..self.at + n];
        self.at += n;
        Ok(out)
    }
}
