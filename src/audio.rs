//! Audio bridge: the playback/record pipeline behind two small traits.
//!
//! The client never encodes or decodes audio itself. It hands raw PCM bytes to
//! a [`PlaybackSink`] and receives raw PCM chunks from the recorder as
//! [`SessionEvent::Microphone`] events. The bundled [`FileAudioBridge`] plays
//! into a raw PCM file and records from one, which is enough to drive a voice
//! session from pre-recorded audio.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;

use crate::error::{ClientError, Result};
use crate::session::{EventSender, SessionEvent};

/// 100 ms of 16 kHz 16-bit mono PCM.
pub const DEFAULT_CHUNK_BYTES: usize = 3200;
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Consumes agent audio.
pub trait PlaybackSink: Send {
    /// Playback starts suspended until explicitly resumed.
    fn is_suspended(&self) -> bool;
    fn resume(&mut self) -> Result<()>;
    fn play(&mut self, pcm: &[u8]) -> Result<()>;
}

/// Sets up playback and recording on demand.
pub trait AudioBridge: Send {
    /// Start both pipelines. Recorded chunks are posted to `mic`.
    fn start(&mut self, mic: EventSender) -> Result<Box<dyn PlaybackSink>>;
}

// ---------------------------------------------------------------------------
// Null bridge
// ---------------------------------------------------------------------------

/// A bridge with no devices. Starting it always fails, so the session stays in
/// text mode and the user can retry after fixing their setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioBridge;

impl AudioBridge for NullAudioBridge {
    fn start(&mut self, _mic: EventSender) -> Result<Box<dyn PlaybackSink>> {
        Err(ClientError::Audio("no audio devices configured".to_string()))
    }
}

/// Playback that discards everything.
#[derive(Debug)]
pub struct DiscardPlayback {
    suspended: bool,
}

impl DiscardPlayback {
    pub fn new() -> Self {
        Self { suspended: true }
    }
}

impl Default for DiscardPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for DiscardPlayback {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        Ok(())
    }

    fn play(&mut self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File bridge
// ---------------------------------------------------------------------------

/// Raw PCM file playback.
pub struct FilePlayback {
    out: BufWriter<File>,
    suspended: bool,
    bytes_written: u64,
}

impl FilePlayback {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            ClientError::Audio(format!("cannot open playback file {}: {e}", path.display()))
        })?;
        Ok(Self {
            out: BufWriter::new(file),
            suspended: true,
            bytes_written: 0,
        })
    }

}

impl Drop for FilePlayback {
    fn drop(&mut self) {
        let _ = self.out.flush();
        tracing::debug!(bytes = self.bytes_written, "playback file closed");
    }
}

impl PlaybackSink for FilePlayback {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        Ok(())
    }

    fn play(&mut self, pcm: &[u8]) -> Result<()> {
        self.out.write_all(pcm)?;
        self.out.flush()?;
        self.bytes_written += pcm.len() as u64;
        Ok(())
    }
}

/// Plays agent audio into `pcm_out` and records from `pcm_in`, one chunk per
/// interval. Either side may be absent, but not both.
#[derive(Debug, Clone)]
pub struct FileAudioBridge {
    pub pcm_in: Option<PathBuf>,
    pub pcm_out: Option<PathBuf>,
    pub chunk_bytes: usize,
    pub chunk_interval: Duration,
}

impl FileAudioBridge {
    pub fn new(pcm_in: Option<PathBuf>, pcm_out: Option<PathBuf>) -> Self {
        Self {
            pcm_in,
            pcm_out,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
        }
    }
}

impl AudioBridge for FileAudioBridge {
    fn start(&mut self, mic: EventSender) -> Result<Box<dyn PlaybackSink>> {
        if self.pcm_in.is_none() && self.pcm_out.is_none() {
            return Err(ClientError::Audio(
                "no audio devices configured (pass --pcm-in and/or --pcm-out)".to_string(),
            ));
        }
        if self.chunk_bytes == 0 {
            return Err(ClientError::Audio("chunk size must be non-zero".to_string()));
        }

        // Open both ends before spawning anything so a failure leaves no
        // recorder running.
        let recorder = match &self.pcm_in {
            Some(path) => Some(File::open(path).map_err(|e| {
                ClientError::Audio(format!("cannot open recording file {}: {e}", path.display()))
            })?),
            None => None,
        };
        let playback: Box<dyn PlaybackSink> = match &self.pcm_out {
            Some(path) => Box::new(FilePlayback::create(path)?),
            None => Box::new(DiscardPlayback::new()),
        };

        if let Some(file) = recorder {
            tokio::spawn(record_file(
                tokio::fs::File::from_std(file),
                self.chunk_bytes,
                self.chunk_interval,
                mic,
            ));
        }
        Ok(playback)
    }
}

async fn record_file(
    mut file: tokio::fs::File,
    chunk_bytes: usize,
    interval: Duration,
    mic: EventSender,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut buf = vec![0u8; chunk_bytes];
    let mut total: u64 = 0;
    loop {
        ticker.tick().await;
        let n = match read_chunk(&mut file, &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "recording read failed");
                break;
            }
        };
        if n == 0 {
            break;
        }
        total += n as u64;
        if mic.send(SessionEvent::Microphone(buf[..n].to_vec())).is_err() {
            break;
        }
    }
    tracing::info!(bytes = total, "recording finished");
}

/// Fill `buf` as far as possible; short only at end of file.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
