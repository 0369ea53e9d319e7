//! Client configuration: defaults, overlaid by an optional TOML file,
//! overlaid by command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::audio::{
    AudioBridge, FileAudioBridge, NullAudioBridge, DEFAULT_CHUNK_BYTES, DEFAULT_CHUNK_INTERVAL,
};
use crate::cli::Args;
use crate::error::{ClientError, Result};
use crate::reconnect::DEFAULT_RECONNECT_DELAY;

pub const DEFAULT_SERVER: &str = "http://localhost:8000";
pub const DEFAULT_LOG_FILTER: &str = "live_chat_client=info";

/// Resolved settings for one run of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: String,
    pub audio: bool,
    pub reconnect_delay_ms: u64,
    pub pcm_in: Option<PathBuf>,
    pub pcm_out: Option<PathBuf>,
    pub chunk_bytes: usize,
    pub chunk_interval_ms: u64,
    pub log_filter: String,
    pub plain: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            audio: false,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            pcm_in: None,
            pcm_out: None,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL.as_millis() as u64,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            plain: false,
        }
    }
}

/// The TOML file shape. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub audio: Option<bool>,
    pub reconnect_delay_ms: Option<u64>,
    pub pcm_in: Option<PathBuf>,
    pub pcm_out: Option<PathBuf>,
    pub chunk_bytes: Option<usize>,
    pub chunk_interval_ms: Option<u64>,
    pub log_filter: Option<String>,
    pub plain: Option<bool>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }
}

impl ClientConfig {
    /// Resolve the configuration for `args`, reading `args.config` if set.
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, args)
    }

    /// Flags win over the file, the file wins over defaults.
    pub fn merge(file: FileConfig, args: &Args) -> Result<Self> {
        let d = ClientConfig::default();
        let config = ClientConfig {
            server: args.server.clone().or(file.server).unwrap_or(d.server),
            audio: args.audio || file.audio.unwrap_or(d.audio),
            reconnect_delay_ms: args
                .reconnect_delay_ms
                .or(file.reconnect_delay_ms)
                .unwrap_or(d.reconnect_delay_ms),
            pcm_in: args.pcm_in.clone().or(file.pcm_in),
            pcm_out: args.pcm_out.clone().or(file.pcm_out),
            chunk_bytes: args.chunk_bytes.or(file.chunk_bytes).unwrap_or(d.chunk_bytes),
            chunk_interval_ms: args
                .chunk_interval_ms
                .or(file.chunk_interval_ms)
                .unwrap_or(d.chunk_interval_ms),
            log_filter: args
                .log_filter
                .clone()
                .or(file.log_filter)
                .unwrap_or(d.log_filter),
            plain: args.plain || file.plain.unwrap_or(d.plain),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 {
            return Err(ClientError::Config("chunk_bytes must be greater than zero".into()));
        }
        if self.chunk_interval_ms == 0 {
            return Err(ClientError::Config(
                "chunk_interval_ms must be greater than zero".into(),
            ));
        }
        // Surfaces a bad scheme or missing host before the first connect.
        crate::connection::endpoint_url(&self.server, "probe", false)?;
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// The audio bridge for `/audio`: file-backed when a PCM file is
    /// configured, otherwise one that always fails setup.
    pub fn audio_bridge(&self) -> Box<dyn AudioBridge> {
        if self.pcm_in.is_none() && self.pcm_out.is_none() {
            return Box::new(NullAudioBridge);
        }
        let mut bridge = FileAudioBridge::new(self.pcm_in.clone(), self.pcm_out.clone());
        bridge.chunk_bytes = self.chunk_bytes;
        bridge.chunk_interval = Duration::from_millis(self.chunk_interval_ms);
        Box::new(bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["live-chat"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_defaults() {
        let c = ClientConfig::from_args(&args(&[])).unwrap();
        assert_eq!(c, ClientConfig::default());
        assert_eq!(c.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(c.server, "http://localhost:8000");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = FileConfig::parse(
            r#"
            server = "https://agent.example.com"
            reconnect_delay_ms = 1500
            pcm_out = "speaker.pcm"
            "#,
        )
        .unwrap();
        let c = ClientConfig::merge(file, &args(&[])).unwrap();
        assert_eq!(c.server, "https://agent.example.com");
        assert_eq!(c.reconnect_delay_ms, 1500);
        assert_eq!(c.pcm_out, Some(PathBuf::from("speaker.pcm")));
        assert_eq!(c.chunk_bytes, DEFAULT_CHUNK_BYTES);
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig::parse(r#"server = "http://from-file""#).unwrap();
        let c = ClientConfig::merge(file, &args(&["--server", "http://from-flag"])).unwrap();
        assert_eq!(c.server, "http://from-flag");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            FileConfig::parse("sever = \"typo\""),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let err = ClientConfig::merge(FileConfig::default(), &args(&["--chunk-bytes", "0"]));
        assert!(matches!(err, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_bad_server_rejected() {
        let err = ClientConfig::merge(FileConfig::default(), &args(&["--server", "localhost"]));
        assert!(matches!(err, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "audio = true\nplain = true").unwrap();
        let path = f.path().to_str().unwrap().to_string();
        let c = ClientConfig::from_args(&args(&["--config", &path])).unwrap();
        assert!(c.audio);
        assert!(c.plain);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ClientConfig::from_args(&args(&["--config", "/nonexistent/chat.toml"]));
        assert!(matches!(err, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_audio_bridge_without_files_fails_setup() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut bridge = ClientConfig::default().audio_bridge();
        let err = bridge.start(tx).err().unwrap();
        assert_eq!(err.to_string(), "no audio devices configured");
    }

    #[test]
    fn test_audio_bridge_plays_into_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("speaker.pcm");
        let c = ClientConfig {
            pcm_out: Some(out.clone()),
            ..ClientConfig::default()
        };
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = c.audio_bridge().start(tx).unwrap();
        sink.resume().unwrap();
        sink.play(&[9, 8, 7]).unwrap();
        drop(sink);
        assert_eq!(std::fs::read(&out).unwrap(), vec![9, 8, 7]);
    }
}
