use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, DEFAULT_FRAME_SAMPLES, TARGET_SAMPLE_RATE};
use crate::language::Language;
use crate::session::SessionConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub session: SessionSettings,
    pub control: ControlConfig,
    pub dump: DumpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-drill".to_string(),
        }
    }
}

/// Speech server the sessions connect to
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_base_url: String,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000/ws".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; the system default when unset
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub channel_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: TARGET_SAMPLE_RATE,
            frame_samples: DEFAULT_FRAME_SAMPLES,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub language: Language,
}

/// HTTP control API
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub enabled: bool,
    pub output_dir: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: "audioprompts".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any extension the `config` crate knows, optional) and
    /// overlay `VOICE_DRILL__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_DRILL").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_base_url: self.server.ws_base_url.clone(),
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            language: self.session.language,
            dump_dir: self
                .dump
                .enabled
                .then(|| PathBuf::from(shellexpand::tilde(&self.dump.output_dir).as_ref())),
        }
    }

    pub fn audio_backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            frame_samples: self.audio.frame_samples,
            channel_capacity: self.audio.channel_capacity,
            device: self.audio.device.clone(),
        }
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.control.bind, self.control.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load("does/not/exist/voice-drill").unwrap();
        assert_eq!(cfg.server.ws_base_url, "ws://localhost:8000/ws");
        assert_eq!(cfg.audio.frame_samples, 4096);
        assert_eq!(cfg.session.language, Language::Cs);
        assert!(cfg.session_config().dump_dir.is_none());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
ws_base_url = "wss://drill.example.org/ws"
connect_timeout_secs = 3

[session]
language = "en"

[dump]
enabled = true
output_dir = "/tmp/dumps"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
        let session = cfg.session_config();

        assert_eq!(session.ws_base_url, "wss://drill.example.org/ws");
        assert_eq!(session.connect_timeout, Duration::from_secs(3));
        assert_eq!(session.language, Language::En);
        assert_eq!(session.dump_dir, Some(PathBuf::from("/tmp/dumps")));
        assert_eq!(cfg.audio_backend_config().frame_samples, 4096);
    }
}
