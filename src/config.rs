use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

/// Restreaming control plane.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct AppConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// turso database file.
    #[arg(long, env = "DB_PATH", default_value = "data/restreamer.db")]
    pub db_path: PathBuf,

    /// Directory holding the media files videos refer to.
    #[arg(long, env = "UPLOAD_DIR", default_value = "data/uploads")]
    pub upload_dir: PathBuf,

    /// Encoder binary, looked up on PATH when not absolute.
    #[arg(long, env = "ENCODER_BIN", default_value = "ffmpeg")]
    pub encoder_bin: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "STATS_INTERVAL_SECS", default_value_t = 5)]
    pub stats_interval_secs: u64,
}

impl AppConfig {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {}: {}", addr, e))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "warn" | "warning" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }
}
