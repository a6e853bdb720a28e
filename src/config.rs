//! Process configuration: CLI flags with an optional TOML file override,
//! in the shape of the two-path `Opts`/`Config` split this crate was
//! bootstrapped from — CLI wins over the file's defaults, and the file
//! wins over the hardcoded defaults below (spec §6).

use std::fs::read_to_string;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_HEARTBIT_INTERVAL: u64 = 5;
const DEFAULT_DOCUMENT_LIMIT: usize = 100_000;
const DEFAULT_LOG_BYTES_THRESHOLD: usize = 256 * 1024;
const DEFAULT_ROOM_IDLE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_ROOM_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_PERSIST_DIR: &str = "./data";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(version, author, about = "Real-time collaborative plain-text editor server")]
struct Opts {
    /// TOML config file. CLI flags below override whatever it sets.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    listen_address: Option<String>,

    #[arg(long)]
    persist_dir: Option<PathBuf>,

    #[arg(long)]
    heartbit_interval: Option<u64>,

    #[arg(long)]
    document_limit: Option<usize>,

    #[arg(long)]
    log_bytes_threshold: Option<usize>,

    #[arg(long)]
    room_idle_ttl_secs: Option<u64>,

    #[arg(long)]
    room_max_age_secs: Option<u64>,

    /// Greeting injected into a room's presence at creation, shown before
    /// eviction too (spec §4.4).
    #[arg(long)]
    greeting: Option<String>,
}

/// Raw shape of an on-disk TOML config file; every field is optional so a
/// partial file only overrides what it names.
#[derive(Deserialize, Default)]
struct FileConfig {
    listen_address: Option<String>,
    persist_dir: Option<PathBuf>,
    heartbit_interval: Option<u64>,
    document_limit: Option<usize>,
    log_bytes_threshold: Option<usize>,
    room_idle_ttl_secs: Option<u64>,
    room_max_age_secs: Option<u64>,
    greeting: Option<String>,
}

/// Fully-resolved settings: every knob enumerated in spec §6.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_address: String,
    pub persist_dir: PathBuf,
    pub heartbit_interval_secs: u64,
    pub document_limit: usize,
    pub log_bytes_threshold: usize,
    pub room_idle_ttl_secs: u64,
    pub room_max_age_secs: u64,
    pub greeting: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            heartbit_interval_secs: DEFAULT_HEARTBIT_INTERVAL,
            document_limit: DEFAULT_DOCUMENT_LIMIT,
            log_bytes_threshold: DEFAULT_LOG_BYTES_THRESHOLD,
            room_idle_ttl_secs: DEFAULT_ROOM_IDLE_TTL_SECS,
            room_max_age_secs: DEFAULT_ROOM_MAX_AGE_SECS,
            greeting: None,
        }
    }
}

impl Settings {
    /// Parses CLI args, layering an optional `--config` TOML file beneath
    /// them, and hardcoded defaults beneath that.
    pub fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        let opts = Opts::parse();
        let file = match &opts.config {
            Some(path) => Self::parse_file(path)?,
            None => FileConfig::default(),
        };

        let defaults = Settings::default();
        Ok(Settings {
            listen_address: opts
                .listen_address
                .or(file.listen_address)
                .unwrap_or(defaults.listen_address),
            persist_dir: opts
                .persist_dir
                .or(file.persist_dir)
                .unwrap_or(defaults.persist_dir),
            heartbit_interval_secs: opts
                .heartbit_interval
                .or(file.heartbit_interval)
                .unwrap_or(defaults.heartbit_interval_secs),
            document_limit: opts
                .document_limit
                .or(file.document_limit)
                .unwrap_or(defaults.document_limit),
            log_bytes_threshold: opts
                .log_bytes_threshold
                .or(file.log_bytes_threshold)
                .unwrap_or(defaults.log_bytes_threshold),
            room_idle_ttl_secs: opts
                .room_idle_ttl_secs
                .or(file.room_idle_ttl_secs)
                .unwrap_or(defaults.room_idle_ttl_secs),
            room_max_age_secs: opts
                .room_max_age_secs
                .or(file.room_max_age_secs)
                .unwrap_or(defaults.room_max_age_secs),
            greeting: opts.greeting.or(file.greeting),
        })
    }

    fn parse_file(path: &PathBuf) -> Result<FileConfig, Box<dyn std::error::Error>> {
        let contents = read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_examples() {
        let settings = Settings::default();
        assert_eq!(settings.heartbit_interval_secs, 5);
        assert_eq!(settings.document_limit, 100_000);
        assert_eq!(settings.room_idle_ttl_secs, 60 * 60);
        assert_eq!(settings.room_max_age_secs, 7 * 24 * 60 * 60);
    }
}
