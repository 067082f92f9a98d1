use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::args::IngestArgs;

const CONFIG_ENV: &str = "MSGTRACK_CONFIG_PATH";
const CONFIG_STEM: &str = "msgtrack";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Year applied to syslog dates. Defaults to the local year at startup.
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(
        default = "default_stats_interval",
        deserialize_with = "msgtrack_helpers::de::deserialize_optional_duration"
    )]
    pub stats_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    File,
    Udp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Log file for `kind: file`; stdin when absent or `-`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_listen_udp")]
    pub listen_udp: SocketAddr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Json,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,
    /// JSON lines file for `kind: json`; stdout when absent or `-`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub include_unknown: bool,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { kind: SourceKind::File, path: None, listen_udp: default_listen_udp() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::Json,
            path: None,
            include_unknown: false,
            database_url: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            year: None,
            queue_capacity: default_queue_capacity(),
            stats_interval: default_stats_interval(),
        }
    }
}

impl IngestConfig {
    /// Resolves the config file from the command line, `MSGTRACK_CONFIG_PATH`,
    /// `$HOME` or the working directory. Without any file the defaults apply:
    /// read stdin, write JSON lines to stdout.
    pub fn load() -> Result<Self> {
        let args = IngestArgs::parse(env::args().skip(1))?;

        let mut config = match args.config_path.or_else(resolve_config_path) {
            Some(path) => load_config_yaml(&path)?,
            None => {
                info!(
                    "no config file found, using defaults: searched={CONFIG_ENV}, {CONFIG_STEM}.yaml, {CONFIG_STEM}.yml"
                );
                Self::default()
            }
        };

        if args.year.is_some() {
            config.year = args.year;
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.source.path = normalize_path(self.source.path.take());
        self.output.path = normalize_path(self.output.path.take());
        self.output.database_url = normalize_opt(self.output.database_url.take());
        self.queue_capacity = self.queue_capacity.max(1);
    }

    fn validate(&self) -> Result<()> {
        if let Some(year) = self.year {
            if !(1..=9999).contains(&year) {
                bail!("ingest config `year` out of range: {year}");
            }
        }

        if self.output.kind == OutputKind::Database
            && self.output.database_url.is_none()
        {
            bail!("ingest config output kind is database but `output.database_url` is missing");
        }

        Ok(())
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        match (self.kind, &self.path) {
            (SourceKind::File, Some(path)) => write!(f, "file:{}", path.display()),
            (SourceKind::File, None) => f.write_str("stdin"),
            (SourceKind::Udp, _) => write!(f, "udp:{}", self.listen_udp),
        }
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        match (self.kind, &self.path) {
            (OutputKind::Json, Some(path)) => write!(f, "json:{}", path.display()),
            (OutputKind::Json, None) => f.write_str("json:stdout"),
            (OutputKind::Database, _) => f.write_str("database"),
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let mut dirs = Vec::with_capacity(2);
    if let Some(home) = non_empty_env("HOME") {
        dirs.push(PathBuf::from(home));
    }
    dirs.push(env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    dirs.iter()
        .flat_map(|dir| {
            ["yaml", "yml"].map(|ext| dir.join(format!("{CONFIG_STEM}.{ext}")))
        })
        .find(|candidate| candidate.exists())
}

fn load_config_yaml(path: &Path) -> Result<IngestConfig> {
    let raw = std::fs::read(path).with_context(|| {
        format!("failed to read config file {}", path.display())
    })?;
    parse_config_yaml(&raw).with_context(|| {
        format!("failed to parse YAML config {}", path.display())
    })
}

fn parse_config_yaml(raw: &[u8]) -> Result<IngestConfig> {
    // An empty file means "all defaults".
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(IngestConfig::default());
    }
    Ok(serde_yaml::from_slice(raw)?)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| normalize_opt(Some(value)))
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

fn normalize_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|path| {
        !path.as_os_str().is_empty() && path.as_os_str() != "-"
    })
}

fn default_listen_udp() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5140)
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_stats_interval() -> Option<Duration> {
    Some(Duration::from_secs(60))
}
