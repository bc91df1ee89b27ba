//! Configuration management
//!
//! Loads the shared JSON project config, applies environment overrides for
//! the pause switch and resolves everything into a validated `RunConfig`.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TickerError;
use crate::ledger::DuplicatePolicy;
use crate::pause::PauseState;
use crate::stats::StatsOptions;

pub const ENV_TRADE_ACTIVE: &str = "WEBTICKER_TRADE_ACTIVE";
pub const ENV_PAUSE_MESSAGE: &str = "WEBTICKER_PAUSE_MESSAGE";

/// Largest accepted terminal clock offset, in minutes
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    /// `false` pauses the ticker
    #[serde(default = "default_true")]
    pub trade_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_pause_message: Option<String>,
    #[serde(default)]
    pub web_ticker: WebTickerConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        config.apply_env()?;
        Ok(config)
    }

    /// Pause switch overrides from the environment
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_TRADE_ACTIVE) {
            self.trade_active = parse_flag(&raw)
                .with_context(|| format!("{} must be a boolean, got {:?}", ENV_TRADE_ACTIVE, raw))?;
        }
        if let Ok(message) = std::env::var(ENV_PAUSE_MESSAGE) {
            self.trade_pause_message = Some(message);
        }
        Ok(())
    }

    fn resolve_path(&self, configured: &str, cli: Option<PathBuf>) -> PathBuf {
        match cli {
            Some(path) => path,
            None => {
                let path = PathBuf::from(configured);
                if path.is_absolute() {
                    path
                } else {
                    self.base_dir.join(path)
                }
            }
        }
    }

    /// Merge CLI overrides and validate.
    pub fn resolve(&self, overrides: RunOverrides) -> std::result::Result<RunConfig, TickerError> {
        let web = &self.web_ticker;

        if web.source_utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(TickerError::Config(format!(
                "source_utc_offset_minutes {} outside ±{}",
                web.source_utc_offset_minutes, MAX_OFFSET_MINUTES
            )));
        }
        let source_offset = FixedOffset::east_opt(web.source_utc_offset_minutes * 60)
            .ok_or_else(|| TickerError::Config("invalid source_utc_offset_minutes".to_string()))?;

        let run = RunConfig {
            state_log: self.resolve_path(&web.state_log, overrides.state_log),
            output: self.resolve_path(&web.output_json, overrides.output),
            html_output: self.resolve_path(&web.output_html, overrides.html_output),
            marker_output: self.resolve_path(&web.welldone_file, overrides.marker_output),
            ledger: self.resolve_path(&web.ledger_file, overrides.ledger),
            pretty: web.pretty || overrides.pretty,
            bot_name: self.project.name.clone(),
            pause: PauseState::from_flags(self.trade_active, self.trade_pause_message.clone()),
            source_offset,
            stats: StatsOptions {
                ranking_depth: web.ranking_depth,
                recent_trades: web.recent_trades,
                daily_days: web.daily_days,
            },
            duplicate_policy: web.duplicate_policy,
        };
        run.validate()?;
        Ok(run)
    }
}

/// Accepts the usual spellings of a boolean switch
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            name: "Sharrow".to_string(),
        }
    }
}

/// The `web_ticker` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebTickerConfig {
    pub state_log: String,
    pub output_json: String,
    pub output_html: String,
    pub welldone_file: String,
    pub ledger_file: String,
    pub pretty: bool,
    /// Offset of the terminal clock; naive timestamps are shifted by it
    pub source_utc_offset_minutes: i32,
    pub ranking_depth: usize,
    pub recent_trades: usize,
    pub daily_days: i64,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for WebTickerConfig {
    fn default() -> Self {
        WebTickerConfig {
            state_log: "state.log".to_string(),
            output_json: "webticker.json".to_string(),
            output_html: "webticker.html".to_string(),
            welldone_file: "webticker-welldone.txt".to_string(),
            ledger_file: "webticker-ledger.json".to_string(),
            pretty: false,
            source_utc_offset_minutes: 0,
            ranking_depth: 5,
            recent_trades: 10,
            daily_days: 7,
            duplicate_policy: DuplicatePolicy::KeepExisting,
        }
    }
}

/// Command-line path overrides for a run
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub state_log: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub html_output: Option<PathBuf>,
    pub marker_output: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub pretty: bool,
}

/// Fully resolved settings for one run cycle
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub state_log: PathBuf,
    pub output: PathBuf,
    pub html_output: PathBuf,
    pub marker_output: PathBuf,
    pub ledger: PathBuf,
    pub pretty: bool,
    pub bot_name: String,
    pub pause: PauseState,
    pub source_offset: FixedOffset,
    pub stats: StatsOptions,
    pub duplicate_policy: DuplicatePolicy,
}

impl RunConfig {
    pub fn validate(&self) -> std::result::Result<(), TickerError> {
        let outputs = [
            ("state_log", &self.state_log),
            ("output", &self.output),
            ("html_output", &self.html_output),
            ("marker_output", &self.marker_output),
            ("ledger", &self.ledger),
        ];

        for (name, path) in &outputs {
            if path.as_os_str().is_empty() {
                return Err(TickerError::Config(format!("{} path is empty", name)));
            }
        }
        for (i, (name_a, a)) in outputs.iter().enumerate() {
            for (name_b, b) in &outputs[i + 1..] {
                if a == b {
                    return Err(TickerError::Config(format!(
                        "{} and {} both point to {}",
                        name_a,
                        name_b,
                        a.display()
                    )));
                }
            }
        }

        if self.stats.ranking_depth == 0 {
            return Err(TickerError::Config("ranking_depth must be positive".to_string()));
        }
        if self.stats.recent_trades == 0 {
            return Err(TickerError::Config("recent_trades must be positive".to_string()));
        }
        if self.stats.daily_days <= 0 {
            return Err(TickerError::Config("daily_days must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"project": {"name": "Goldjunge"}}"#);

        let config = Config::from_file(&path).unwrap();
        let run = config.resolve(RunOverrides::default()).unwrap();

        assert_eq!(run.bot_name, "Goldjunge");
        assert_eq!(run.state_log, dir.path().join("state.log"));
        assert_eq!(run.ledger, dir.path().join("webticker-ledger.json"));
        assert_eq!(run.stats, StatsOptions::default());
        assert_eq!(run.duplicate_policy, DuplicatePolicy::KeepExisting);
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"web_ticker": {"output_json": "a.json"}}"#);
        let config = Config::from_file(&path).unwrap();

        let run = config
            .resolve(RunOverrides {
                output: Some(PathBuf::from("/tmp/elsewhere.json")),
                pretty: true,
                ..RunOverrides::default()
            })
            .unwrap();

        assert_eq!(run.output, PathBuf::from("/tmp/elsewhere.json"));
        assert!(run.pretty);
    }

    #[test]
    fn test_pause_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"trade_active": false, "trade_pause_message": "Holiday",
                "web_ticker": {"duplicate_policy": "abort", "source_utc_offset_minutes": 120}}"#,
        );
        let mut config = Config::from_file(&path).unwrap();
        // Environment may override; pin the file values for this check
        config.trade_active = false;
        config.trade_pause_message = Some("Holiday".to_string());

        let run = config.resolve(RunOverrides::default()).unwrap();
        assert!(run.pause.paused);
        assert_eq!(run.pause.message.as_deref(), Some("Holiday"));
        assert_eq!(run.duplicate_policy, DuplicatePolicy::Abort);
        assert_eq!(run.source_offset.local_minus_utc(), 7200);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();

        let same = write_config(
            dir.path(),
            r#"{"web_ticker": {"output_json": "x", "output_html": "x"}}"#,
        );
        let err = Config::from_file(&same).unwrap().resolve(RunOverrides::default());
        assert!(matches!(err, Err(TickerError::Config(_))));

        let depth = write_config(dir.path(), r#"{"web_ticker": {"ranking_depth": 0}}"#);
        let err = Config::from_file(&depth).unwrap().resolve(RunOverrides::default());
        assert!(matches!(err, Err(TickerError::Config(_))));

        let offset = write_config(
            dir.path(),
            r#"{"web_ticker": {"source_utc_offset_minutes": 900}}"#,
        );
        let err = Config::from_file(&offset).unwrap().resolve(RunOverrides::default());
        assert!(matches!(err, Err(TickerError::Config(_))));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::from_file("/definitely/not/here.json").is_err());
    }
}
