use clap::{CommandFactory, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{FunnelError, Result};
use crate::models::ActorKeyMode;

// ── MetricsConfig ──────────────────────────────────────────────────────────────

/// Knobs for the metric engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Share of purchasing actors, in percent, that forms the top partition of
    /// the revenue concentration check.
    pub top_percent: u8,
    /// Roll categories up to this many segments before grouping.
    pub category_depth: Option<usize>,
    /// Fan out timeline building, classification and metric families on rayon.
    pub parallel: bool,
}

impl MetricsConfig {
    /// Reject values the engine cannot use. The CLI enforces the same bounds,
    /// library callers may not.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.top_percent) {
            return Err(FunnelError::Config(format!(
                "top_percent must be within 1..=100, got {}",
                self.top_percent
            )));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            top_percent: 20,
            category_depth: None,
            parallel: true,
        }
    }
}

// ── OutputFormat ───────────────────────────────────────────────────────────────

/// How the report is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Funnel and revenue metrics over an e-commerce clickstream
#[derive(Parser, Debug, Clone)]
#[command(
    name = "funnel-metrics",
    about = "Funnel and revenue metrics over an e-commerce clickstream",
    version
)]
pub struct Settings {
    /// Event file or directory of .jsonl files
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Identifier that groups events into one actor
    #[arg(long, value_enum, default_value_t = ActorKeyMode::Session)]
    pub actor: ActorKeyMode,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Top share of purchasing actors (percent) for the revenue concentration check
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub top_percent: u8,

    /// Roll categories up to N segments before computing conversion
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub category_depth: Option<usize>,

    /// Restrict the brand price table to this category (and its children)
    #[arg(long)]
    pub brand_category: Option<String>,

    /// Disable parallel computation
    #[arg(long)]
    pub sequential: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.funnel-metrics/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorKeyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_depth: Option<usize>,
}

impl LastUsedParams {
    /// Default location: `~/.funnel-metrics/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".funnel-metrics").join("last_used.json")
    }

    /// Load persisted params; `Default` when the file is absent or unreadable.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable last-used params");
                Self::default()
            }
        }
    }

    /// Atomically write params, creating parent directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with an explicit argument
    /// list and config path.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear last-used params");
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins. clap ids are field names, not flag spellings.
        if !is_arg_explicitly_set(&matches, "data_path") && settings.data_path.is_none() {
            settings.data_path = last.data_path;
        }
        if !is_arg_explicitly_set(&matches, "actor") {
            if let Some(v) = last.actor {
                settings.actor = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "top_percent") {
            if let Some(v) = last.top_percent.filter(|p| (1..=100).contains(p)) {
                settings.top_percent = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "category_depth") && settings.category_depth.is_none()
        {
            settings.category_depth = last.category_depth;
        }

        settings = Self::apply_debug(settings);

        if let Err(e) = LastUsedParams::from(&settings).save_to(config_path) {
            tracing::warn!(error = %e, "failed to persist last-used params");
        }

        settings
    }

    /// Engine configuration derived from the CLI.
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            top_percent: self.top_percent,
            category_depth: self.category_depth,
            parallel: !self.sequential,
        }
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_path: s.data_path.clone(),
            actor: Some(s.actor),
            format: Some(s.format),
            top_percent: Some(s.top_percent),
            category_depth: s.category_depth,
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
