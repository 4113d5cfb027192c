//! Config file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines (a TOML subset):
//!
//! ```text
//! # ~/.config/harvester/config.toml
//! ledger = "/data/recordings/downloaded.json"
//! downloads_dir = "/data/recordings/rar"
//! concurrency = 6
//! strict_months = false
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Defaults read from the config file. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Progress ledger file.
    pub ledger: Option<PathBuf>,
    /// Root folder for archives.
    pub downloads_dir: Option<PathBuf>,
    /// Root folder for media.
    pub extracted_dir: Option<PathBuf>,
    /// Maximum concurrent fetches.
    pub concurrency: Option<u8>,
    /// Maximum collections resolved at once.
    pub metadata_concurrency: Option<u8>,
    /// Maximum fetch attempts per recording.
    pub max_attempts: Option<u8>,
    /// Page load timeout in seconds.
    pub page_timeout_secs: Option<u64>,
    /// Transfer timeout in seconds.
    pub transfer_timeout_secs: Option<u64>,
    /// Reject unknown month names.
    pub strict_months: Option<bool>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI accepts.
    pub fn validate(&self) -> Result<()> {
        validate_range("concurrency", self.concurrency.map(u64::from), 1, 32)?;
        validate_range(
            "metadata_concurrency",
            self.metadata_concurrency.map(u64::from),
            1,
            32,
        )?;
        validate_range("max_attempts", self.max_attempts.map(u64::from), 1, 10)?;
        validate_range("page_timeout_secs", self.page_timeout_secs, 1, 3600)?;
        validate_range("transfer_timeout_secs", self.transfer_timeout_secs, 1, 86_400)?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("harvester")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "ledger" => {
                cfg.ledger = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "downloads_dir" => {
                cfg.downloads_dir = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "extracted_dir" => {
                cfg.extracted_dir = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "concurrency" => cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?),
            "metadata_concurrency" => {
                cfg.metadata_concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_attempts" => {
                cfg.max_attempts = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "page_timeout_secs" => {
                cfg.page_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "transfer_timeout_secs" => {
                cfg.transfer_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "strict_months" => {
                cfg.strict_months = Some(parse_boolean(value).with_context(invalid)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
