//! Optional config file supplying defaults for CLI flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use harvester_core::config::{MAX_ATTEMPTS, MAX_CONCURRENCY, normalize_extension};

/// Longest pacing interval accepted from any source, in milliseconds.
pub const MAX_PACING_MS: u64 = 60_000;

/// `key = value` file configuration for harvester defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Minimum acceptable width and height in pixels.
    pub min_dimension: Option<u32>,
    /// Assets processed at once.
    pub concurrency: Option<usize>,
    /// Per-origin pacing interval in milliseconds.
    pub pacing_ms: Option<u64>,
    /// Retries after the first fetch attempt.
    pub max_retries: Option<u32>,
    /// Content-container class hints, replacing the built-in list.
    pub content_hints: Option<Vec<String>>,
    /// Inspected file extensions, replacing the built-in list.
    pub extensions: Option<Vec<String>>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if self.min_dimension == Some(0) {
            bail!("Invalid config value for `min_dimension`: 0. Expected a positive integer");
        }
        if let Some(concurrency) = self.concurrency
            && !(1..=MAX_CONCURRENCY).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: 1..={MAX_CONCURRENCY}"
            );
        }
        if let Some(pacing_ms) = self.pacing_ms
            && pacing_ms > MAX_PACING_MS
        {
            bail!(
                "Invalid config value for `pacing_ms`: {pacing_ms}. Expected range: 0..={MAX_PACING_MS}"
            );
        }
        if let Some(max_retries) = self.max_retries
            && max_retries >= MAX_ATTEMPTS
        {
            bail!(
                "Invalid config value for `max_retries`: {max_retries}. Expected range: 0..={}",
                MAX_ATTEMPTS - 1
            );
        }
        if self.extensions.as_ref().is_some_and(Vec::is_empty) {
            bail!("Invalid config value for `extensions`: list must not be empty");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Default tracing filter for this setting.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
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

/// Loads the config file named with `--config`, or the default one if it exists.
///
/// An explicit path must exist; a missing default file yields `None`.
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

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "min_dimension" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.min_dimension = Some(u32::try_from(parsed).with_context(context)?);
            }
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.concurrency = Some(usize::try_from(parsed).with_context(context)?);
            }
            "pacing_ms" => {
                cfg.pacing_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.max_retries = Some(u32::try_from(parsed).with_context(context)?);
            }
            "content_hints" => {
                cfg.content_hints = Some(parse_string_list(value).with_context(context)?);
            }
            "extensions" => {
                let parsed = parse_string_list(value).with_context(context)?;
                cfg.extensions = Some(
                    parsed
                        .iter()
                        .map(String::as_str)
                        .map(normalize_extension)
                        .collect(),
                );
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
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

/// `["a", "b"]`; a trailing comma is allowed, empty entries are not.
fn parse_string_list(raw_value: &str) -> Result<Vec<String>> {
    let Some(inner) = raw_value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        bail!("Expected a list of double-quoted strings, e.g. [\"a\", \"b\"]");
    };

    let mut items = Vec::new();
    for entry in inner.split(',').map(str::trim) {
        if entry.is_empty() {
            continue;
        }
        let item = parse_string_literal(entry)?;
        if item.trim().is_empty() {
            bail!("List entries must not be empty");
        }
        items.push(item);
    }
    Ok(items)
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

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
