//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mediafetch_core::{EngineConfig, SizeCeiling};

use crate::cli::Args;

/// Key=value file configuration for the console front end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Delivery ceiling in megabytes.
    pub ceiling_mb: Option<u64>,
    /// Scratch directory for in-progress downloads.
    pub work_dir: Option<PathBuf>,
    /// Directory that receives delivered files.
    pub output_dir: Option<PathBuf>,
    /// yt-dlp executable.
    pub yt_dlp: Option<String>,
    /// Download admission limit (same range as CLI).
    pub max_downloads: Option<u8>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(ceiling_mb) = self.ceiling_mb
            && !(1..=4096).contains(&ceiling_mb)
        {
            bail!("Invalid config value for `ceiling_mb`: {ceiling_mb}. Expected range: 1..=4096");
        }

        if let Some(max_downloads) = self.max_downloads
            && !(1..=32).contains(&max_downloads)
        {
            bail!(
                "Invalid config value for `max_downloads`: {max_downloads}. Expected range: 1..=32"
            );
        }

        if self.yt_dlp.as_deref().is_some_and(|p| p.trim().is_empty()) {
            bail!("Invalid config value for `yt_dlp`: must not be empty");
        }

        Ok(())
    }
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
    /// Tracing level this setting maps to.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Fully resolved runtime settings (file config merged under CLI flags).
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub output_dir: PathBuf,
    pub yt_dlp: String,
    pub log_level: &'static str,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediafetch/config.toml`
/// 2. `$HOME/.config/mediafetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mediafetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediafetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the file config.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config_for(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Merges CLI flags over the file config.
#[must_use]
pub fn resolve_settings(args: &Args, file: Option<&FileConfig>) -> Settings {
    let file = file.cloned().unwrap_or_default();
    let defaults = EngineConfig::default();

    let ceiling = args
        .ceiling_mb
        .or(file.ceiling_mb)
        .map_or(defaults.ceiling, SizeCeiling::from_mib);
    let max_concurrent_downloads = args
        .max_downloads
        .or(file.max_downloads)
        .map_or(defaults.max_concurrent_downloads, usize::from);

    Settings {
        engine: EngineConfig {
            ceiling,
            work_dir: args
                .work_dir
                .clone()
                .or(file.work_dir)
                .unwrap_or(defaults.work_dir),
            max_concurrent_downloads,
        },
        output_dir: args
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        yt_dlp: args
            .yt_dlp
            .clone()
            .or(file.yt_dlp)
            .unwrap_or_else(|| mediafetch_core::extract::DEFAULT_YTDLP_PROGRAM.to_string()),
        log_level: log_level(args, file.verbosity),
    }
}

fn log_level(args: &Args, verbosity: Option<VerbositySetting>) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => verbosity.map_or("info", VerbositySetting::level),
            1 => "debug",
            _ => "trace",
        }
    }
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
        let line_no = line_index + 1;

        match key {
            "ceiling_mb" => {
                let parsed = parse_integer_u64(value)
                    .with_context(|| format!("Invalid `ceiling_mb` value on line {line_no}"))?;
                cfg.ceiling_mb = Some(parsed);
            }
            "work_dir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `work_dir` value on line {line_no}"))?;
                cfg.work_dir = Some(PathBuf::from(parsed));
            }
            "output_dir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `output_dir` value on line {line_no}"))?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "yt_dlp" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `yt_dlp` value on line {line_no}"))?;
                cfg.yt_dlp = Some(parsed);
            }
            "max_downloads" => {
                let parsed = parse_integer_u8(value)
                    .with_context(|| format!("Invalid `max_downloads` value on line {line_no}"))?;
                cfg.max_downloads = Some(parsed);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_no}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
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

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let value = parse_integer_u64(raw_value)?;
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

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mediafetch"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
ceiling_mb = 20
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.ceiling_mb, Some(20));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.output_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_fields_with_comments() {
        let cfg = parse_config_str(
            r#"
# console defaults
work_dir = "/var/tmp/mf" # scratch
output_dir = "/srv/media"
yt_dlp = "/opt/bin/yt-dlp"
max_downloads = 2
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.work_dir, Some(PathBuf::from("/var/tmp/mf")));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/srv/media")));
        assert_eq!(cfg.yt_dlp.as_deref(), Some("/opt/bin/yt-dlp"));
        assert_eq!(cfg.max_downloads, Some(2));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_values() {
        let err = parse_config_str("ceiling_mb = 0").expect_err("zero ceiling");
        assert!(err.to_string().contains("ceiling_mb"));

        let err = parse_config_str("max_downloads = 33").expect_err("too many downloads");
        assert!(err.to_string().contains("max_downloads"));

        let err = parse_config_str("max_downloads = 300").expect_err("u8 overflow");
        assert!(err.to_string().contains("max_downloads"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key_and_bad_syntax() {
        let err = parse_config_str("concurrency = 4").expect_err("unknown key");
        assert!(err.to_string().contains("concurrency"));

        let err = parse_config_str("work_dir /tmp").expect_err("missing equals");
        assert!(err.to_string().contains("line 1"));

        let err = parse_config_str("work_dir = /tmp").expect_err("unquoted string");
        assert!(err.to_string().contains("work_dir"));
    }

    #[test]
    fn test_parse_config_keeps_hash_inside_strings() {
        let cfg = parse_config_str(r#"output_dir = "/srv/#media""#).unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/srv/#media")));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file_config_for(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "ceiling_mb = 10\n").unwrap();
        let cfg = load_file_config_for(Some(&path)).unwrap().unwrap();
        assert_eq!(cfg.ceiling_mb, Some(10));
    }

    #[test]
    fn test_resolve_settings_defaults() {
        let settings = resolve_settings(&args(&[]), None);
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.yt_dlp, "yt-dlp");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_resolve_settings_cli_overrides_file() {
        let file = FileConfig {
            ceiling_mb: Some(10),
            max_downloads: Some(2),
            yt_dlp: Some("/opt/yt-dlp".to_string()),
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };
        let settings = resolve_settings(&args(&["--ceiling-mb", "20", "-v"]), Some(&file));
        assert_eq!(settings.engine.ceiling, SizeCeiling::from_mib(20));
        assert_eq!(settings.engine.max_concurrent_downloads, 2);
        assert_eq!(settings.yt_dlp, "/opt/yt-dlp");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_log_level_priority() {
        assert_eq!(log_level(&args(&["-q", "-vv"]), None), "error");
        assert_eq!(log_level(&args(&["-vv"]), None), "trace");
        assert_eq!(
            log_level(&args(&[]), Some(VerbositySetting::Quiet)),
            "error"
        );
    }
}
