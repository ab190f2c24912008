//! Run configuration: command line > TOML file > environment > directories file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use axiomkit_io_sync::{
    DEFAULT_IGNORE_NAMES, EnumSyncCompareMode, EnumSyncPatternMode, SpecSyncOptions,
};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::cli::Cli;

pub const C_CONFIG_FILE_DEFAULT: &str = "axiomkit_sync.toml";
pub const C_LOG_FILE_DEFAULT: &str = "sync.log";
pub const C_ENV_PREFIX: &str = "AXIOMKIT_SYNC";

/// Values read from the config file and the environment.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpecSyncConfig {
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub ignore: Option<Vec<String>>,
    pub default_ignores: Option<bool>,
    pub pattern_mode: Option<String>,
    pub compare: Option<String>,
    pub workers: Option<usize>,
    pub preserve_metadata: Option<bool>,
    pub dry_run: Option<bool>,
    pub log_file: Option<PathBuf>,
}

impl SpecSyncConfig {
    /// Load environment variables, then the config file on top of them.
    ///
    /// An explicit `path_config` must exist; the default file is optional.
    pub fn load(path_config: Option<&Path>) -> Result<Self, ConfigError> {
        let source_file = match path_config {
            Some(path) => ConfigFile::from(path).required(true),
            None => ConfigFile::with_name(C_CONFIG_FILE_DEFAULT).required(false),
        };
        Config::builder()
            .add_source(
                Environment::with_prefix(C_ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ignore"),
            )
            .add_source(source_file)
            .build()?
            .try_deserialize::<SpecSyncConfig>()
    }
}

/// Everything `main` needs for one run.
#[derive(Debug, Clone)]
pub struct SpecSyncRun {
    pub path_dir_src: PathBuf,
    pub path_dir_dst: PathBuf,
    pub spec_sync_options: SpecSyncOptions,
}

pub fn resolve_log_file(args: &Cli, spec_conf: &SpecSyncConfig) -> PathBuf {
    args.log_file
        .clone()
        .or_else(|| spec_conf.log_file.clone())
        .unwrap_or_else(|| PathBuf::from(C_LOG_FILE_DEFAULT))
}

pub fn resolve_run(args: &Cli, spec_conf: SpecSyncConfig) -> anyhow::Result<SpecSyncRun> {
    let mut path_dir_src = args.source.clone().or(spec_conf.source);
    let mut path_dir_dst = args.destination.clone().or(spec_conf.destination);
    if path_dir_src.is_none() || path_dir_dst.is_none() {
        let (path_src_file, path_dst_file) = read_directories_file(&args.directories_file)?;
        path_dir_src = path_dir_src.or(Some(path_src_file));
        path_dir_dst = path_dir_dst.or(Some(path_dst_file));
    }
    let (Some(path_dir_src), Some(path_dir_dst)) = (path_dir_src, path_dir_dst) else {
        bail!("Source and destination directories are required.");
    };

    let mut l_patterns = if args.patterns_ignore.is_empty() {
        spec_conf.ignore.unwrap_or_default()
    } else {
        args.patterns_ignore.clone()
    };
    let if_default_ignores = args.default_ignores || spec_conf.default_ignores.unwrap_or(false);
    let rule_pattern = match args.pattern_mode.as_deref().or(spec_conf.pattern_mode.as_deref()) {
        Some(value) => parse_rule_pattern(value)?,
        None => EnumSyncPatternMode::Glob,
    };
    if if_default_ignores {
        // Built-in names are exact; keep them exact under any pattern mode.
        l_patterns.extend(DEFAULT_IGNORE_NAMES.iter().map(|name| match rule_pattern {
            EnumSyncPatternMode::Regex => format!("^{}$", regex::escape(name)),
            EnumSyncPatternMode::Glob | EnumSyncPatternMode::Literal => name.to_string(),
        }));
    }
    let rule_compare = match args.compare.as_deref().or(spec_conf.compare.as_deref()) {
        Some(value) => parse_rule_compare(value)?,
        None => EnumSyncCompareMode::Shallow,
    };

    Ok(SpecSyncRun {
        path_dir_src,
        path_dir_dst,
        spec_sync_options: SpecSyncOptions {
            patterns_ignore: (!l_patterns.is_empty()).then_some(l_patterns),
            rule_pattern,
            rule_compare,
            num_workers_max: args.workers.or(spec_conf.workers),
            if_preserve_metadata: !args.no_preserve_metadata
                && spec_conf.preserve_metadata.unwrap_or(true),
            if_dry_run: args.dry_run || spec_conf.dry_run.unwrap_or(false),
        },
    })
}

/// Read (source, destination) from the first two lines of `path_file`.
pub fn read_directories_file(path_file: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let c_name = path_file.display();
    let txt = match fs::read_to_string(path_file) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            bail!("The '{c_name}' file was not found.");
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("An error occurred while reading '{c_name}'"));
        }
    };

    let mut iter_lines = txt.trim_start_matches('\u{feff}').lines();
    match (iter_lines.next(), iter_lines.next()) {
        (Some(line_src), Some(line_dst)) => {
            Ok((PathBuf::from(line_src), PathBuf::from(line_dst)))
        }
        _ => bail!(
            "The '{c_name}' file must contain at least two lines: source and destination directories."
        ),
    }
}

pub fn parse_rule_pattern(value: &str) -> anyhow::Result<EnumSyncPatternMode> {
    match value {
        "glob" => Ok(EnumSyncPatternMode::Glob),
        "regex" => Ok(EnumSyncPatternMode::Regex),
        "literal" => Ok(EnumSyncPatternMode::Literal),
        _ => bail!(
            "Invalid pattern strategy: `{value}`. Expected one of: ['glob', 'regex', 'literal']"
        ),
    }
}

pub fn parse_rule_compare(value: &str) -> anyhow::Result<EnumSyncCompareMode> {
    match value {
        "shallow" => Ok(EnumSyncCompareMode::Shallow),
        "content" => Ok(EnumSyncCompareMode::Content),
        "metadata" => Ok(EnumSyncCompareMode::Metadata),
        _ => bail!(
            "Invalid compare strategy: `{value}`. Expected one of: ['shallow', 'content', 'metadata']"
        ),
    }
}
