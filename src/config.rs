//! Configuration management for capsup.
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashSet,
    env, fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use crate::{
    constants::{
        DEFAULT_CAPTURE_BIN, DEFAULT_MAX_ROTATED_FILES, DEFAULT_OUTPUT_DIR,
        DEFAULT_ROTATE_SIZE_MB,
    },
    error::CaptureError,
};

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern compiles")
});

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The `settings` block holding every supervisor option.
    pub settings: Settings,
}

/// Capture and supervision settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Interfaces to capture on, one supervised unit each, in start order.
    #[serde(default, deserialize_with = "deserialize_list")]
    pub interfaces: Vec<String>,
    /// Directory receiving capture files and diagnostic logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Path to the capture tool binary.
    #[serde(default = "default_capture_bin")]
    pub tcpdump_bin: PathBuf,
    /// Size in megabytes at which the capture tool rotates its output file.
    #[serde(default = "default_rotate_size_mb")]
    pub rotate_size_mb: u64,
    /// Number of rotated files the capture tool keeps.
    #[serde(default = "default_max_rotated_files")]
    pub max_rotated_files: u32,
    /// Extra arguments appended verbatim, in order, to every capture command.
    #[serde(default, deserialize_with = "deserialize_list")]
    pub extra_args: Vec<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_capture_bin() -> PathBuf {
    PathBuf::from(DEFAULT_CAPTURE_BIN)
}

fn default_rotate_size_mb() -> u64 {
    DEFAULT_ROTATE_SIZE_MB
}

fn default_max_rotated_files() -> u32 {
    DEFAULT_MAX_ROTATED_FILES
}

/// List settings may be written as a comma-separated string or as a YAML sequence.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListSetting {
    Joined(String),
    Items(Vec<String>),
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<ListSetting>::deserialize(deserializer)? {
        Some(ListSetting::Joined(raw)) => split_list(&raw),
        Some(ListSetting::Items(items)) => items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    Ok(items)
}

/// Splits a comma-separated setting, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    /// Rejects settings the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.interfaces.is_empty() {
            return Err(CaptureError::InvalidConfig(
                "no interfaces configured".into(),
            ));
        }

        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if iface.contains('/') {
                return Err(CaptureError::InvalidConfig(format!(
                    "interface name '{iface}' must not contain '/'"
                )));
            }
            if !seen.insert(iface.as_str()) {
                return Err(CaptureError::InvalidConfig(format!(
                    "interface '{iface}' is listed more than once"
                )));
            }
        }

        if self.rotate_size_mb == 0 {
            return Err(CaptureError::InvalidConfig(
                "rotate_size_mb must be greater than zero".into(),
            ));
        }
        if self.max_rotated_files == 0 {
            return Err(CaptureError::InvalidConfig(
                "max_rotated_files must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Checks the environment before any capture process is spawned: the capture
    /// binary must exist and the output directory must exist or be creatable.
    pub fn preflight(&self) -> Result<(), CaptureError> {
        if self.locate_capture_bin().is_none() {
            return Err(CaptureError::CaptureToolMissing(self.tcpdump_bin.clone()));
        }

        if !self.output_dir.is_dir() {
            fs::create_dir_all(&self.output_dir).map_err(|source| {
                CaptureError::OutputDir {
                    path: self.output_dir.clone(),
                    source,
                }
            })?;
        }

        Ok(())
    }

    /// Finds the capture binary: paths with a directory part are taken as given, bare
    /// names are looked up as executables on `PATH`.
    pub fn locate_capture_bin(&self) -> Option<PathBuf> {
        if self.tcpdump_bin.components().count() > 1 {
            return self
                .tcpdump_bin
                .exists()
                .then(|| self.tcpdump_bin.clone());
        }

        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&self.tcpdump_bin))
            .find(|candidate| is_executable(candidate))
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
        // Bare names are resolved on PATH by `locate_capture_bin`.
        if self.tcpdump_bin.is_relative() && self.tcpdump_bin.components().count() > 1 {
            self.tcpdump_bin = base.join(&self.tcpdump_bin);
        }
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Byte offset where a YAML comment starts on `line`, ignoring `#` inside quoted
/// scalars.
fn comment_start(line: &str) -> Option<usize> {
    let mut quote = None;
    let mut prev: Option<char> = None;

    for (idx, ch) in line.char_indices() {
        let at_token_start =
            prev.is_none_or(|c| c.is_whitespace() || matches!(c, ':' | ',' | '[' | '{'));
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if matches!(ch, '"' | '\'') && at_token_start => quote = Some(ch),
            None if ch == '#' && prev.is_none_or(char::is_whitespace) => return Some(idx),
            None => {}
        }
        prev = Some(ch);
    }

    None
}

/// Expands `$VAR` and `${VAR}` references using the process environment. Comment
/// text is copied through untouched.
fn expand_env_vars(input: &str) -> Result<String, CaptureError> {
    let mut missing = None;
    let mut expanded = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        let (content, comment) = line.split_at(comment_start(line).unwrap_or(line.len()));
        let replaced = ENV_VAR_PATTERN.replace_all(content, |caps: &Captures| {
            match env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });
        expanded.push_str(&replaced);
        expanded.push_str(comment);
    }

    if let Some(var_name) = missing {
        return Err(CaptureError::MissingEnvVar(var_name));
    }
    Ok(expanded)
}

/// Loads and parses the configuration file, expanding environment variables and
/// anchoring relative paths to the file's directory.
pub fn load_config(config_path: &Path) -> Result<Config, CaptureError> {
    let content =
        fs::read_to_string(config_path).map_err(|source| CaptureError::ConfigRead {
            path: config_path.to_path_buf(),
            source,
        })?;

    let expanded = expand_env_vars(&content)?;
    let mut config: Config = serde_yaml::from_str(&expanded)?;

    let base_path = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.settings.resolve_relative_paths(base_path);
    config.settings.validate()?;

    Ok(config)
}
