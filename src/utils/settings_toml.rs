//! Load `.treeload.toml` from a directory (CLI only). Library callers build [`Opts`] or
//! [`ImporterConfig`](crate::ImporterConfig) directly.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    store: Option<String>,
    queue_dir: Option<String>,
    target: Option<String>,
    partitions: Option<i64>,
    threads: Option<i64>,
    batch_size: Option<i64>,
    batch_threshold: Option<u64>,
    retry_max: Option<i64>,
    retry_delay_ms: Option<u64>,
    producer_timeout: Option<u64>,
    drain_timeout: Option<u64>,
    exclude: Option<Vec<String>>,
    verbose: Option<bool>,
    json: Option<bool>,
}

/// Load the settings file from `dir` if present. Returns None if missing or unreadable.
pub fn load_settings_toml(dir: &Path) -> Option<SettingsToml> {
    let path = dir.join(PackagePaths::get().settings_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_settings(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub fn parse_settings(s: &str) -> Result<SettingsToml, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file settings to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &SettingsToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(ref p) = s.store {
        opts.store_path = Some(PathBuf::from(p));
    }
    if let Some(ref p) = s.queue_dir {
        opts.queue_dir = Some(PathBuf::from(p));
    }
    if s.partitions.is_some() {
        opts.partitions = s.partitions;
    }
    if s.threads.is_some() {
        opts.threads = s.threads;
    }
    if s.producer_timeout.is_some() {
        opts.producer_timeout_secs = s.producer_timeout;
    }
    if s.drain_timeout.is_some() {
        opts.drain_timeout_secs = s.drain_timeout;
    }
    apply_file_opt!(s, opts, target => target);
    apply_file_opt!(s, opts, batch_size => batch_size);
    apply_file_opt!(s, opts, batch_threshold => batch_threshold_secs);
    apply_file_opt!(s, opts, retry_max => retry_max);
    apply_file_opt!(s, opts, retry_delay_ms => retry_delay_ms);
    apply_file_opt!(s, opts, exclude => exclude);
    apply_file_opt!(s, opts, verbose => verbose);
    apply_file_opt!(s, opts, json => json);
}
