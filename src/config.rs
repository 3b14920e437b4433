//! Runtime configuration: built-in defaults, then an optional TOML file, then
//! `TRANSIT_SYNC_*` environment variables.

use chrono::Duration as ChronoDuration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::ArchiveOptions;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::sync::default_parallelism;

pub const ENV_PREFIX: &str = "TRANSIT_SYNC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,

    /// Sync workers; 0 = available CPUs
    pub sync_parallelism: usize,

    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_backoff_multiplier: f64,

    pub archive_output_directory: PathBuf,
    pub archive_window_hours: i64,
    pub archive_write_individual_files: bool,
    pub archive_write_bundle: bool,
    pub archive_cloud_upload: bool,
    pub archive_bucket_name: String,

    /// Root for the local object store used when S3 is not enabled
    pub object_store_root: PathBuf,

    pub active_window_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("transit-sync.db"),
            sync_parallelism: 0,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 200,
            retry_backoff_multiplier: 2.0,
            archive_output_directory: PathBuf::from("archive"),
            archive_window_hours: 24,
            archive_write_individual_files: false,
            archive_write_bundle: true,
            archive_cloud_upload: false,
            archive_bucket_name: String::new(),
            object_store_root: PathBuf::from("object-store"),
            active_window_minutes: crate::stats::DEFAULT_ACTIVE_WINDOW_MINUTES,
        }
    }
}

impl Config {
    /// Load configuration. A missing file is not an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(config_path)
            .extract()
            .map_err(|e| ConfigError::Extract(Box::new(e)))
    }

    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).lowercase(true))
    }

    pub fn effective_parallelism(&self) -> usize {
        if self.sync_parallelism == 0 {
            default_parallelism()
        } else {
            self.sync_parallelism
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            multiplier: self.retry_backoff_multiplier.max(1.0),
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            output_directory: self.archive_output_directory.clone(),
            window: ChronoDuration::hours(self.archive_window_hours.max(0)),
            write_individual_files: self.archive_write_individual_files,
            write_bundle: self.archive_write_bundle,
            cloud_upload: self.archive_cloud_upload,
            bucket_name: self.archive_bucket_name.clone(),
        }
    }

    pub fn active_window(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.active_window_minutes.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.archive_window_hours, 24);
        assert_eq!(config.active_window_minutes, 20);
        assert!(config.effective_parallelism() >= 1);
        assert_eq!(config.archive_options().window, ChronoDuration::hours(24));
    }

    #[test]
    fn test_toml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "transit-sync.toml",
                r#"
                    sync_parallelism = 4
                    archive_bucket_name = "from-file"
                    archive_write_individual_files = true
                "#,
            )?;
            jail.set_env("TRANSIT_SYNC_ARCHIVE_BUCKET_NAME", "from-env");

            let config: Config = Config::figment(Some(Path::new("transit-sync.toml"))).extract()?;

            assert_eq!(config.sync_parallelism, 4);
            assert_eq!(config.archive_bucket_name, "from-env");
            assert!(config.archive_write_individual_files);
            assert_eq!(config.retry_max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_retry_policy_is_clamped() {
        let config = Config {
            retry_max_attempts: 0,
            retry_backoff_multiplier: 0.5,
            ..Default::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.multiplier, 1.0);
    }
}
