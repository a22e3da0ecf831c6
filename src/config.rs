//! Configuration loading via `ortho-config`.
//!
//! [`LifecycleConfig`] carries the poll budgets the coordinator waits with
//! and the volume type it reports. Values merge defaults, `blockyard.toml`,
//! and `BLOCKYARD_*` environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::{DEFAULT_MAX_ATTEMPTS, PollPolicies, PollPolicy};
use crate::volume::VolumeType;

/// Default pause between refreshes, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Lifecycle settings derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BLOCKYARD",
    discovery(
        app_name = "blockyard",
        env_var = "BLOCKYARD_CONFIG_PATH",
        config_file_name = "blockyard.toml",
        dotfile_name = ".blockyard.toml",
        project_file_name = "blockyard.toml"
    )
)]
pub struct LifecycleConfig {
    /// Refreshes attempted before a wait gives up. Applies to every
    /// operation without its own override.
    #[ortho_config(default = DEFAULT_MAX_ATTEMPTS)]
    pub poll_max_attempts: u32,
    /// Seconds between refreshes.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
    /// Attempt budget for attach and detach waits.
    pub attach_max_attempts: Option<u32>,
    /// Attempt budget for snapshot completion waits.
    pub snapshot_max_attempts: Option<u32>,
    /// Attempt budget for volume deletion waits.
    pub delete_max_attempts: Option<u32>,
    /// Volume type reported for provider volumes (`local`, `san`, `nas`).
    #[ortho_config(default = "san".to_owned())]
    pub default_volume_type: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            attach_max_attempts: None,
            snapshot_max_attempts: None,
            delete_max_attempts: None,
            default_volume_type: String::from("san"),
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn invalid(&self, problem: &str) -> ConfigError {
        ConfigError::InvalidField(format!(
            "{} {problem}: set {} or {} in blockyard.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const POLL_MAX_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "poll attempt budget",
    "BLOCKYARD_POLL_MAX_ATTEMPTS",
    "poll_max_attempts",
);
const POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "BLOCKYARD_POLL_INTERVAL_SECS",
    "poll_interval_secs",
);
const ATTACH_MAX_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "attach attempt budget",
    "BLOCKYARD_ATTACH_MAX_ATTEMPTS",
    "attach_max_attempts",
);
const SNAPSHOT_MAX_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "snapshot attempt budget",
    "BLOCKYARD_SNAPSHOT_MAX_ATTEMPTS",
    "snapshot_max_attempts",
);
const DELETE_MAX_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "delete attempt budget",
    "BLOCKYARD_DELETE_MAX_ATTEMPTS",
    "delete_max_attempts",
);
const DEFAULT_VOLUME_TYPE: FieldMetadata = FieldMetadata::new(
    "volume type",
    "BLOCKYARD_DEFAULT_VOLUME_TYPE",
    "default_volume_type",
);

impl LifecycleConfig {
    fn require_attempts(value: Option<u32>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        match value {
            Some(0) => Err(metadata.invalid("must be at least 1")),
            _ => Ok(()),
        }
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("blockyard")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that set the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for a zero budget or interval,
    /// or an unknown volume type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_attempts(Some(self.poll_max_attempts), &POLL_MAX_ATTEMPTS)?;
        if self.poll_interval_secs == 0 {
            return Err(POLL_INTERVAL.invalid("must be at least 1 second"));
        }
        Self::require_attempts(self.attach_max_attempts, &ATTACH_MAX_ATTEMPTS)?;
        Self::require_attempts(self.snapshot_max_attempts, &SNAPSHOT_MAX_ATTEMPTS)?;
        Self::require_attempts(self.delete_max_attempts, &DELETE_MAX_ATTEMPTS)?;
        self.volume_type().map(|_| ())
    }

    /// Parsed [`Self::default_volume_type`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the value names no known
    /// volume type.
    pub fn volume_type(&self) -> Result<VolumeType, ConfigError> {
        match self
            .default_volume_type
            .parse::<VolumeType>()
            .unwrap_or(VolumeType::Unrecognized)
        {
            VolumeType::Unrecognized => Err(DEFAULT_VOLUME_TYPE.invalid(&format!(
                "'{}' is not one of local, san, nas",
                self.default_volume_type
            ))),
            volume_type => Ok(volume_type),
        }
    }

    /// Builds per-operation poll policies. Provisioning always uses the
    /// shared budget; the other classes use their override when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn policies(&self) -> Result<PollPolicies, ConfigError> {
        self.validate()?;
        let shared = PollPolicy::new(
            self.poll_max_attempts,
            Duration::from_secs(self.poll_interval_secs),
        );
        let budget = |value: Option<u32>| {
            value.map_or(shared, |attempts| shared.with_max_attempts(attempts))
        };
        Ok(PollPolicies {
            provisioning: shared,
            attachment: budget(self.attach_max_attempts),
            snapshot: budget(self.snapshot_max_attempts),
            deletion: budget(self.delete_max_attempts),
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a configuration field holds an unusable value.
    #[error("invalid configuration field: {0}")]
    InvalidField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
