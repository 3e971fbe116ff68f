//! Configuration system for trackcheck.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/trackcheck/config.toml` and/or
//! `.trackcheck/config.toml` in the workspace directory. The tracking host is
//! never read from configuration; it always comes from the command line.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file to merge.
pub const CONFIG_FILE_ENV: &str = "TRACKCHECK_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackcheckConfig {
    /// Where and under which names the run is recorded.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Model hyperparameters.
    #[serde(default)]
    pub model: ModelConfig,
}

/// Experiment/run naming and identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Experiment selected (or created) before the run starts.
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    /// Display name of the run.
    #[serde(default = "default_run_name")]
    pub run_name: String,
    /// Artifact directory the fitted model is uploaded under.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    /// Identity recorded as `mlflow.user` and echoed in the confirmation.
    /// Left unset unless supplied explicitly.
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            experiment_name: default_experiment_name(),
            run_name: default_run_name(),
            artifact_path: default_artifact_path(),
            user: None,
        }
    }
}

fn default_experiment_name() -> String {
    "infra-test".to_string()
}

fn default_run_name() -> String {
    "hello-mlflow".to_string()
}

fn default_artifact_path() -> String {
    "model".to_string()
}

/// Model construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_true")]
    pub fit_intercept: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `config.toml` in the platform config directory, e.g.
/// `~/.config/trackcheck/config.toml` on Linux.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "trackcheck", "trackcheck")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TRACKCHECK_`)
/// 3. File named by `TRACKCHECK_CONFIG`
/// 4. Workspace-local config (`.trackcheck/config.toml`)
/// 5. User config (`~/.config/trackcheck/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&TrackcheckConfig>,
) -> Result<TrackcheckConfig, ConfigError> {
    let explicit = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    load_config_with(workspace, explicit.as_deref(), overrides)
}

/// Like [`load_config`], with the explicit config file passed in directly.
pub fn load_config_with(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&TrackcheckConfig>,
) -> Result<TrackcheckConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(TrackcheckConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".trackcheck").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (TRACKCHECK_TRACKING__USER, TRACKCHECK_MODEL__FIT_INTERCEPT, etc.)
    figment = figment.merge(Env::prefixed("TRACKCHECK_").ignore(&["CONFIG"]).split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: TrackcheckConfig = figment.extract()?;
    tracing::debug!(
        experiment = %config.tracking.experiment_name,
        run = %config.tracking.run_name,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    /// Empty environment with the user config directory inside the jail.
    fn isolate(jail: &mut Jail) {
        let dir = jail.directory().to_path_buf();
        jail.clear_env();
        jail.set_env("HOME", dir.display());
        jail.set_env("XDG_CONFIG_HOME", dir.join("xdg").display());
    }

    #[test]
    fn test_default_config() {
        let config = TrackcheckConfig::default();
        assert_eq!(config.tracking.experiment_name, "infra-test");
        assert_eq!(config.tracking.run_name, "hello-mlflow");
        assert_eq!(config.tracking.artifact_path, "model");
        assert!(config.tracking.user.is_none());
        assert!(config.model.fit_intercept);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = TrackcheckConfig::default();
        config.tracking.user = Some("ops".into());
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: TrackcheckConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.tracking.user.as_deref(), Some("ops"));
        assert_eq!(
            deserialized.tracking.experiment_name,
            config.tracking.experiment_name
        );
    }

    #[test]
    fn test_load_config_defaults_in_clean_environment() {
        Jail::expect_with(|jail| {
            isolate(jail);
            let config = load_config(Some(jail.directory()), None).unwrap();
            assert_eq!(config.tracking.experiment_name, "infra-test");
            assert_eq!(config.tracking.run_name, "hello-mlflow");
            assert!(config.tracking.user.is_none());
            assert!(config.model.fit_intercept);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_with_overrides() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.set_env("TRACKCHECK_MODEL__FIT_INTERCEPT", "true");

            let mut overrides = TrackcheckConfig::default();
            overrides.tracking.run_name = "nightly".to_string();
            overrides.model.fit_intercept = false;

            let config = load_config_with(None, None, Some(&overrides)).unwrap();
            assert_eq!(config.tracking.run_name, "nightly");
            assert!(!config.model.fit_intercept);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_workspace() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.create_dir(".trackcheck")?;
            jail.create_file(
                ".trackcheck/config.toml",
                r#"
[tracking]
experiment_name = "staging-check"
user = "infra-bot"
"#,
            )?;

            let config = load_config_with(Some(jail.directory()), None, None).unwrap();
            assert_eq!(config.tracking.experiment_name, "staging-check");
            assert_eq!(config.tracking.user.as_deref(), Some("infra-bot"));
            // Unset keys keep their defaults.
            assert_eq!(config.tracking.run_name, "hello-mlflow");
            assert!(config.model.fit_intercept);
            Ok(())
        });
    }

    #[test]
    fn test_env_sets_user() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.set_env("TRACKCHECK_TRACKING__USER", "infra-bot");
            jail.set_env("TRACKCHECK_MODEL__FIT_INTERCEPT", "false");

            let config = load_config_with(None, None, None).unwrap();
            assert_eq!(config.tracking.user.as_deref(), Some("infra-bot"));
            assert!(!config.model.fit_intercept);
            Ok(())
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_layer_precedence() {
        Jail::expect_with(|jail| {
            isolate(jail);

            let user_config = user_config_path().unwrap();
            assert!(user_config.starts_with(jail.directory()));
            std::fs::create_dir_all(user_config.parent().unwrap()).unwrap();
            std::fs::write(
                &user_config,
                r#"
[tracking]
experiment_name = "from-user"
run_name = "from-user"
artifact_path = "from-user"
user = "from-user"
"#,
            )
            .unwrap();

            jail.create_dir(".trackcheck")?;
            jail.create_file(
                ".trackcheck/config.toml",
                r#"
[tracking]
run_name = "from-workspace"
artifact_path = "from-workspace"
user = "from-workspace"
"#,
            )?;
            jail.create_file(
                "explicit.toml",
                r#"
[tracking]
artifact_path = "from-file"
user = "from-file"
"#,
            )?;
            jail.set_env(CONFIG_FILE_ENV, "explicit.toml");
            jail.set_env("TRACKCHECK_TRACKING__USER", "from-env");

            let config = load_config(Some(jail.directory()), None).unwrap();
            assert_eq!(config.tracking.experiment_name, "from-user");
            assert_eq!(config.tracking.run_name, "from-workspace");
            assert_eq!(config.tracking.artifact_path, "from-file");
            assert_eq!(config.tracking.user.as_deref(), Some("from-env"));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_config_file() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.create_file("check.toml", "[model]\nfit_intercept = false\n")?;

            let path = jail.directory().join("check.toml");
            let config = load_config_with(None, Some(&path), None).unwrap();
            assert!(!config.model.fit_intercept);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_config_file() {
        Jail::expect_with(|jail| {
            isolate(jail);
            let path = jail.directory().join("nope.toml");
            let err = load_config_with(None, Some(&path), None).unwrap_err();
            assert!(matches!(err, ConfigError::FileNotFound { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_config_value() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.create_file("bad.toml", "[model]\nfit_intercept = \"maybe\"\n")?;

            let path = jail.directory().join("bad.toml");
            let err = load_config_with(None, Some(&path), None).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }));
            Ok(())
        });
    }
}
