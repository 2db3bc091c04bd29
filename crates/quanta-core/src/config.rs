//! `quanta.yaml` configuration.
//!
//! Every knob has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QuantaConfig {
    pub run: RunSettings,
    pub board: BoardSettings,
    pub endpoints: EndpointSettings,
    pub store: StoreSettings,
}

pub const MAX_STALENESS_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 60 * 1000;
pub const MAX_POLL_ATTEMPTS: u32 = 10_000;

/// Reuse window and poll bounds for the run orchestrator.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// At most [`MAX_STALENESS_WINDOW_SECS`].
    pub staleness_window_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub history_limit: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            staleness_window_secs: 600,
            poll_interval_ms: 2000,
            max_poll_attempts: 90,
            history_limit: 20,
        }
    }
}

impl RunSettings {
    /// Saturates at `chrono::Duration::MAX` for windows chrono cannot represent.
    pub fn staleness_window(&self) -> chrono::Duration {
        i64::try_from(self.staleness_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on how long a poll loop can wait.
    pub fn poll_ceiling(&self) -> Duration {
        self.poll_interval()
            .checked_mul(self.max_poll_attempts)
            .unwrap_or(Duration::MAX)
    }
}

/// Grade thresholds, evaluated top-down. A score at or above a band's floor earns it.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GradeBands {
    pub s: u8,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
}

impl Default for GradeBands {
    fn default() -> Self {
        Self {
            s: 90,
            a: 80,
            b: 70,
            c: 60,
            d: 50,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BoardSettings {
    pub grade_bands: GradeBands,
    /// Completed engines scoring below this are flagged once the board is complete.
    pub weak_threshold: u8,
    pub short_form_max_secs: u32,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            grade_bands: GradeBands::default(),
            weak_threshold: 70,
            short_form_max_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    pub analyzer_url: Option<String>,
    pub engine_base_url: Option<String>,
    /// Name of the environment variable holding the bearer key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            analyzer_url: None,
            engine_base_url: None,
            api_key_env: "QUANTA_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EndpointSettings {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".quanta/runs.db"),
        }
    }
}

impl QuantaConfig {
    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: QuantaConfig = if s.trim().is_empty() {
            QuantaConfig::default()
        } else {
            serde_yaml::from_str(s)
                .map_err(|e| anyhow::anyhow!("config error: invalid quanta config YAML: {}", e))?
        };
        cfg.validate()
            .map_err(|e| anyhow::anyhow!("config error: {}", e))?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "config error: failed to read config '{}': {}",
                path.display(),
                e
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Loads `path` when it exists, falling back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let r = &self.run;
        if r.staleness_window_secs > MAX_STALENESS_WINDOW_SECS {
            return Err(format!(
                "run.staleness_window_secs must be <= {} (got {})",
                MAX_STALENESS_WINDOW_SECS, r.staleness_window_secs
            ));
        }
        if r.poll_interval_ms == 0 || r.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(format!(
                "run.poll_interval_ms must be in 1..={} (got {})",
                MAX_POLL_INTERVAL_MS, r.poll_interval_ms
            ));
        }
        if r.max_poll_attempts == 0 || r.max_poll_attempts > MAX_POLL_ATTEMPTS {
            return Err(format!(
                "run.max_poll_attempts must be in 1..={} (got {})",
                MAX_POLL_ATTEMPTS, r.max_poll_attempts
            ));
        }
        if self.run.history_limit == 0 {
            return Err("run.history_limit must be greater than 0".to_string());
        }

        let b = &self.board.grade_bands;
        if b.s > 100 {
            return Err(format!("board.grade_bands.s must be <= 100 (got {})", b.s));
        }
        if !(b.s > b.a && b.a > b.b && b.b > b.c && b.c > b.d) {
            return Err(format!(
                "board.grade_bands must be strictly decreasing (s={} a={} b={} c={} d={})",
                b.s, b.a, b.b, b.c, b.d
            ));
        }
        if self.board.weak_threshold > 100 {
            return Err(format!(
                "board.weak_threshold must be <= 100 (got {})",
                self.board.weak_threshold
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg = QuantaConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg, QuantaConfig::default());
        assert_eq!(cfg.run.staleness_window_secs, 600);
        assert_eq!(cfg.run.poll_ceiling(), Duration::from_secs(180));
        assert_eq!(cfg.board.grade_bands.b, 70);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let cfg = QuantaConfig::from_yaml_str(
            "run:\n  poll_interval_ms: 500\nboard:\n  weak_threshold: 65\n",
        )
        .unwrap();
        assert_eq!(cfg.run.poll_interval_ms, 500);
        assert_eq!(cfg.run.max_poll_attempts, 90);
        assert_eq!(cfg.board.weak_threshold, 65);
        assert_eq!(cfg.board.short_form_max_secs, 60);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = QuantaConfig::from_yaml_str("run:\n  poll_every: 3\n").unwrap_err();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn non_monotonic_bands_fail_validation() {
        let err = QuantaConfig::from_yaml_str("board:\n  grade_bands:\n    a: 95\n").unwrap_err();
        assert!(err.to_string().contains("strictly decreasing"));
    }

    #[test]
    fn zero_poll_attempts_fail_validation() {
        let err = QuantaConfig::from_yaml_str("run:\n  max_poll_attempts: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_poll_attempts"));
    }

    #[test]
    fn oversized_run_bounds_fail_validation() {
        let yaml = "run:\n  staleness_window_secs: 18446744073709551615\n";
        let err = QuantaConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("staleness_window_secs"), "{}", err);

        let err = QuantaConfig::from_yaml_str("run:\n  poll_interval_ms: 86400000\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"), "{}", err);

        let yaml = "run:\n  max_poll_attempts: 4294967295\n";
        let err = QuantaConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("max_poll_attempts"), "{}", err);
    }

    #[test]
    fn unvalidated_extremes_saturate_instead_of_panicking() {
        let run = RunSettings {
            staleness_window_secs: u64::MAX,
            poll_interval_ms: u64::MAX,
            max_poll_attempts: u32::MAX,
            ..RunSettings::default()
        };
        assert_eq!(run.staleness_window(), chrono::Duration::MAX);
        assert_eq!(run.poll_ceiling(), Duration::MAX);

        let run = RunSettings {
            staleness_window_secs: i64::MAX as u64,
            ..RunSettings::default()
        };
        assert_eq!(run.staleness_window(), chrono::Duration::MAX);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = QuantaConfig::load_or_default(&dir.path().join("quanta.yaml")).unwrap();
        assert_eq!(cfg, QuantaConfig::default());
    }
}
