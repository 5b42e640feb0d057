use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use comfygen_comfyui::client::ws_url_from_api_url;
use comfygen_core::CleanupMode;
use comfygen_pipeline::context::{DEFAULT_JOB_TIMEOUT, DEFAULT_READ_TIMEOUT};
use comfygen_pipeline::JobSettings;

/// Log line format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
///
/// Every field has a default suitable for a single-host setup where the
/// engine and the consumer run next to the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub comfyui_url: String,
    pub comfyui_ws_url: String,
    pub consumer_url: String,
    pub lora_catalog_path: PathBuf,
    pub output_dirs: Vec<PathBuf>,
    pub reference_image_dir: PathBuf,
    pub cleanup_mode: CleanupMode,
    pub job_timeout: Duration,
    pub read_timeout: Duration,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                    |
    /// |----------------------|----------------------------|
    /// | `COMFYUI_URL`        | `http://127.0.0.1:8188`    |
    /// | `COMFYUI_WS_URL`     | derived from `COMFYUI_URL` |
    /// | `CONSUMER_URL`       | `http://127.0.0.1:8090`    |
    /// | `LORA_CATALOG_PATH`  | `config/lora.json`         |
    /// | `OUTPUT_DIRS`        | `output` (comma-separated) |
    /// | `REFERENCE_IMAGE_DIR`| `output`                   |
    /// | `CLEANUP_MODE`       | `conservative`             |
    /// | `JOB_TIMEOUT_SECS`   | `600`                      |
    /// | `READ_TIMEOUT_SECS`  | `5`                        |
    /// | `LOG_FORMAT`         | `text`                     |
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let comfyui_url = var("COMFYUI_URL", "http://127.0.0.1:8188");
        let comfyui_ws_url = lookup("COMFYUI_WS_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| ws_url_from_api_url(&comfyui_url));

        let output_dirs: Vec<PathBuf> = var("OUTPUT_DIRS", "output")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        Self {
            consumer_url: var("CONSUMER_URL", "http://127.0.0.1:8090"),
            lora_catalog_path: PathBuf::from(var("LORA_CATALOG_PATH", "config/lora.json")),
            output_dirs,
            reference_image_dir: PathBuf::from(var("REFERENCE_IMAGE_DIR", "output")),
            cleanup_mode: parse_or_default(&lookup, "CLEANUP_MODE", CleanupMode::default()),
            job_timeout: secs_or_default(&lookup, "JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT),
            read_timeout: secs_or_default(&lookup, "READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT),
            log_format: parse_or_default(&lookup, "LOG_FORMAT", LogFormat::default()),
            comfyui_url,
            comfyui_ws_url,
        }
    }

    /// Per-job tunables derived from this configuration.
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            job_timeout: self.job_timeout,
            read_timeout: self.read_timeout,
            output_dirs: self.output_dirs.clone(),
            reference_dir: self.reference_image_dir.clone(),
            cleanup_mode: self.cleanup_mode,
        }
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid configuration value, using default");
            default
        }
    }
}

fn secs_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    match parse_or_default::<u64>(lookup, key, default.as_secs()) {
        0 => {
            tracing::warn!(key, "Timeout must be positive, using default");
            default
        }
        secs => Duration::from_secs(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> WorkerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.comfyui_url, "http://127.0.0.1:8188");
        assert_eq!(c.comfyui_ws_url, "ws://127.0.0.1:8188");
        assert_eq!(c.consumer_url, "http://127.0.0.1:8090");
        assert_eq!(c.output_dirs, [PathBuf::from("output")]);
        assert_eq!(c.cleanup_mode, CleanupMode::Conservative);
        assert_eq!(c.job_timeout, Duration::from_secs(600));
        assert_eq!(c.read_timeout, Duration::from_secs(5));
        assert_eq!(c.log_format, LogFormat::Text);
    }

    #[test]
    fn ws_url_follows_https_engine() {
        let c = config(&[("COMFYUI_URL", "https://gpu.example:8188/")]);
        assert_eq!(c.comfyui_ws_url, "wss://gpu.example:8188");
    }

    #[test]
    fn explicit_values_win() {
        let c = config(&[
            ("COMFYUI_WS_URL", "ws://other:9000"),
            ("OUTPUT_DIRS", "output, ComfyUI/output ,"),
            ("CLEANUP_MODE", "Aggressive"),
            ("JOB_TIMEOUT_SECS", "30"),
            ("LOG_FORMAT", "json"),
        ]);
        assert_eq!(c.comfyui_ws_url, "ws://other:9000");
        assert_eq!(
            c.output_dirs,
            [PathBuf::from("output"), PathBuf::from("ComfyUI/output")]
        );
        assert_eq!(c.cleanup_mode, CleanupMode::Aggressive);
        assert_eq!(c.job_settings().job_timeout, Duration::from_secs(30));
        assert_eq!(c.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_fall_back() {
        let c = config(&[
            ("CLEANUP_MODE", "everything"),
            ("JOB_TIMEOUT_SECS", "soon"),
            ("READ_TIMEOUT_SECS", "0"),
            ("LOG_FORMAT", "xml"),
        ]);
        assert_eq!(c.cleanup_mode, CleanupMode::Conservative);
        assert_eq!(c.job_timeout, DEFAULT_JOB_TIMEOUT);
        assert_eq!(c.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(c.log_format, LogFormat::Text);
    }
}
