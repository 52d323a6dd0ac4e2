use anyhow::{Result, bail};
use job_manager::Signal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::MAX_SIGNAL;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config file / env vars)
// =============================================================================
//
//   hq.toml:     prompt = "hq> "
//                [log]
//                filter = "hq=debug"
//
//   env var:     HQ_LOG__FILTER=hq=debug   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Signal number used by `cleanup` and at end of input
    #[serde(default = "default_cleanup_signal")]
    pub cleanup_signal: i32,
    /// How long jobs get to exit after a non-KILL cleanup signal
    #[serde(default = "default_cleanup_grace_ms")]
    pub cleanup_grace_ms: u64,
    #[serde(default)]
    pub log: LogFileConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            cleanup_signal: default_cleanup_signal(),
            cleanup_grace_ms: default_cleanup_grace_ms(),
            log: LogFileConfig::default(),
        }
    }
}

/// Logging tunables (lives under `[log]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// tracing filter directive, e.g. `hq=debug,job_manager=info`
    #[serde(default)]
    pub filter: Option<String>,
    /// Append logs here instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_prompt() -> String {
    "> ".to_string()
}
fn default_cleanup_signal() -> i32 {
    9
}
fn default_cleanup_grace_ms() -> u64 {
    500
}

/// Build a figment that layers: defaults → config file → HQ_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `HQ_LOG__FILTER=debug`  →  `log.filter = "debug"`
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("HQ_").split("__"))
}

// =============================================================================
// Runtime config (validated view of FileConfig)
// =============================================================================

/// How the session terminates leftover jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownConfig {
    pub signal: Signal,
    pub grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signal: Signal::SIGKILL,
            grace: Duration::from_millis(default_cleanup_grace_ms()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HqConfig {
    /// `None` when prompting is disabled
    pub prompt: Option<String>,
    pub shutdown: ShutdownConfig,
    pub log_filter: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl HqConfig {
    pub fn from_file(fc: &FileConfig, no_prompt: bool) -> Result<Self> {
        if !(1..=MAX_SIGNAL).contains(&fc.cleanup_signal) {
            bail!(
                "cleanup_signal must be between 1 and {}, got {}",
                MAX_SIGNAL,
                fc.cleanup_signal
            );
        }
        let signal = match Signal::try_from(fc.cleanup_signal) {
            Ok(signal) => signal,
            Err(e) => bail!("cleanup_signal {} is not usable: {}", fc.cleanup_signal, e),
        };

        Ok(Self {
            prompt: if no_prompt {
                None
            } else {
                Some(fc.prompt.clone())
            },
            shutdown: ShutdownConfig {
                signal,
                grace: Duration::from_millis(fc.cleanup_grace_ms),
            },
            log_filter: fc.log.filter.clone(),
            log_file: fc.log.file.clone(),
        })
    }
}
