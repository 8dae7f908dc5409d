//! Configuration surface: constructor parameters plus the process-wide
//! defaults read once from the environment (spec §6, §9 "Process-wide
//! defaults").

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

/// Immutable configuration for a capture's lifetime.
///
/// `output`/`is_tty` are not part of `Config` (see [`crate::Profiler`])
/// since a byte sink is not `Clone`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub stall_threshold: Duration,
    pub filter_threshold: Duration,
    pub track_calls: bool,
    pub sample_rate: f64,
}

impl Config {
    /// Builds a config from explicit values, clamping `sample_rate` into
    /// `(0, 1]` and filling in the default `filter_threshold` (0.1x
    /// `stall_threshold`) when not set explicitly via [`ConfigBuilder`].
    pub fn new(stall_threshold: Duration) -> Self {
        Self {
            stall_threshold,
            filter_threshold: stall_threshold.mul_f64(0.1),
            track_calls: true,
            sample_rate: 1.0,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reads `FIBER_PROFILER_CAPTURE*` environment variables, falling back
    /// to the defaults in spec §6's table for anything unset or unparsable.
    pub fn from_env() -> Self {
        defaults().clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Duration::from_secs_f64(0.01))
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    stall_threshold: Option<Duration>,
    filter_threshold: Option<Duration>,
    track_calls: Option<bool>,
    sample_rate: Option<f64>,
}

impl ConfigBuilder {
    pub fn stall_threshold(mut self, v: Duration) -> Self {
        self.stall_threshold = Some(v);
        self
    }

    pub fn filter_threshold(mut self, v: Duration) -> Self {
        self.filter_threshold = Some(v);
        self
    }

    pub fn track_calls(mut self, v: bool) -> Self {
        self.track_calls = Some(v);
        self
    }

    pub fn sample_rate(mut self, v: f64) -> Self {
        self.sample_rate = Some(v.clamp(f64::MIN_POSITIVE, 1.0));
        self
    }

    pub fn build(self) -> Config {
        let stall_threshold = self.stall_threshold.unwrap_or(Duration::from_secs_f64(0.01));
        let filter_threshold = self
            .filter_threshold
            .unwrap_or_else(|| stall_threshold.mul_f64(0.1));
        Config {
            stall_threshold,
            filter_threshold,
            track_calls: self.track_calls.unwrap_or(true),
            sample_rate: self.sample_rate.unwrap_or(1.0),
        }
    }
}

/// Whether [`crate::Profiler::default`] should return a live capture at all.
pub fn capture_enabled() -> bool {
    env_bool("FIBER_PROFILER_CAPTURE").unwrap_or(false)
}

fn defaults() -> &'static Config {
    static DEFAULTS: OnceLock<Config> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        let stall_threshold = env_secs("FIBER_PROFILER_CAPTURE_STALL_THRESHOLD")
            .unwrap_or(Duration::from_secs_f64(0.01));
        let filter_threshold = env_secs("FIBER_PROFILER_CAPTURE_FILTER_THRESHOLD")
            .unwrap_or_else(|| stall_threshold.mul_f64(0.1));
        let track_calls = env_bool("FIBER_PROFILER_CAPTURE_TRACK_CALLS").unwrap_or(true);
        let sample_rate = env::var("FIBER_PROFILER_CAPTURE_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| v.clamp(f64::MIN_POSITIVE, 1.0))
            .unwrap_or(1.0);

        Config {
            stall_threshold,
            filter_threshold,
            track_calls,
            sample_rate,
        }
    })
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key).ok()?.parse::<f64>().ok().map(Duration::from_secs_f64)
}

fn env_bool(key: &str) -> Option<bool> {
    match env::var(key).ok()?.as_str() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    }
}
