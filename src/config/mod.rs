//! Typed configuration from environment variables and TOML.
//!
//! Loads once at startup and fails fast on malformed values. Everything is
//! optional: unset variables fall back to the [`Options`] defaults.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::Options;
use crate::telemetry::TelemetryConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Engine options every call starts from.
    pub options: Options,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("FANMAP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            options: options_from_lookup(&lookup)?,
        })
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: self.otel_endpoint.clone(),
            default_filter: self.log_level.clone(),
            ..TelemetryConfig::default()
        }
    }
}

impl Options {
    /// Options from `FANMAP_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        options_from_lookup(&|name: &str| std::env::var(name).ok())
    }

    /// Parse options from TOML. Missing fields keep their defaults.
    ///
    /// ```toml
    /// concurrency = 8
    /// limit = 100
    /// remove_zero_values = false
    ///
    /// [jitter]
    /// min = 1
    /// max = 5
    /// unit_ms = 10
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let opts: Options = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad options toml: {e}")))?;
        Ok(opts.sanitized())
    }

    /// Read and parse a TOML options file.
    pub fn load_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }
}

fn options_from_lookup<L>(lookup: &L) -> Result<Options>
where
    L: Fn(&str) -> Option<String>,
{
    let mut opts = Options::default();

    if let Some(n) = parsed::<usize, _>(lookup, "FANMAP_CONCURRENCY")? {
        opts = opts.concurrency(n);
    }
    if let Some(n) = parsed::<usize, _>(lookup, "FANMAP_LIMIT")? {
        opts = opts.limit(n);
    }
    if let Some(remove) = parsed::<bool, _>(lookup, "FANMAP_REMOVE_ZERO_VALUES")? {
        opts = opts.remove_zero_values(remove);
    }

    let min = parsed::<u64, _>(lookup, "FANMAP_JITTER_MIN")?;
    let max = parsed::<u64, _>(lookup, "FANMAP_JITTER_MAX")?;
    let unit_ms = parsed::<u64, _>(lookup, "FANMAP_JITTER_UNIT_MS")?;
    match (min, max, unit_ms) {
        (None, None, None) => {}
        (min, Some(max), Some(unit_ms)) => {
            opts = opts.jitter(min.unwrap_or(0), max, Duration::from_millis(unit_ms));
        }
        _ => {
            return Err(Error::Config(
                "FANMAP_JITTER_MAX and FANMAP_JITTER_UNIT_MS must be set together".to_string(),
            ));
        }
    }

    Ok(opts)
}

fn parsed<V, L>(lookup: &L, name: &str) -> Result<Option<V>>
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<V>()
                .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}")))
        })
        .transpose()
}
