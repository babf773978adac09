use anyhow::{bail, Context, Result};
use config::{Config as RConfig, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::constants::ENV_PREFIX;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    pub endpoint_url: String,
    pub location_id: String,
    pub store_path: PathBuf,
    /// Card reader line device, FIFO or file; `-` for stdin
    pub reader_path: String,

    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub link_probe_interval_ms: u64,
    pub link_probe_timeout_ms: u64,
    pub reconcile_interval_ms: u64,
    pub scan_debounce_ms: u64,
    pub queue_capacity: u64,

    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(self.endpoint_url.trim())
            .with_context(|| format!("invalid endpoint_url {:?}", self.endpoint_url))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => bail!("endpoint_url must be http or https, got {:?}", other),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn link_probe_interval(&self) -> Duration {
        Duration::from_millis(self.link_probe_interval_ms)
    }

    pub fn link_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.link_probe_timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }

    pub fn queue_capacity(&self) -> usize {
        usize::try_from(self.queue_capacity).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        if self.location_id.trim().is_empty() {
            bail!("location_id must not be empty");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }

        let timeouts = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("link_probe_interval_ms", self.link_probe_interval_ms),
            ("link_probe_timeout_ms", self.link_probe_timeout_ms),
            ("reconcile_interval_ms", self.reconcile_interval_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_default_config() -> Result<Config> {
        Self::load(None)
    }

    /// Built-in defaults, then the optional TOML file, then `SCANRELAY_*`
    /// environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Config> {
        let defaults = Config::default();
        let mut builder = RConfig::builder();

        // set defaults
        builder = builder
            .set_default("endpoint_url", defaults.endpoint_url)?
            .set_default("location_id", defaults.location_id)?
            .set_default(
                "store_path",
                defaults.store_path.to_string_lossy().into_owned(),
            )?
            .set_default("reader_path", defaults.reader_path)?
            .set_default("request_timeout_ms", defaults.request_timeout_ms)?
            .set_default("connect_timeout_ms", defaults.connect_timeout_ms)?
            .set_default("link_probe_interval_ms", defaults.link_probe_interval_ms)?
            .set_default("link_probe_timeout_ms", defaults.link_probe_timeout_ms)?
            .set_default("reconcile_interval_ms", defaults.reconcile_interval_ms)?
            .set_default("scan_debounce_ms", defaults.scan_debounce_ms)?
            .set_default("queue_capacity", defaults.queue_capacity)?
            .set_default("log_dir", defaults.log_dir.to_string_lossy().into_owned())?
            .set_default("log_level", defaults.log_level)?;

        if let Some(path) = config_file {
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Config = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }
}
