//! Runtime settings, merged from defaults, an optional TOML file and
//! `WEATHER_ETL_*` environment variables. CLI flags are applied last by the
//! binary through [`EtlConfig::apply_overrides`].

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{EtlError, Result};
use crate::mapping::{FormatRegistry, SourceFormat};
use crate::store::DuplicatePolicy;
use crate::utils::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONFIG_FILE, DEFAULT_DATABASE, DEFAULT_DATA_DIR, ENV_PREFIX,
    PROCESSED_DIR,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EtlConfig {
    pub database: PathBuf,

    pub data_dir: PathBuf,

    /// Defaults to `<data_dir>/processed`.
    #[serde(default)]
    pub processed_dir: Option<PathBuf>,

    #[validate(range(min = 1))]
    pub batch_size: usize,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Extra source formats, tried after the built-in ones.
    #[serde(default)]
    #[validate(nested)]
    pub formats: Vec<SourceFormat>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            processed_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_policy: DuplicatePolicy::default(),
            formats: Vec::new(),
        }
    }
}

/// Command-line values that win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<PathBuf>,
    pub processed_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub duplicate_policy: Option<DuplicatePolicy>,
}

impl EtlConfig {
    /// Load from `path`, or from `weather-etl.toml` in the working directory
    /// when it exists. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("database", DEFAULT_DATABASE)?
            .set_default("data_dir", DEFAULT_DATA_DIR)?
            .set_default("batch_size", DEFAULT_BATCH_SIZE as u64)?
            .set_default("duplicate_policy", "append")?;

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(EtlError::Config(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                let default_file = Path::new(DEFAULT_CONFIG_FILE);
                builder = builder.add_source(
                    File::from(default_file)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let settings: EtlConfig = builder.add_source(env).build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(database) = overrides.database {
            self.database = database;
        }
        if let Some(processed_dir) = overrides.processed_dir {
            self.processed_dir = Some(processed_dir);
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(policy) = overrides.duplicate_policy {
            self.duplicate_policy = policy;
        }
        self.check()
    }

    /// Derive rules plus the structural checks each extra format needs.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.registry()?;
        Ok(())
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(PROCESSED_DIR))
    }

    pub fn registry(&self) -> Result<FormatRegistry> {
        FormatRegistry::builtin().with_formats(self.formats.clone())
    }
}
