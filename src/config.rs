//! Controller configuration
//!
//! The configuration selects the exchange buffer layout, the tasking mode,
//! the user parameter file and the data logging.
//! It is loaded from a pickle file whose path is given by the environment variable
//! [`DISCON_CONFIG`], the default configuration being used if the variable is not set.

use crate::{scheduler::Tasking, DisconError};
use serde::{Deserialize, Serialize};
use serde_pickle as pickle;
use std::{env, fmt, fs::File, io::BufReader, path::Path, path::PathBuf};

/// Environment variable with the path to the configuration file
pub const DISCON_CONFIG: &str = "DISCON_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    LogLevel(String),
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::LogLevel(level) => write!(f, "unknown log level: {}", level),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<ConfigError>>;

/// Loads the configuration at the first host call
pub type ConfigLoader = fn() -> Result<DisconConfig>;

/// Exchange buffer layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Core turbine measurements and demands
    Standard,
    /// Standard layout with user variables, logging channels and yaw control
    Extended,
}

/// Origin of the user parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterSource {
    None,
    File(PathBuf),
    /// The file named by the host in `accInfile`
    HostInfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconConfig {
    pub layout: Layout,
    pub tasking: Tasking,
    pub parameters: ParameterSource,
    /// Pickle file the data log is written into at shutdown
    pub telltale: Option<PathBuf>,
    pub max_log_samples: Option<usize>,
    pub log_level: String,
}
impl Default for DisconConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Extended,
            tasking: Tasking::SingleTasking,
            parameters: ParameterSource::File(PathBuf::from("discon.in")),
            telltale: None,
            max_log_samples: None,
            log_level: "info".to_string(),
        }
    }
}
impl DisconConfig {
    /// Loads the configuration from a pickle file
    pub fn from_pickle<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        let r = BufReader::with_capacity(1_000_000, f);
        let v: serde_pickle::Value = serde_pickle::from_reader(r)?;
        Ok(pickle::from_value(v)?)
    }
    /// Loads the configuration from the file given by [`DISCON_CONFIG`]
    pub fn from_env() -> Result<Self> {
        match env::var_os(DISCON_CONFIG) {
            Some(path) => {
                let config = Self::from_pickle(&path)?;
                log::info!("configuration loaded from {:?}", path);
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
    /// Saves the configuration into a pickle file
    pub fn to_pickle<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut f = File::create(path)?;
        pickle::to_writer(&mut f, self, true)?;
        Ok(())
    }
    pub fn layout(self, layout: Layout) -> Self {
        Self { layout, ..self }
    }
    pub fn tasking(self, tasking: Tasking) -> Self {
        Self { tasking, ..self }
    }
    pub fn parameters(self, parameters: ParameterSource) -> Self {
        Self { parameters, ..self }
    }
    pub fn telltale<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            telltale: Some(path.into()),
            ..self
        }
    }
    pub fn max_log_samples(self, max_log_samples: usize) -> Self {
        Self {
            max_log_samples: Some(max_log_samples),
            ..self
        }
    }
    pub fn log_level<S: Into<String>>(self, log_level: S) -> Self {
        Self {
            log_level: log_level.into(),
            ..self
        }
    }
    /// Parses the log level
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| DisconError::Component(ConfigError::LogLevel(self.log_level.clone())))
    }
    /// Installs the logger, an already installed logger is kept
    pub fn init_logging(&self) {
        let level = self.level_filter().unwrap_or_else(|e| {
            eprintln!("{}, using info", e);
            log::LevelFilter::Info
        });
        if simple_logger::SimpleLogger::new()
            .with_level(level)
            .init()
            .is_err()
        {
            log::debug!("logger already installed");
        }
    }
}
