//! Data logging of the controller model outputs
//!
//! [`TellTale`] records the model outputs at every base step, optionally decimated,
//! and dumps them into a pickle file when the logging stops.

use crate::{io::Signal, DisconError};
use std::{collections::BTreeMap, fmt, fs::File, path::PathBuf};

#[derive(Debug, PartialEq)]
pub enum TellTaleError {
    Step,
    NotStarted,
    Key(Signal),
    Size { expected: usize, found: usize },
    Full(usize),
}
impl fmt::Display for TellTaleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TellTaleError::*;
        match self {
            Step => write!(f, "failed to step the data logger"),
            NotStarted => write!(f, "data logging has not been started"),
            Key(key) => write!(f, "{} is not a model output", key),
            Size { expected, found } => write!(
                f,
                "expected at least {} outputs, found {}",
                expected, found
            ),
            Full(n) => write!(f, "data logging buffer is full ({} samples)", n),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<TellTaleError>>;

/// Data logging interface of the scheduler
pub trait DataLog {
    /// Starts logging the outputs `keys` of a model stepping at `step_size`
    fn start(&mut self, step_size: f64, keys: &[Signal]) -> Result<()>;
    /// Logs the output vector `y` at `time`
    fn update(&mut self, time: f64, y: &[f64]) -> Result<()>;
    /// Stops logging
    fn stop(&mut self) -> Result<()>;
}

pub type TimeSeries = Vec<(f64, f64)>;

pub struct TellTale {
    pub sampling_rate: f64,
    pub keys: Vec<Signal>,
    pub entries: BTreeMap<usize, (f64, Vec<f64>)>,
    columns: Option<Vec<usize>>,
    index: Option<usize>,
    decimation: usize,
    max_samples: Option<usize>,
    pickle: Option<PathBuf>,
}
impl TellTale {
    pub fn step(&mut self) -> Result<&mut Self>
    where
        Self: Sized + Iterator,
    {
        self.next()
            .and(Some(self))
            .ok_or_else(|| DisconError::Component(TellTaleError::Step))
    }
    /// Returns the time series of the output `key`
    pub fn time_series(&self, key: Signal) -> Option<TimeSeries> {
        let k = self.keys.iter().position(|x| *x == key)?;
        Some(
            self.entries
                .values()
                .map(|(time, data)| (*time, data[k]))
                .collect(),
        )
    }
    /// Number of recorded samples
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Returns true once [`DataLog::start`] has been called
    pub fn is_started(&self) -> bool {
        self.columns.is_some()
    }
}
impl Iterator for TellTale {
    type Item = ();
    fn next(&mut self) -> Option<Self::Item> {
        self.index = self.index.map_or(Some(0), |x| Some(x + 1));
        Some(())
    }
}
impl DataLog for TellTale {
    fn start(&mut self, step_size: f64, keys: &[Signal]) -> Result<()> {
        self.sampling_rate = step_size.recip();
        if self.keys.is_empty() {
            self.keys = keys.to_vec();
        }
        let columns = self
            .keys
            .iter()
            .map(|key| {
                keys.iter()
                    .position(|x| x == key)
                    .ok_or(DisconError::Component(TellTaleError::Key(*key)))
            })
            .collect::<Result<Vec<usize>>>()?;
        self.columns = Some(columns);
        self.entries.clear();
        self.index = None;
        log::debug!(
            "data logging of {} outputs at {}Hz",
            self.keys.len(),
            self.sampling_rate
        );
        Ok(())
    }
    fn update(&mut self, time: f64, y: &[f64]) -> Result<()> {
        let i = self.step()?.index.unwrap_or_default();
        if i % self.decimation > 0 {
            return Ok(());
        }
        if let Some(n) = self.max_samples {
            if self.entries.len() >= n {
                return Err(DisconError::Component(TellTaleError::Full(n)));
            }
        }
        let columns = self
            .columns
            .as_ref()
            .ok_or(DisconError::Component(TellTaleError::NotStarted))?;
        let data = columns
            .iter()
            .map(|&c| {
                y.get(c).copied().ok_or(DisconError::Component(TellTaleError::Size {
                    expected: c + 1,
                    found: y.len(),
                }))
            })
            .collect::<Result<Vec<f64>>>()?;
        self.entries.insert(i, (time, data));
        Ok(())
    }
    fn stop(&mut self) -> Result<()> {
        if let Some(path) = &self.pickle {
            let data: Vec<(String, TimeSeries)> = self
                .keys
                .iter()
                .filter_map(|&key| self.time_series(key).map(|ts| (key.to_string(), ts)))
                .collect();
            let mut file = File::create(path)?;
            serde_pickle::to_writer(&mut file, &data, true)?;
            log::info!("data logging saved to {:?}", path);
        }
        Ok(())
    }
}

/// [`TellTale`] builder
pub struct DataLogging {
    pub keys: Vec<Signal>,
    pub decimation: usize,
    pub max_samples: Option<usize>,
    pub pickle: Option<PathBuf>,
}
impl Default for DataLogging {
    fn default() -> Self {
        Self::new()
    }
}
impl DataLogging {
    pub fn new() -> Self {
        Self {
            keys: vec![],
            decimation: 1,
            max_samples: None,
            pickle: None,
        }
    }
    /// Adds an output to the log, all outputs are logged if none is given
    pub fn key(self, key: Signal) -> Self {
        let mut keys = self.keys;
        keys.push(key);
        Self { keys, ..self }
    }
    /// Logs one sample every `decimation` steps
    pub fn decimation(self, decimation: usize) -> Self {
        Self {
            decimation: decimation.max(1),
            ..self
        }
    }
    /// Limits the number of recorded samples
    pub fn max_samples(self, max_samples: usize) -> Self {
        Self {
            max_samples: Some(max_samples),
            ..self
        }
    }
    /// Saves the log into a pickle file when stopping
    pub fn pickle<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            pickle: Some(path.into()),
            ..self
        }
    }
    pub fn build(self) -> TellTale {
        TellTale {
            sampling_rate: 1f64,
            keys: self.keys,
            entries: BTreeMap::new(),
            columns: None,
            index: None,
            decimation: self.decimation,
            max_samples: self.max_samples,
            pickle: self.pickle,
        }
    }
}
