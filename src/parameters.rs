//! User parameter file
//!
//! The file holds one number per line, the first 20 lines feeding the user variables
//! `userVar1` to `userVar20`.
//! Only the leading number of a line is read, so a line may carry a trailing comment;
//! a line without a leading number reads as 0.

use crate::{io::Signal, DisconError};
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

/// Maximum number of parameters
pub const N_PARAMETERS: usize = 20;

#[derive(Debug, PartialEq)]
pub enum ParameterError {
    NotFound(PathBuf),
}
impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterError::NotFound(path) => write!(f, "parameter file {:?} not found", path),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<ParameterError>>;

/// Parses the longest numeric prefix of `line`
fn leading_number(line: &str) -> f32 {
    let line = line.trim_start();
    let end = line
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    (1..=end)
        .rev()
        .find_map(|n| line[..n].parse::<f32>().ok())
        .unwrap_or(0f32)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Vec<f32>,
}
impl Parameters {
    /// Reads the parameters from a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DisconError::Component(ParameterError::NotFound(path.to_path_buf()))
            }
            _ => e.into(),
        })?;
        let this = Self::from_reader(BufReader::new(file))?;
        log::info!("{} user parameters read from {:?}", this.len(), path);
        Ok(this)
    }
    /// Reads the parameters from a reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let values = reader
            .lines()
            .take(N_PARAMETERS)
            .map(|line| line.map(|l| leading_number(&l)))
            .collect::<std::io::Result<Vec<f32>>>()?;
        Ok(Self { values })
    }
    pub fn values(&self) -> &[f32] {
        &self.values
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    /// Pairs each parameter with its user variable
    pub fn user_variables(&self) -> impl Iterator<Item = (Signal, f32)> + '_ {
        Signal::USER_VARIABLES
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn leading_numbers() {
        assert_eq!(leading_number("  1.5"), 1.5);
        assert_eq!(leading_number("-2e3 ! gain"), -2000.0);
        assert_eq!(leading_number("7 ; 8"), 7.0);
        assert_eq!(leading_number("3.25e"), 3.25);
        assert_eq!(leading_number("gain"), 0.0);
        assert_eq!(leading_number(""), 0.0);
    }

    #[test]
    fn at_most_twenty() {
        let text: String = (1..=25).map(|i| format!("{}\n", i)).collect();
        let parameters = Parameters::from_reader(text.as_bytes()).unwrap();
        assert_eq!(parameters.len(), N_PARAMETERS);
        let vars: Vec<(Signal, f32)> = parameters.user_variables().collect();
        assert_eq!(vars[0], (Signal::UserVar1, 1.0));
        assert_eq!(vars[19], (Signal::UserVar20, 20.0));
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.5 rated torque gain").unwrap();
        writeln!(file, "x").unwrap();
        writeln!(file, "12").unwrap();
        let parameters = Parameters::from_path(file.path()).unwrap();
        assert_eq!(parameters.values().to_vec(), vec![0.5f32, 0.0, 12.0]);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discon.in");
        assert_eq!(
            Parameters::from_path(&path).unwrap_err().to_string(),
            format!("parameter file {:?} not found", path)
        );
    }
}
