//! Exchange buffer adapter
//!
//! Binds a [`SwapSchema`] to the inputs and outputs of a controller model:
//! records are copied into the model input vector before a step and the model outputs
//! are copied into the held demands after it.
//! The held demands and the constant records are written back to the exchange buffer at
//! every call.

use crate::{
    io::Signal,
    swap::{Cell, Direction, SwapError, SwapSchema, LOG_COUNT, MAX_RECORDS},
    DisconError, IOTags,
};

type Result<T> = std::result::Result<T, DisconError<SwapError>>;

#[derive(Debug, Clone)]
struct Demand {
    signal: Signal,
    /// index in the model output vector
    output: usize,
    record: usize,
    value: f32,
}

#[derive(Debug, Clone)]
pub struct Adapter {
    u_tags: Vec<Signal>,
    /// (record, index in the model input vector)
    inputs: Vec<(usize, usize)>,
    overrides: Vec<(usize, f32)>,
    demands: Vec<Demand>,
    seeds: Vec<(usize, usize)>,
    constants: Vec<(usize, f32)>,
    n_log: Option<usize>,
    log_names: String,
    required_len: usize,
}
impl Adapter {
    /// Resolves the `schema` against the model inputs and outputs
    ///
    /// `first_log` is the 0-based record of the first logging channel, if any
    pub fn new<M: IOTags>(schema: &SwapSchema, model: &M, first_log: Option<usize>) -> Result<Self> {
        schema.validate()?;
        let u_tags = model.inputs_tags();
        let y_tags = model.outputs_tags();
        let mut inputs = vec![];
        let mut demands: Vec<Demand> = vec![];
        let mut logs: Vec<(Signal, usize, usize)> = vec![];
        for field in schema.fields() {
            match (field.direction, field.cell) {
                (Direction::Input, Cell::Record(record)) => {
                    match u_tags.iter().position(|x| *x == field.signal) {
                        Some(k) => inputs.push((record, k)),
                        None => log::warn!(
                            "{} is not a model input, record {} is ignored",
                            field.signal,
                            record
                        ),
                    }
                }
                (Direction::Output, cell) => {
                    let output = match y_tags.iter().position(|x| *x == field.signal) {
                        Some(output) => output,
                        None if schema.is_mandatory(field.signal) => {
                            return Err(DisconError::Component(SwapError::MissingOutput(
                                field.signal,
                            )))
                        }
                        None => {
                            log::warn!("{} is not a model output", field.signal);
                            continue;
                        }
                    };
                    match cell {
                        Cell::Record(record) => demands.push(Demand {
                            signal: field.signal,
                            output,
                            record,
                            value: 0f32,
                        }),
                        Cell::Log(k) => {
                            if let Some(first) = first_log {
                                logs.push((field.signal, output, first + k));
                            }
                        }
                    }
                }
                (Direction::Input, Cell::Log(_)) => {
                    return Err(DisconError::Component(SwapError::Direction(field.signal)))
                }
            }
        }
        for signal in u_tags
            .iter()
            .filter(|s| schema.input_record(**s).is_none())
        {
            log::warn!("model input {} is not fed by the exchange buffer", signal);
        }
        if let Some(first) = first_log.filter(|&first| first + Signal::LOGS.len() > MAX_RECORDS) {
            return Err(DisconError::Component(SwapError::OutOfRange(first, MAX_RECORDS)));
        }
        let constants = schema.constants().to_vec();
        for &(signal, _, record) in &logs {
            if demands.iter().any(|d| d.record == record)
                || constants.iter().any(|(r, _)| *r == record)
                || schema
                    .fields()
                    .iter()
                    .any(|f| f.direction == Direction::Input && f.cell == Cell::Record(record))
                || record == LOG_COUNT
            {
                return Err(DisconError::Component(SwapError::LogOverlap(signal, record)));
            }
        }
        let log_names: String = logs
            .iter()
            .map(|(signal, _, _)| format!("{}:-;", signal))
            .collect();
        let n_log = if schema.has_logs() {
            Some(logs.len())
        } else {
            None
        };
        demands.extend(logs.into_iter().map(|(signal, output, record)| Demand {
            signal,
            output,
            record,
            value: 0f32,
        }));
        let seeds = schema
            .seeds()
            .iter()
            .filter_map(|(output, input)| {
                let d = demands.iter().position(|d| d.signal == *output)?;
                let record = schema.input_record(*input)?;
                Some((d, record))
            })
            .collect();
        let required_len = demands
            .iter()
            .map(|d| d.record + 1)
            .chain(std::iter::once(schema.required_len()))
            .max()
            .unwrap_or_default();
        log::debug!(
            "exchange buffer: {} inputs, {} outputs, {} records",
            inputs.len(),
            demands.len(),
            required_len
        );
        Ok(Self {
            u_tags,
            inputs,
            overrides: vec![],
            demands,
            seeds,
            constants,
            n_log,
            log_names,
            required_len,
        })
    }
    /// Minimum length of the exchange buffer
    pub fn required_len(&self) -> usize {
        self.required_len
    }
    fn check_len(&self, swap: &[f32]) -> Result<()> {
        if swap.len() < self.required_len {
            Err(DisconError::Component(SwapError::TooShort {
                expected: self.required_len,
                found: swap.len(),
            }))
        } else {
            Ok(())
        }
    }
    /// Initializes the held demands from the measurements in `swap`
    pub fn seed(&mut self, swap: &[f32]) -> Result<()> {
        self.check_len(swap)?;
        for &(d, record) in &self.seeds {
            self.demands[d].value = swap[record];
        }
        Ok(())
    }
    /// Feeds `signal` with `value` at every step instead of the exchange buffer
    ///
    /// Returns false if `signal` is not a model input
    pub fn override_input(&mut self, signal: Signal, value: f32) -> bool {
        match self.u_tags.iter().position(|x| *x == signal) {
            Some(k) => {
                self.overrides.retain(|(i, _)| *i != k);
                self.overrides.push((k, value));
                true
            }
            None => false,
        }
    }
    /// Copies the exchange buffer records into the model input vector `u`
    pub fn marshal_in(&self, swap: &[f32], u: &mut [f64]) -> Result<()> {
        self.check_len(swap)?;
        for &(record, k) in &self.inputs {
            if let Some(u) = u.get_mut(k) {
                *u = swap[record] as f64;
            }
        }
        for &(k, value) in &self.overrides {
            if let Some(u) = u.get_mut(k) {
                *u = value as f64;
            }
        }
        Ok(())
    }
    /// Copies the model output vector `y` into the held demands
    pub fn unmarshal(&mut self, y: &[f64]) {
        for demand in self.demands.iter_mut() {
            if let Some(&value) = y.get(demand.output) {
                demand.value = value as f32;
            }
        }
    }
    /// Writes the constant records and the held demands into the exchange buffer
    pub fn write_out(&self, swap: &mut [f32]) -> Result<()> {
        self.check_len(swap)?;
        for &(record, value) in &self.constants {
            swap[record] = value;
        }
        for demand in &self.demands {
            swap[demand.record] = demand.value;
        }
        if let Some(n_log) = self.n_log {
            swap[LOG_COUNT] = n_log as f32;
        }
        Ok(())
    }
    /// Current held value of an output
    pub fn held(&self, signal: Signal) -> Option<f32> {
        self.demands
            .iter()
            .find(|d| d.signal == signal)
            .map(|d| d.value)
    }
    /// Names and units of the logging channels, as `Log1:-;Log2:-;...`
    pub fn log_names(&self) -> &str {
        &self.log_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Model, Passthrough};

    fn buffer(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 * 0.5).collect()
    }

    #[test]
    fn standard_layout() {
        let model = Passthrough::register();
        let mut adapter = Adapter::new(&SwapSchema::standard(), &model, None).unwrap();
        assert_eq!(adapter.required_len(), 81);
        let swap = buffer(81);
        let mut u = vec![0f64; model.inputs_tags().len()];
        adapter.marshal_in(&swap, &mut u).unwrap();
        let k = model
            .inputs_tags()
            .iter()
            .position(|x| *x == Signal::GeneratorSpeed)
            .unwrap();
        assert_eq!(u[k], 9.5);
        adapter.seed(&swap).unwrap();
        assert_eq!(adapter.held(Signal::GeneratorTorque), Some(11.0));
        assert_eq!(adapter.held(Signal::Blade2PitchAngle), Some(1.5));
        let mut out = vec![-1f32; 81];
        adapter.write_out(&mut out).unwrap();
        assert_eq!(out[46], 11.0);
        assert_eq!(out[27], 1.0);
        assert_eq!(out[47], 0.0);
        assert_eq!(out[64], 0.0);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[48], -1.0);
        assert!(adapter.log_names().is_empty());
    }

    #[test]
    fn extended_logging_channels() {
        let model = Passthrough::register();
        let mut adapter = Adapter::new(&SwapSchema::extended(), &model, Some(170)).unwrap();
        assert_eq!(adapter.required_len(), 190);
        let y: Vec<f64> = (0..model.outputs_tags().len()).map(|i| i as f64).collect();
        adapter.unmarshal(&y);
        let mut out = vec![0f32; 190];
        adapter.write_out(&mut out).unwrap();
        assert_eq!(out[LOG_COUNT], 20.0);
        assert_eq!(out[170], 6.0);
        assert_eq!(out[189], 25.0);
        assert_eq!(out[47], 5.0);
        assert!(adapter
            .log_names()
            .starts_with("Log1:-;Log2:-;Log3:-;"));
        assert!(adapter.log_names().ends_with("Log20:-;"));
    }

    #[test]
    fn logging_channels_out_of_the_inputs() {
        let model = Passthrough::register();
        let e = Adapter::new(&SwapSchema::extended(), &model, Some(100)).unwrap_err();
        assert_eq!(
            e.to_string(),
            "logging channel Log9 overlaps with record 108"
        );
        assert!(matches!(
            Adapter::new(&SwapSchema::extended(), &model, Some(MAX_RECORDS)),
            Err(DisconError::Component(SwapError::OutOfRange(MAX_RECORDS, MAX_RECORDS)))
        ));
        assert!(Adapter::new(&SwapSchema::extended(), &model, Some(MAX_RECORDS - 20)).is_ok());
    }

    #[test]
    fn no_logging_channels() {
        let model = Passthrough::register();
        let adapter = Adapter::new(&SwapSchema::extended(), &model, None).unwrap();
        assert_eq!(adapter.required_len(), 163);
        let mut out = vec![0f32; 163];
        adapter.write_out(&mut out).unwrap();
        assert_eq!(out[LOG_COUNT], 0.0);
        assert!(adapter.log_names().is_empty());
    }

    #[test]
    fn overrides_and_missing_signals() {
        let model = Passthrough::new(
            vec![Signal::UserVar1, Signal::GeneratorSpeed],
            vec![
                Signal::GeneratorTorque,
                Signal::Blade1PitchAngle,
                Signal::Blade2PitchAngle,
                Signal::Blade3PitchAngle,
            ],
        );
        let mut adapter = Adapter::new(&SwapSchema::extended(), &model, None).unwrap();
        assert!(adapter.override_input(Signal::UserVar1, 42.0));
        assert!(!adapter.override_input(Signal::UserVar2, 1.0));
        let mut u = vec![0f64; 2];
        adapter.marshal_in(&buffer(163), &mut u).unwrap();
        assert_eq!(u, vec![42.0, 9.5]);
        assert!(matches!(
            adapter.marshal_in(&buffer(100), &mut u),
            Err(DisconError::Component(SwapError::TooShort {
                expected: 163,
                found: 100
            }))
        ));
        let model = Passthrough::new(vec![Signal::GeneratorSpeed], vec![Signal::GeneratorTorque]);
        assert!(matches!(
            Adapter::new(&SwapSchema::standard(), &model, None),
            Err(DisconError::Component(SwapError::MissingOutput(
                Signal::Blade1PitchAngle
            )))
        ));
    }

    #[test]
    fn log_overlap() {
        let model = Passthrough::register();
        assert!(matches!(
            Adapter::new(&SwapSchema::extended(), &model, Some(80)),
            Err(DisconError::Component(SwapError::LogOverlap(Signal::Log1, 80)))
        ));
    }
}
