//! Feed-through controller model
//!
//! [`Passthrough`] copies some of its inputs to its outputs at every base rate step.
//! Its default registration returns the measured torque and pitch as demands,
//! the yaw bearing rate as yaw rate demand and the user variables on the logging channels.
//! It records every call to its life cycle routines.

use crate::{
    io::Signal,
    timing::{SampleTime, Timing},
    IOTags, Model,
};

/// Calls to the model routines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calls {
    pub starts: usize,
    pub terminates: usize,
    /// Task index of each output pass
    pub outputs: Vec<usize>,
    /// Task index of each update pass
    pub updates: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Passthrough {
    u_tags: Vec<Signal>,
    y_tags: Vec<Signal>,
    routes: Vec<(usize, usize)>,
    u: Vec<f64>,
    y: Vec<f64>,
    step_size: f64,
    ratios: Vec<usize>,
    error: Option<String>,
    error_after: Option<(usize, String)>,
    calls: Calls,
}
impl Passthrough {
    /// Creates a model with the given inputs and outputs and a single 10ms rate
    pub fn new(inputs: Vec<Signal>, outputs: Vec<Signal>) -> Self {
        Self {
            u: vec![0f64; inputs.len()],
            y: vec![0f64; outputs.len()],
            u_tags: inputs,
            y_tags: outputs,
            routes: vec![],
            step_size: 0.01,
            ratios: vec![1],
            error: None,
            error_after: None,
            calls: Default::default(),
        }
    }
    /// Copies input `from` to output `to`
    pub fn route(self, from: Signal, to: Signal) -> Self {
        let mut routes = self.routes;
        if let (Some(i), Some(j)) = (
            self.u_tags.iter().position(|x| *x == from),
            self.y_tags.iter().position(|x| *x == to),
        ) {
            routes.push((i, j));
        }
        Self { routes, ..self }
    }
    /// Sets the base step and the rate ratios of the tasks
    pub fn sampling(self, step_size: f64, ratios: &[usize]) -> Self {
        Self {
            step_size,
            ratios: ratios.to_vec(),
            ..self
        }
    }
    /// Raises `msg` as error status after `n` base rate steps
    pub fn error_after<S: Into<String>>(self, n: usize, msg: S) -> Self {
        Self {
            error_after: Some((n, msg.into())),
            ..self
        }
    }
    pub fn set_error_status<S: Into<String>>(&mut self, msg: S) {
        self.error = Some(msg.into());
    }
    pub fn calls(&self) -> &Calls {
        &self.calls
    }
    pub fn u(&self) -> &[f64] {
        &self.u
    }
}

impl IOTags for Passthrough {
    fn outputs_tags(&self) -> Vec<Signal> {
        self.y_tags.clone()
    }
    fn inputs_tags(&self) -> Vec<Signal> {
        self.u_tags.clone()
    }
}

impl Model for Passthrough {
    const NAME: &'static str = "passthrough";
    fn register() -> Self {
        use Signal::*;
        let outputs = [
            GeneratorTorque,
            Blade1PitchAngle,
            Blade2PitchAngle,
            Blade3PitchAngle,
            CollectivePitchAngle,
            YawRate,
        ]
        .iter()
        .chain(Signal::LOGS.iter())
        .copied()
        .collect();
        let model = Self::new(Signal::INPUTS.to_vec(), outputs)
            .route(MeasuredTorque, GeneratorTorque)
            .route(MeasuredPitch, Blade1PitchAngle)
            .route(MeasuredPitch, Blade2PitchAngle)
            .route(MeasuredPitch, Blade3PitchAngle)
            .route(MeasuredPitch, CollectivePitchAngle)
            .route(YawBearingRate, YawRate);
        Signal::USER_VARIABLES
            .iter()
            .zip(Signal::LOGS.iter())
            .fold(model, |model, (&u, &y)| model.route(u, y))
    }
    fn error_status(&self) -> Option<&str> {
        self.error.as_deref()
    }
    fn initialize_sample_times(&mut self) -> Vec<SampleTime> {
        self.ratios
            .iter()
            .map(|&r| SampleTime::new(self.step_size * r as f64))
            .collect()
    }
    fn step_size(&self) -> f64 {
        self.step_size
    }
    fn start(&mut self) {
        self.calls.starts += 1;
    }
    fn u_mut(&mut self) -> &mut [f64] {
        &mut self.u
    }
    fn y(&self) -> &[f64] {
        &self.y
    }
    fn outputs(&mut self, tid: usize, timing: &Timing) {
        self.calls.outputs.push(tid);
        if tid <= timing.first_tid() {
            for &(i, j) in &self.routes {
                self.y[j] = self.u[i];
            }
        }
    }
    fn update(&mut self, tid: usize, timing: &Timing) {
        self.calls.updates.push(tid);
        if tid == timing.first_tid() {
            let n = self.calls.updates.iter().filter(|&&t| t == tid).count();
            if let Some((after, msg)) = &self.error_after {
                if n >= *after {
                    self.error = Some(msg.clone());
                }
            }
        }
    }
    fn terminate(&mut self) {
        self.calls.terminates += 1;
    }
}
