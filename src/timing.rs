//! Sample time engine
//!
//! Derives the sample hits and the task times of a multi-rate model from its sample times.
//! Every sample time must be a discrete integer multiple of the fundamental step size,
//! the fastest task (`tid=0`) running at the step size itself without offset.
//!
//! The engine counts base ticks: task `i` with rate ratio `r` and offset `o` (both in ticks)
//! is due at tick `t` if `t >= o` and `(t - o) % r == 0`.

use crate::DisconError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample time of a task, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleTime {
    pub period: f64,
    pub offset: f64,
}
impl SampleTime {
    /// Creates a sample time with the given `period` and no offset
    pub fn new(period: f64) -> Self {
        Self {
            period,
            offset: 0f64,
        }
    }
    /// Sets the offset
    pub fn offset(self, offset: f64) -> Self {
        Self { offset, ..self }
    }
}

#[derive(Debug, PartialEq)]
pub enum TimingError {
    NoSampleTimes,
    StepSize(f64),
    Continuous(usize),
    Ratio { tid: usize, period: f64, step_size: f64 },
    Offset { tid: usize, offset: f64 },
    Order(usize),
}
impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TimingError::*;
        match self {
            NoSampleTimes => write!(f, "the model has no sample time"),
            StepSize(h) => write!(f, "invalid fundamental step size: {}", h),
            Continuous(tid) => write!(f, "sample time index {} is not discrete", tid),
            Ratio {
                tid,
                period,
                step_size,
            } => write!(
                f,
                "sample time index {} ({}s) is not an integer multiple of the step size ({}s)",
                tid, period, step_size
            ),
            Offset { tid, offset } => write!(
                f,
                "invalid offset ({}s) for sample time index {}",
                offset, tid
            ),
            Order(tid) => write!(f, "sample time index {} is faster than the previous one", tid),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<TimingError>>;

/// Relative tolerance on the integer rate ratios
const RATIO_TOLERANCE: f64 = 1e-9;

fn integer_ratio(x: f64) -> Option<u64> {
    let n = x.round();
    if n >= 0f64 && (x - n).abs() <= RATIO_TOLERANCE * n.max(1f64) {
        Some(n as u64)
    } else {
        None
    }
}

/// Multi-rate timing of a model
#[derive(Debug, Clone)]
pub struct Timing {
    step_size: f64,
    ratios: Vec<u64>,
    offsets: Vec<u64>,
    tick: u64,
    hits: Vec<bool>,
    task_ticks: Vec<u64>,
    first_tid: usize,
}
impl Timing {
    /// Creates the timing engine from the model sample times and its fundamental step size
    pub fn new(sample_times: &[SampleTime], step_size: f64) -> Result<Self> {
        if sample_times.is_empty() {
            return Err(DisconError::Component(TimingError::NoSampleTimes));
        }
        if !(step_size.is_finite() && step_size > 0f64) {
            return Err(DisconError::Component(TimingError::StepSize(step_size)));
        }
        let mut ratios: Vec<u64> = Vec::with_capacity(sample_times.len());
        let mut offsets: Vec<u64> = Vec::with_capacity(sample_times.len());
        for (tid, st) in sample_times.iter().enumerate() {
            if !(st.period.is_finite() && st.period > 0f64) {
                return Err(DisconError::Component(TimingError::Continuous(tid)));
            }
            let ratio = integer_ratio(st.period / step_size)
                .filter(|&r| r > 0 && (tid > 0 || r == 1))
                .ok_or(DisconError::Component(TimingError::Ratio {
                    tid,
                    period: st.period,
                    step_size,
                }))?;
            let offset = integer_ratio(st.offset / step_size)
                .filter(|&o| o < ratio && (tid > 0 || o == 0))
                .ok_or(DisconError::Component(TimingError::Offset {
                    tid,
                    offset: st.offset,
                }))?;
            if ratios.last().map_or(false, |&r| ratio < r) {
                return Err(DisconError::Component(TimingError::Order(tid)));
            }
            ratios.push(ratio);
            offsets.push(offset);
        }
        let first_tid = if ratios.len() > 1 && ratios[1] == 1 && offsets[1] == 0 {
            1
        } else {
            0
        };
        let mut this = Self {
            step_size,
            task_ticks: offsets.clone(),
            hits: vec![false; ratios.len()],
            ratios,
            offsets,
            tick: 0,
            first_tid,
        };
        this.compute_hits();
        Ok(this)
    }
    fn compute_hits(&mut self) {
        let tick = self.tick;
        for ((hit, &ratio), &offset) in self
            .hits
            .iter_mut()
            .zip(self.ratios.iter())
            .zip(self.offsets.iter())
        {
            *hit = tick >= offset && (tick - offset) % ratio == 0;
        }
    }
    /// Multitasking: computes the sample hits of the current tick and moves to the next one
    ///
    /// Returns the time of the next base tick
    pub fn update_discrete_events(&mut self) -> f64 {
        self.compute_hits();
        self.tick += 1;
        self.tick as f64 * self.step_size
    }
    /// Multitasking: advances the time of task `tid` by its period
    pub fn update_task_time(&mut self, tid: usize) {
        if let (Some(ticks), Some(ratio)) = (self.task_ticks.get_mut(tid), self.ratios.get(tid)) {
            *ticks += ratio;
        }
    }
    /// Single-tasking: advances the time of every task with a hit, then moves to the next tick
    pub fn update_task_sample_hits(&mut self) {
        for ((ticks, &ratio), &hit) in self
            .task_ticks
            .iter_mut()
            .zip(self.ratios.iter())
            .zip(self.hits.iter())
        {
            if hit {
                *ticks += ratio;
            }
        }
        self.tick += 1;
        self.compute_hits();
    }
    /// Time of the current step of task `tid`
    pub fn task_time(&self, tid: usize) -> f64 {
        self.task_ticks
            .get(tid)
            .map_or(f64::NAN, |&ticks| ticks as f64 * self.step_size)
    }
    /// Returns true if task `tid` is due
    pub fn is_sample_hit(&self, tid: usize) -> bool {
        self.hits.get(tid).copied().unwrap_or(false)
    }
    pub fn sample_hits(&self) -> &[bool] {
        &self.hits
    }
    /// Number of sample times (tasks)
    pub fn n_sample_times(&self) -> usize {
        self.ratios.len()
    }
    /// Task run by the base rate step
    pub fn first_tid(&self) -> usize {
        self.first_tid
    }
    /// Rate ratio of task `tid` to the base rate
    pub fn rate_ratio(&self, tid: usize) -> Option<u64> {
        self.ratios.get(tid).copied()
    }
    pub fn step_size(&self) -> f64 {
        self.step_size
    }
    /// Number of base ticks elapsed
    pub fn tick(&self) -> u64 {
        self.tick
    }
}
