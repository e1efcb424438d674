//! Multi-rate scheduler
//!
//! Steps the tasks of a [`Model`] once per base rate call and guards the
//! cooperative schedule against overruns.
//! The base rate task runs first, then the slower tasks that are due, from the highest
//! to the lowest priority.
//! A base rate call that starts before the previous base rate task has completed is an ISR overrun,
//! a slower task that becomes due again before it has been serviced is a task overrun.
//! Either condition stops the execution for good.

use crate::{telltale::DataLog, timing::Timing, DisconError, Model};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution mode of the model tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tasking {
    /// All the tasks run within the base rate output and update passes
    SingleTasking,
    /// Each task has its own output and update passes
    MultiTasking,
}
impl Default for Tasking {
    fn default() -> Self {
        Tasking::SingleTasking
    }
}

#[derive(Debug, PartialEq)]
pub enum SchedulerError {
    IsrOverrun(&'static str),
    TaskOverrun(&'static str, usize),
    Stopped(String),
    DataLogging(String),
}
impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SchedulerError::*;
        match self {
            IsrOverrun(model) => write!(
                f,
                "{}: ISR overrun - base sampling rate is too fast",
                model
            ),
            TaskOverrun(model, i) => write!(
                f,
                "{} ISR overrun - sampling rate is too fast for sample time index {}",
                model, i
            ),
            Stopped(reason) => write!(f, "{}", reason),
            DataLogging(msg) => write!(f, "{}", msg),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<SchedulerError>>;

/// Overrun and event book-keeping of the scheduler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub stop_execution: bool,
    pub isr_overrun: u32,
    pub overrun_flags: Vec<u32>,
    pub event_flags: Vec<u32>,
    pub errmsg: Option<String>,
}
impl SchedulerState {
    /// Zeroed state for `n_sample_times` tasks
    pub fn new(n_sample_times: usize) -> Self {
        Self {
            overrun_flags: vec![0; n_sample_times],
            event_flags: vec![0; n_sample_times],
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct Scheduler {
    name: &'static str,
    tasking: Tasking,
    state: SchedulerState,
    reason: Option<String>,
}
impl Scheduler {
    /// Creates a scheduler for `n_sample_times` tasks of the model `name`
    pub fn new(name: &'static str, tasking: Tasking, n_sample_times: usize) -> Self {
        Self {
            name,
            tasking,
            state: SchedulerState::new(n_sample_times),
            reason: None,
        }
    }
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }
    pub fn tasking(&self) -> Tasking {
        self.tasking
    }
    pub fn is_stopped(&self) -> bool {
        self.state.stop_execution
    }
    /// Stops the execution, later steps fail with `reason`
    pub fn halt<S: Into<String>>(&mut self, reason: S) {
        self.state.stop_execution = true;
        if self.reason.is_none() {
            self.reason = Some(reason.into());
        }
    }
    fn isr_overrun(&mut self) -> DisconError<SchedulerError> {
        let e = SchedulerError::IsrOverrun(self.name);
        self.halt(e.to_string());
        DisconError::Component(e)
    }
    /// Records a base rate call that found the previous one still running
    pub fn flag_isr_overrun(&mut self) {
        self.state.isr_overrun += 1;
        let e = SchedulerError::IsrOverrun(self.name);
        self.halt(e.to_string());
    }
    /// Runs one base rate step and flags the slower tasks that are due
    pub fn tick<M: Model, L: DataLog>(
        &mut self,
        model: &mut M,
        timing: &mut Timing,
        data_log: &mut L,
    ) -> Result<()> {
        if self.state.stop_execution {
            let reason = self
                .reason
                .clone()
                .unwrap_or_else(|| "execution stopped".to_string());
            return Err(DisconError::Component(SchedulerError::Stopped(reason)));
        }
        if self.state.isr_overrun > 0 {
            self.state.isr_overrun += 1;
            return Err(self.isr_overrun());
        }
        self.state.isr_overrun += 1;
        if let Some(status) = model.error_status() {
            let status = status.to_string();
            self.halt(DisconError::<SchedulerError>::Model(status.clone()).to_string());
            return Err(DisconError::Model(status));
        }
        match self.tasking {
            Tasking::MultiTasking => {
                timing.update_discrete_events();
                let first_tid = timing.first_tid();
                for i in first_tid + 1..timing.n_sample_times() {
                    if timing.is_sample_hit(i) {
                        if self.state.event_flags[i] > 0 {
                            self.state.isr_overrun -= 1;
                            self.state.overrun_flags[i] += 1;
                            let e = SchedulerError::TaskOverrun(self.name, i);
                            log::error!("{}", e);
                            self.halt(e.to_string());
                            return Err(DisconError::Component(e));
                        }
                        self.state.event_flags[i] = 1;
                    }
                }
                model.outputs(first_tid, timing);
                self.log(model, timing, data_log, first_tid)?;
                model.update(first_tid, timing);
                timing.update_task_time(0);
                if first_tid == 1 {
                    timing.update_task_time(1);
                }
            }
            Tasking::SingleTasking => {
                model.outputs(0, timing);
                self.log(model, timing, data_log, 0)?;
                model.update(0, timing);
                timing.update_task_sample_hits();
            }
        }
        self.state.isr_overrun -= 1;
        Ok(())
    }
    fn log<M: Model, L: DataLog>(
        &mut self,
        model: &M,
        timing: &Timing,
        data_log: &mut L,
        tid: usize,
    ) -> Result<()> {
        if let Err(e) = data_log.update(timing.task_time(tid), model.y()) {
            let msg = e.to_string();
            log::error!("data logging failed: {}", msg);
            self.state.errmsg = Some(msg.clone());
            self.halt(msg.clone());
            return Err(DisconError::Component(SchedulerError::DataLogging(msg)));
        }
        Ok(())
    }
    /// Services the slower tasks flagged by [`tick`](Scheduler::tick), highest priority first
    pub fn run_pending<M: Model>(&mut self, model: &mut M, timing: &mut Timing) {
        if self.tasking == Tasking::SingleTasking {
            return;
        }
        for i in timing.first_tid() + 1..timing.n_sample_times() {
            if self.state.overrun_flags[i] > 0 {
                break;
            }
            if self.state.event_flags[i] > 0 {
                self.state.overrun_flags[i] += 1;
                model.outputs(i, timing);
                model.update(i, timing);
                timing.update_task_time(i);
                self.state.overrun_flags[i] -= 1;
                self.state.event_flags[i] = 0;
            }
        }
    }
    /// Runs one base rate step followed by the slower tasks that are due
    pub fn step<M: Model, L: DataLog>(
        &mut self,
        model: &mut M,
        timing: &mut Timing,
        data_log: &mut L,
    ) -> Result<()> {
        self.tick(model, timing, data_log)?;
        self.run_pending(model, timing);
        Ok(())
    }
    /// Checks the scheduler state at shutdown
    ///
    /// The sticky error message is reported first, then the model error status,
    /// then the base rate and the task overruns
    pub fn audit<M: Model>(&self, model: &M) -> Result<()> {
        if let Some(msg) = &self.state.errmsg {
            return Err(DisconError::Component(SchedulerError::DataLogging(
                msg.clone(),
            )));
        }
        if let Some(status) = model.error_status() {
            return Err(DisconError::Model(status.to_string()));
        }
        if self.state.isr_overrun > 0 {
            return Err(DisconError::Component(SchedulerError::IsrOverrun(
                self.name,
            )));
        }
        if self.tasking == Tasking::MultiTasking {
            if let Some(i) = self
                .state
                .overrun_flags
                .iter()
                .skip(1)
                .position(|&x| x > 0)
            {
                return Err(DisconError::Component(SchedulerError::TaskOverrun(
                    self.name,
                    i + 1,
                )));
            }
        }
        Ok(())
    }
}
