//! Controller context
//!
//! A [`Discon`] context owns the controller model and everything needed to step it:
//! the sample time engine, the scheduler, the exchange buffer adapter and the data logging.
//! It is created at the first host call, stepped at each following call and
//! terminated after the final step.
//!
//! [`dispatch`] routes a host call to the context according to the call phase.

use crate::{
    adapter::Adapter,
    config::{ConfigError, ConfigLoader, DisconConfig, ParameterSource},
    parameters::{ParameterError, Parameters},
    phase::CallPhase,
    scheduler::{Scheduler, SchedulerError},
    swap::{first_log_record, nint, SwapError, SwapSchema, COMMUNICATION_INTERVAL, FIRST_LOG_RECORD},
    telltale::{DataLog, DataLogging, TellTale, TellTaleError},
    timing::{Timing, TimingError},
    DisconError, Model,
};
use std::{fmt, path::PathBuf};

#[derive(Debug)]
pub enum ControllerError {
    NotInitialized,
    InvalidStatus(f32),
    Registration(String),
    Timing(TimingError),
    Scheduler(SchedulerError),
    Swap(SwapError),
    StartDataLogging(String),
    DataLogging(TellTaleError),
    Parameters(ParameterError),
    Config(ConfigError),
}
impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ControllerError::*;
        match self {
            NotInitialized => write!(f, "the controller has not been initialized"),
            InvalidStatus(status) if status.is_finite() => {
                write!(f, "iStatus is not recognized: {}", nint(*status))
            }
            InvalidStatus(status) => write!(f, "iStatus is not recognized: {}", status),
            Registration(msg) => write!(f, "Error during model registration: {}", msg),
            Timing(e) => write!(f, "Failed to initialize sample time engine: {}", e),
            Scheduler(e) => write!(f, "{}", e),
            Swap(e) => write!(f, "{}", e),
            StartDataLogging(msg) => write!(f, "Error starting data logging: {}", msg),
            DataLogging(e) => write!(f, "Error stopping data logging: {}", e),
            Parameters(e) => write!(f, "{}", e),
            Config(e) => write!(f, "{}", e),
        }
    }
}
component_from!(ControllerError:
    TimingError => Timing,
    SchedulerError => Scheduler,
    SwapError => Swap,
    TellTaleError => DataLogging,
    ParameterError => Parameters,
    ConfigError => Config
);
type Result<T> = std::result::Result<T, DisconError<ControllerError>>;

/// Message sent to the host after initialization
pub const INITIALIZED: &str = "Controller initialization complete";
/// Message sent to the host after the final step
pub const STOPPED: &str = "** Stopping the controller **";

/// Controller context
pub struct Discon<M: Model, L: DataLog = TellTale> {
    pub(crate) model: M,
    timing: Timing,
    scheduler: Scheduler,
    adapter: Adapter,
    data_log: L,
    config: DisconConfig,
    steps: usize,
}
impl<M: Model> Discon<M> {
    /// Registers the model and initializes the context with the data logging of the configuration
    pub fn initialize(config: DisconConfig, swap: &[f32], infile: &str) -> Result<Self> {
        let mut data_logging = DataLogging::new();
        if let Some(path) = &config.telltale {
            data_logging = data_logging.pickle(path);
        }
        if let Some(n) = config.max_log_samples {
            data_logging = data_logging.max_samples(n);
        }
        Self::initialize_with(M::register(), data_logging.build(), config, swap, infile)
    }
}
impl<M: Model, L: DataLog> Discon<M, L> {
    /// Initializes the context with a registered `model` and a data logger
    pub fn initialize_with(
        mut model: M,
        mut data_log: L,
        config: DisconConfig,
        swap: &[f32],
        infile: &str,
    ) -> Result<Self> {
        if let Some(status) = model.error_status() {
            return Err(DisconError::Component(ControllerError::Registration(
                status.to_string(),
            )));
        }
        model.initialize_sizes();
        let sample_times = model.initialize_sample_times();
        let timing = Timing::new(&sample_times, model.step_size())?;
        log::info!(
            "{}: {} sample time(s), base step {}s",
            M::NAME,
            timing.n_sample_times(),
            timing.step_size()
        );
        if let Some(&host_step) = swap.get(COMMUNICATION_INTERVAL) {
            let host_step = host_step as f64;
            if (host_step - timing.step_size()).abs() > 1e-6 * timing.step_size() {
                log::warn!(
                    "host communication interval ({}s) differs from the model step size ({}s)",
                    host_step,
                    timing.step_size()
                );
            }
        }
        let mut scheduler = Scheduler::new(M::NAME, config.tasking, timing.n_sample_times());
        let first_log = swap
            .get(FIRST_LOG_RECORD)
            .copied()
            .and_then(first_log_record);
        let mut adapter = Adapter::new(&SwapSchema::from_layout(config.layout), &model, first_log)?;
        let parameter_file = match &config.parameters {
            ParameterSource::None => None,
            ParameterSource::File(path) => Some(path.clone()),
            ParameterSource::HostInfile => Some(PathBuf::from(infile)),
        };
        if let Some(path) = parameter_file {
            match Parameters::from_path(&path) {
                Ok(parameters) => {
                    for (signal, value) in parameters.user_variables() {
                        if !adapter.override_input(signal, value) {
                            log::debug!("{} is not a model input", signal);
                        }
                    }
                }
                Err(DisconError::Component(ParameterError::NotFound(path))) => {
                    log::warn!("parameter file {:?} not found", path)
                }
                Err(e) => return Err(e.into()),
            }
        }
        data_log
            .start(timing.step_size(), &model.outputs_tags())
            .map_err(|e| {
                DisconError::Component(ControllerError::StartDataLogging(e.to_string()))
            })?;
        log::info!("** Starting the controller **");
        model.start();
        if let Some(status) = model.error_status() {
            log::error!("model start failed: {}", status);
            scheduler.halt(DisconError::<SchedulerError>::Model(status.to_string()).to_string());
        }
        adapter.seed(swap)?;
        Ok(Self {
            model,
            timing,
            scheduler,
            adapter,
            data_log,
            config,
            steps: 0,
        })
    }
    /// Steps the model with the inputs from the exchange buffer
    pub fn step(&mut self, swap: &[f32]) -> Result<()> {
        self.step_with(swap, || ())
    }
    /// Steps the model, calling `release` once the base rate task has completed
    /// and before the slower tasks are serviced
    pub fn step_with<F: FnOnce()>(&mut self, swap: &[f32], release: F) -> Result<()> {
        self.adapter.marshal_in(swap, self.model.u_mut())?;
        self.scheduler
            .tick(&mut self.model, &mut self.timing, &mut self.data_log)?;
        release();
        self.scheduler.run_pending(&mut self.model, &mut self.timing);
        self.adapter.unmarshal(self.model.y());
        self.steps += 1;
        Ok(())
    }
    /// Writes the held demands and the constant records into the exchange buffer
    pub fn write_outputs(&self, swap: &mut [f32]) -> Result<()> {
        Ok(self.adapter.write_out(swap)?)
    }
    /// Stops the data logging, checks the scheduler and terminates the model
    pub fn cleanup(&mut self) -> Result<()> {
        let stopped = self.data_log.stop();
        self.scheduler.audit(&self.model)?;
        stopped?;
        self.model.terminate();
        log::info!("{}", STOPPED);
        Ok(())
    }
    /// Records a host call that found the previous one still running
    pub fn flag_isr_overrun(&mut self) {
        self.scheduler.flag_isr_overrun();
    }
    pub fn model(&self) -> &M {
        &self.model
    }
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
    pub fn timing(&self) -> &Timing {
        &self.timing
    }
    pub fn data_log(&self) -> &L {
        &self.data_log
    }
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
    pub fn config(&self) -> &DisconConfig {
        &self.config
    }
    /// Number of completed steps
    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Strings returned to the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub message: String,
    /// Names and units of the logging channels
    pub log_names: String,
}

/// Routes a host call to the controller context in `slot`
///
/// The context is created at initialization and dropped after the final step.
/// An invalid call phase leaves both the context and the exchange buffer untouched.
pub fn dispatch<M: Model>(
    slot: &mut Option<Discon<M>>,
    load: ConfigLoader,
    swap: &mut [f32],
    infile: &str,
) -> Result<Reply> {
    dispatch_with(slot, load, swap, infile, || ())
}
/// Routes a host call like [`dispatch`], calling `release` at the end of the base rate step
///
/// `release` is not called if the base rate step fails.
pub fn dispatch_with<M: Model, F: FnOnce()>(
    slot: &mut Option<Discon<M>>,
    load: ConfigLoader,
    swap: &mut [f32],
    infile: &str,
    release: F,
) -> Result<Reply> {
    let status = *swap
        .first()
        .ok_or(DisconError::Component(ControllerError::Swap(
            SwapError::TooShort {
                expected: 1,
                found: 0,
            },
        )))?;
    let log_names = |discon: &Discon<M>| discon.adapter().log_names().to_string();
    match CallPhase::classify(status) {
        CallPhase::Initialize => {
            if slot.take().is_some() {
                log::warn!("controller initialized again, the running controller is dropped");
            }
            let config = load()?;
            config.init_logging();
            let discon = Discon::<M>::initialize(config, swap, infile)?;
            discon.write_outputs(swap)?;
            let reply = Reply {
                message: INITIALIZED.to_string(),
                log_names: log_names(&discon),
            };
            *slot = Some(discon);
            log::info!("{}", INITIALIZED);
            Ok(reply)
        }
        CallPhase::Step => {
            let discon = slot
                .as_mut()
                .ok_or(DisconError::Component(ControllerError::NotInitialized))?;
            let stepped = discon.step_with(swap, release);
            discon.write_outputs(swap)?;
            stepped?;
            Ok(Reply {
                message: String::new(),
                log_names: log_names(&*discon),
            })
        }
        CallPhase::FinalStep => {
            let mut discon = slot
                .take()
                .ok_or(DisconError::Component(ControllerError::NotInitialized))?;
            let stepped = discon.step_with(swap, release);
            let written = discon.write_outputs(swap);
            let cleaned = discon.cleanup();
            stepped?;
            written?;
            cleaned?;
            Ok(Reply {
                message: STOPPED.to_string(),
                log_names: log_names(&discon),
            })
        }
        CallPhase::Invalid(status) => {
            Err(DisconError::Component(ControllerError::InvalidStatus(status)))
        }
    }
}
