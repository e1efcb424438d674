//! Bladed DISCON external controller interface
//!
//! The library wraps a code-generated, multi-rate controller model into the
//! fixed DISCON entry point that Bladed loads from a shared library.
//! It provides the following features:
//!  - the classification of each host call into initialization, step or final step,
//!  - the multi-rate scheduler with its task overrun detection,
//!  - the exchange of the `avrSwap` records with the named ports of the model,
//!  - the start-up and shutdown sequences of the model and of the data logging.
//!
//! A controller model is any structure implementing the [`Model`] trait, the life cycle
//! of a generated model: registration, sample times, start, per task outputs and update passes
//! and termination.
//! The model is owned by a [`Discon`] context that is created at the first host call and
//! dropped after the final one.
//! The [`export_discon`] macro generates the `DISCON` symbol for a given model type:
//! ```ignore
//! discon::export_discon!(discon::Passthrough);
//! ```

#[macro_use]
mod error;
pub mod adapter;
pub mod config;
pub mod controller;
pub mod export;
pub mod io;
pub mod parameters;
pub mod passthrough;
pub mod phase;
pub mod scheduler;
pub mod swap;
pub mod telltale;
pub mod timing;

pub use error::DisconError;
use io::Signal;
use timing::{SampleTime, Timing};

#[doc(inline)]
pub use config::DisconConfig;
#[doc(inline)]
pub use controller::Discon;
#[doc(inline)]
pub use export::DisconCell;
#[doc(inline)]
pub use passthrough::Passthrough;
#[doc(inline)]
pub use telltale::{DataLogging, TellTale};

/// Used to get the list of inputs or outputs
pub trait IOTags {
    /// Return the list of outputs
    fn outputs_tags(&self) -> Vec<Signal>;
    /// Return the list of inputs
    fn inputs_tags(&self) -> Vec<Signal>;
}

/// Life cycle of a code-generated multi-rate controller model
///
/// The input vector is ordered as [`inputs_tags`](IOTags::inputs_tags)
/// and the output vector as [`outputs_tags`](IOTags::outputs_tags).
/// Task 0 is the base rate, task `i` runs every `ratio(i)` base steps.
pub trait Model: IOTags {
    /// Model name used in the diagnostic messages
    const NAME: &'static str;
    /// Creates and registers a model instance
    fn register() -> Self
    where
        Self: Sized;
    /// Returns the error status of the model, if any
    fn error_status(&self) -> Option<&str>;
    /// Sizes the model inputs, outputs and states
    fn initialize_sizes(&mut self) {}
    /// Returns the model sample times, fastest first
    fn initialize_sample_times(&mut self) -> Vec<SampleTime>;
    /// Fundamental step size of the model
    fn step_size(&self) -> f64;
    /// Starts the model
    fn start(&mut self) {}
    /// Mutable access to the model input vector
    fn u_mut(&mut self) -> &mut [f64];
    /// The model output vector
    fn y(&self) -> &[f64];
    /// Output pass of task `tid`
    fn outputs(&mut self, tid: usize, timing: &Timing);
    /// Update pass of task `tid`
    fn update(&mut self, tid: usize, timing: &Timing);
    /// Terminates the model
    fn terminate(&mut self) {}
}
