//! DISCON entry point
//!
//! Bladed calls the `DISCON` symbol of the controller shared library once per time step:
//! ```c
//! void DISCON(float *avrSwap, int *aviFail, char *accInfile, char *avcOutname, char *avcMsg);
//! ```
//! The [`export_discon`](crate::export_discon) macro generates this symbol for a model type,
//! the controller context living in a process-wide [`DisconCell`].

use crate::{
    config::ConfigLoader,
    controller::{self, Discon},
    io::Signal,
    scheduler::SchedulerError,
    swap::{
        first_log_record, nint, SwapError, SwapSchema, FIRST_LOG_RECORD, INFILE_LENGTH,
        MAX_RECORDS, MESSAGE_LENGTH, OUTNAME_CAPACITY,
    },
    Model,
};
use std::{
    any::Any,
    cell::Cell,
    os::raw::{c_char, c_int},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// Maximum number of characters of the message, including the terminating NUL
pub const MESSAGE_CAPACITY: usize = 256;
/// Maximum number of characters read from `accInfile`
const MAX_INFILE_LENGTH: usize = 4096;

/// Outcome of a host call
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// 0 on success, -1 on failure
    pub fail: i32,
    pub message: String,
    /// Names and units of the logging channels
    pub outname: String,
}
impl Report {
    fn failure<S: Into<String>>(message: S, outname: String) -> Self {
        let message = message.into();
        log::error!("{}", message);
        Self {
            fail: -1,
            message,
            outname,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Copies `s` into the C string `dst` of capacity `cap`, NUL included
unsafe fn write_c_string(dst: *mut c_char, s: &str, cap: usize) {
    if dst.is_null() || cap == 0 {
        return;
    }
    let n = s.len().min(cap - 1);
    std::ptr::copy_nonoverlapping(s.as_ptr() as *const c_char, dst, n);
    *dst.add(n) = 0;
}

/// Base rate step in flight, released on drop if the step did not complete
struct BaseRate<'a> {
    flag: &'a AtomicBool,
    released: Cell<bool>,
}
impl<'a> BaseRate<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag,
                released: Cell::new(false),
            })
    }
    /// Releases the flag once, a later call may already own it
    fn release(&self) {
        if !self.released.replace(true) {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}
impl<'a> Drop for BaseRate<'a> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Process-wide controller context
///
/// A call that arrives while the base rate task of the previous call is still running is
/// a base rate overrun: it fails without touching the model and the overrun is recorded
/// at the next call.
/// A call that arrives while the previous call is only servicing the slower tasks waits
/// for them to complete.
pub struct DisconCell<M: Model> {
    slot: Mutex<Option<Discon<M>>>,
    base_rate: AtomicBool,
    reentry: AtomicBool,
}
impl<M: Model> Default for DisconCell<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M: Model> DisconCell<M> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            base_rate: AtomicBool::new(false),
            reentry: AtomicBool::new(false),
        }
    }
    /// Returns true if a controller context is alive
    pub fn is_initialized(&self) -> bool {
        self.slot.try_lock().map_or(false, |slot| slot.is_some())
    }
    /// Processes a host call with the exchange buffer `swap`
    pub fn dispatch(&self, load: ConfigLoader, swap: &mut [f32], infile: &str) -> Report {
        let base_rate = match BaseRate::enter(&self.base_rate) {
            Some(base_rate) => base_rate,
            None => {
                self.reentry.store(true, Ordering::SeqCst);
                return Report::failure(
                    SchedulerError::IsrOverrun(M::NAME).to_string(),
                    String::new(),
                );
            }
        };
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(_) => {
                return Report::failure(
                    format!("{}: controller context lost after a previous failure", M::NAME),
                    String::new(),
                )
            }
        };
        if self.reentry.swap(false, Ordering::SeqCst) {
            if let Some(discon) = slot.as_mut() {
                discon.flag_isr_overrun();
            }
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            controller::dispatch_with(&mut *slot, load, swap, infile, || base_rate.release())
        }));
        let outname = slot
            .as_ref()
            .map(|discon| discon.adapter().log_names().to_string())
            .unwrap_or_default();
        match outcome {
            Ok(Ok(reply)) => Report {
                fail: 0,
                message: reply.message,
                outname: reply.log_names,
            },
            Ok(Err(e)) => Report::failure(e.to_string(), outname),
            Err(payload) => {
                *slot = None;
                Report::failure(
                    format!("{} panicked: {}", M::NAME, panic_message(payload.as_ref())),
                    String::new(),
                )
            }
        }
    }
    /// Processes a raw host call
    ///
    /// # Safety
    ///
    /// `avr_swap` must point to at least `max(163, avrSwap[62] + 19)` records
    /// (a first logging record beyond [`MAX_RECORDS`] is rejected),
    /// `acc_infile` to `avrSwap[49]` characters, `avc_outname` to `avrSwap[63]` characters and
    /// `avc_msg` to `min(256, avrSwap[48])` characters.
    /// Null pointers are tolerated.
    pub unsafe fn call(
        &self,
        load: ConfigLoader,
        avr_swap: *mut f32,
        avi_fail: *mut c_int,
        acc_infile: *const c_char,
        avc_outname: *mut c_char,
        avc_msg: *mut c_char,
    ) {
        if avr_swap.is_null() {
            if !avi_fail.is_null() {
                *avi_fail = -1;
            }
            return;
        }
        let first_log = first_log_record(*avr_swap.add(FIRST_LOG_RECORD));
        let report = match first_log {
            Some(first) if first + Signal::LOGS.len() > MAX_RECORDS => Report::failure(
                SwapError::OutOfRange(first, MAX_RECORDS).to_string(),
                String::new(),
            ),
            _ => {
                let len = first_log
                    .map(|first| first + Signal::LOGS.len())
                    .unwrap_or_default()
                    .max(SwapSchema::extended().required_len());
                let swap = std::slice::from_raw_parts_mut(avr_swap, len);
                let infile = if acc_infile.is_null() {
                    String::new()
                } else {
                    let n = (nint(swap[INFILE_LENGTH]).max(0) as usize).min(MAX_INFILE_LENGTH);
                    let bytes = std::slice::from_raw_parts(acc_infile as *const u8, n);
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(n);
                    String::from_utf8_lossy(&bytes[..end]).into_owned()
                };
                self.dispatch(load, swap, infile.trim_end())
            }
        };
        if !avi_fail.is_null() {
            *avi_fail = report.fail;
        }
        let outname_cap = nint(*avr_swap.add(OUTNAME_CAPACITY)).max(0) as usize;
        write_c_string(avc_outname, &report.outname, outname_cap);
        let msg_cap =
            (nint(*avr_swap.add(MESSAGE_LENGTH)).max(0) as usize).min(MESSAGE_CAPACITY);
        write_c_string(avc_msg, &report.message, msg_cap);
    }
}

/// Generates the `DISCON` entry point of a controller model
///
/// The model type must implement [`Model`](crate::Model) and `Send`.
/// The configuration is loaded with [`DisconConfig::from_env`](crate::DisconConfig::from_env)
/// unless a [`ConfigLoader`](crate::config::ConfigLoader) is given:
/// ```ignore
/// discon::export_discon!(MyModel, || Ok(discon::DisconConfig::default()));
/// ```
#[macro_export]
macro_rules! export_discon {
    ($model:ty, $config:expr) => {
        static DISCON_CELL: $crate::DisconCell<$model> = $crate::DisconCell::new();

        /// Bladed external controller entry point
        ///
        /// # Safety
        ///
        /// The pointers are provided by Bladed and must satisfy the requirements of `DisconCell::call`
        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn DISCON(
            avrSwap: *mut f32,
            aviFail: *mut ::std::os::raw::c_int,
            accInfile: *const ::std::os::raw::c_char,
            avcOutname: *mut ::std::os::raw::c_char,
            avcMsg: *mut ::std::os::raw::c_char,
        ) {
            DISCON_CELL.call($config, avrSwap, aviFail, accInfile, avcOutname, avcMsg)
        }
    };
    ($model:ty) => {
        $crate::export_discon!($model, $crate::DisconConfig::from_env);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ConfigError, ParameterSource},
        controller::{INITIALIZED, STOPPED},
        io::Signal,
        scheduler::Tasking,
        timing::{SampleTime, Timing},
        DisconConfig, DisconError, IOTags, Passthrough,
    };
    use std::{ffi::CStr, thread, time::Duration};

    fn config() -> Result<DisconConfig, DisconError<ConfigError>> {
        Ok(DisconConfig::default().parameters(ParameterSource::None))
    }

    fn host_buffer(status: f32) -> Vec<f32> {
        let mut swap = vec![0f32; 200];
        swap[0] = status;
        swap[2] = 0.01;
        swap[22] = 800.0;
        swap[48] = 256.0;
        swap[62] = 171.0;
        swap[63] = 1024.0;
        swap
    }

    struct Grenade(Passthrough);
    impl IOTags for Grenade {
        fn outputs_tags(&self) -> Vec<Signal> {
            self.0.outputs_tags()
        }
        fn inputs_tags(&self) -> Vec<Signal> {
            self.0.inputs_tags()
        }
    }
    impl Model for Grenade {
        const NAME: &'static str = "grenade";
        fn register() -> Self {
            Grenade(Passthrough::register())
        }
        fn error_status(&self) -> Option<&str> {
            None
        }
        fn initialize_sample_times(&mut self) -> Vec<SampleTime> {
            self.0.initialize_sample_times()
        }
        fn step_size(&self) -> f64 {
            self.0.step_size()
        }
        fn u_mut(&mut self) -> &mut [f64] {
            self.0.u_mut()
        }
        fn y(&self) -> &[f64] {
            self.0.y()
        }
        fn outputs(&mut self, _tid: usize, _timing: &Timing) {
            panic!("pin pulled")
        }
        fn update(&mut self, tid: usize, timing: &Timing) {
            self.0.update(tid, timing)
        }
    }

    #[test]
    fn reentry_is_an_isr_overrun() {
        let cell: DisconCell<Passthrough> = DisconCell::new();
        assert_eq!(cell.dispatch(config, &mut host_buffer(0.0), "").fail, 0);
        assert_eq!(cell.dispatch(config, &mut host_buffer(1.0), "").fail, 0);
        cell.base_rate.store(true, Ordering::SeqCst);
        let report = cell.dispatch(config, &mut host_buffer(1.0), "");
        assert_eq!(report.fail, -1);
        assert_eq!(
            report.message,
            "passthrough: ISR overrun - base sampling rate is too fast"
        );
        cell.base_rate.store(false, Ordering::SeqCst);
        let report = cell.dispatch(config, &mut host_buffer(1.0), "");
        assert_eq!(report.fail, -1);
        assert_eq!(
            report.message,
            "passthrough: ISR overrun - base sampling rate is too fast"
        );
        let slot = cell.slot.lock().unwrap();
        let discon = slot.as_ref().unwrap();
        assert_eq!(discon.steps(), 1);
        assert!(discon.scheduler().is_stopped());
        assert_eq!(discon.model().calls().outputs.len(), 1);
    }

    /// Takes its time to service one task
    struct Sluggish {
        model: Passthrough,
        tid: usize,
    }
    impl IOTags for Sluggish {
        fn outputs_tags(&self) -> Vec<Signal> {
            self.model.outputs_tags()
        }
        fn inputs_tags(&self) -> Vec<Signal> {
            self.model.inputs_tags()
        }
    }
    impl Model for Sluggish {
        const NAME: &'static str = "sluggish";
        fn register() -> Self {
            Sluggish {
                model: Passthrough::register().sampling(0.01, &[1, 2]),
                tid: 1,
            }
        }
        fn error_status(&self) -> Option<&str> {
            self.model.error_status()
        }
        fn initialize_sample_times(&mut self) -> Vec<SampleTime> {
            self.model.initialize_sample_times()
        }
        fn step_size(&self) -> f64 {
            self.model.step_size()
        }
        fn u_mut(&mut self) -> &mut [f64] {
            self.model.u_mut()
        }
        fn y(&self) -> &[f64] {
            self.model.y()
        }
        fn outputs(&mut self, tid: usize, timing: &Timing) {
            if tid == self.tid && self.model.calls().outputs.len() < 2 {
                thread::sleep(Duration::from_millis(300));
            }
            self.model.outputs(tid, timing)
        }
        fn update(&mut self, tid: usize, timing: &Timing) {
            self.model.update(tid, timing)
        }
    }

    fn multitasking() -> Result<DisconConfig, DisconError<ConfigError>> {
        Ok(DisconConfig::default()
            .parameters(ParameterSource::None)
            .tasking(Tasking::MultiTasking))
    }

    #[test]
    fn base_rate_call_while_slow_tasks_run() {
        let cell: DisconCell<Sluggish> = DisconCell::new();
        assert_eq!(cell.dispatch(multitasking, &mut host_buffer(0.0), "").fail, 0);
        thread::scope(|s| {
            let first = s.spawn(|| cell.dispatch(multitasking, &mut host_buffer(1.0), ""));
            thread::sleep(Duration::from_millis(100));
            let second = cell.dispatch(multitasking, &mut host_buffer(1.0), "");
            assert_eq!(second.fail, 0, "{}", second.message);
            assert_eq!(first.join().unwrap().fail, 0);
        });
        let report = cell.dispatch(multitasking, &mut host_buffer(1.0), "");
        assert_eq!(report.fail, 0, "{}", report.message);
        let slot = cell.slot.lock().unwrap();
        let discon = slot.as_ref().unwrap();
        assert_eq!(discon.steps(), 3);
        assert!(!discon.scheduler().is_stopped());
        assert_eq!(discon.scheduler().state().isr_overrun, 0);
        assert_eq!(discon.model().model.calls().outputs, vec![0, 1, 0, 0, 1]);
    }

    #[test]
    fn base_rate_call_while_base_rate_runs() {
        let cell: DisconCell<Sluggish> = DisconCell::new();
        assert_eq!(cell.dispatch(multitasking, &mut host_buffer(0.0), "").fail, 0);
        cell.slot.lock().unwrap().as_mut().unwrap().model.tid = 0;
        thread::scope(|s| {
            let first = s.spawn(|| cell.dispatch(multitasking, &mut host_buffer(1.0), ""));
            thread::sleep(Duration::from_millis(100));
            let second = cell.dispatch(multitasking, &mut host_buffer(1.0), "");
            assert_eq!(second.fail, -1);
            assert_eq!(
                second.message,
                "sluggish: ISR overrun - base sampling rate is too fast"
            );
            assert_eq!(first.join().unwrap().fail, 0);
        });
        let report = cell.dispatch(multitasking, &mut host_buffer(1.0), "");
        assert_eq!(report.fail, -1);
        let slot = cell.slot.lock().unwrap();
        let discon = slot.as_ref().unwrap();
        assert_eq!(discon.steps(), 1);
        assert!(discon.scheduler().is_stopped());
    }

    #[test]
    fn first_logging_record_out_of_range() {
        let cell: DisconCell<Passthrough> = DisconCell::new();
        let mut fail: c_int = 0;
        let mut msg = vec![1 as c_char; 256];
        let mut swap = host_buffer(0.0);
        swap[62] = 1e30;
        unsafe {
            cell.call(
                config,
                swap.as_mut_ptr(),
                &mut fail,
                std::ptr::null(),
                std::ptr::null_mut(),
                msg.as_mut_ptr(),
            );
        }
        assert_eq!(fail, -1);
        let message = unsafe { CStr::from_ptr(msg.as_ptr()) };
        assert!(message
            .to_str()
            .unwrap()
            .starts_with("first logging record"));
        assert!(!cell.is_initialized());
    }

    #[test]
    fn panics_are_contained() {
        let cell: DisconCell<Grenade> = DisconCell::new();
        assert_eq!(cell.dispatch(config, &mut host_buffer(0.0), "").fail, 0);
        let report = cell.dispatch(config, &mut host_buffer(1.0), "");
        assert_eq!(report.fail, -1);
        assert_eq!(report.message, "grenade panicked: pin pulled");
        assert!(!cell.is_initialized());
        let report = cell.dispatch(config, &mut host_buffer(1.0), "");
        assert_eq!(report.message, "the controller has not been initialized");
    }

    #[test]
    fn raw_call() {
        let cell: DisconCell<Passthrough> = DisconCell::new();
        let mut fail: c_int = 1;
        let mut outname = vec![1 as c_char; 1024];
        let mut msg = vec![1 as c_char; 256];
        let infile = b"discon.in\0";
        let mut swap = host_buffer(0.0);
        swap[49] = infile.len() as f32;
        unsafe {
            cell.call(
                config,
                swap.as_mut_ptr(),
                &mut fail,
                infile.as_ptr() as *const c_char,
                outname.as_mut_ptr(),
                msg.as_mut_ptr(),
            );
        }
        assert_eq!(fail, 0);
        let message = unsafe { CStr::from_ptr(msg.as_ptr()) };
        assert_eq!(message.to_str().unwrap(), INITIALIZED);
        let names = unsafe { CStr::from_ptr(outname.as_ptr()) };
        assert!(names.to_str().unwrap().starts_with("Log1:-;Log2:-;"));
        assert_eq!(swap[46], 800.0);

        swap[0] = -1.0;
        swap[48] = 8.0;
        unsafe {
            cell.call(
                config,
                swap.as_mut_ptr(),
                &mut fail,
                std::ptr::null(),
                std::ptr::null_mut(),
                msg.as_mut_ptr(),
            );
        }
        assert_eq!(fail, 0);
        let message = unsafe { CStr::from_ptr(msg.as_ptr()) };
        assert_eq!(message.to_str().unwrap(), &STOPPED[..7]);
        assert!(!cell.is_initialized());
    }

    #[test]
    fn invalid_status_message() {
        let cell: DisconCell<Passthrough> = DisconCell::new();
        let report = cell.dispatch(config, &mut host_buffer(-5.0), "");
        assert_eq!(report.fail, -1);
        assert_eq!(report.message, "iStatus is not recognized: -5");
    }
}
