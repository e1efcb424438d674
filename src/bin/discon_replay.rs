use discon::{
    config::{ConfigError, ParameterSource},
    swap::{COMMUNICATION_INTERVAL, FIRST_LOG_RECORD, MESSAGE_LENGTH, OUTNAME_CAPACITY, STATUS, TIME},
    DisconCell, DisconConfig, DisconError, Passthrough,
};
use simple_logger::SimpleLogger;
use std::{env, error::Error, f32::consts::PI, time::Instant};

struct Timer {
    time: Instant,
}
impl Timer {
    pub fn tic() -> Self {
        Self {
            time: Instant::now(),
        }
    }
    pub fn toc(self) -> f64 {
        self.time.elapsed().as_secs_f64()
    }
    pub fn print_toc(self) {
        println!("... in {:3}s", self.toc());
    }
}

const STEP_SIZE: f32 = 0.01;

fn config() -> Result<DisconConfig, DisconError<ConfigError>> {
    Ok(DisconConfig::default()
        .parameters(ParameterSource::None)
        .telltale("discon_replay.pkl"))
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;
    let n_step = env::var("DISCON_STEPS")
        .ok()
        .map(|n| n.parse::<usize>())
        .transpose()?
        .unwrap_or(1000);

    let cell: DisconCell<Passthrough> = DisconCell::new();
    let mut swap = vec![0f32; 200];
    swap[COMMUNICATION_INTERVAL] = STEP_SIZE;
    swap[MESSAGE_LENGTH] = 256.;
    swap[FIRST_LOG_RECORD] = 171.;
    swap[OUTNAME_CAPACITY] = 1024.;

    println!("Replaying {} steps ...", n_step);
    let tic = Timer::tic();
    for k in 0..=n_step + 1 {
        let t = k as f32 * STEP_SIZE;
        swap[STATUS] = match k {
            0 => 0.,
            k if k > n_step => -1.,
            _ => 1.,
        };
        swap[TIME] = t;
        // measured pitch
        swap[3] = 0.05 * (2. * PI * 0.1 * t).sin();
        // generator speed
        swap[19] = 120. + 5. * (2. * PI * 0.5 * t).sin();
        // measured torque
        swap[22] = 4e4 + 1e3 * (2. * PI * 0.2 * t).cos();
        // user variable #1
        swap[119] = t;
        let report = cell.dispatch(config, &mut swap, "");
        if report.fail < 0 {
            return Err(report.message.into());
        }
        if !report.message.is_empty() {
            println!("{}", report.message);
        }
    }
    tic.print_toc();

    println!(
        "Demands: torque {:.1}N.m, pitch {:.4}rd, log#1 {:.2}",
        swap[46], swap[41], swap[170]
    );
    Ok(())
}
