use discon::{
    config::{ConfigError, Layout, ParameterSource},
    controller::{dispatch, STOPPED},
    io::Signal,
    scheduler::Tasking,
    telltale::TimeSeries,
    DataLogging, Discon, DisconConfig, DisconError, Model, Passthrough,
};
use std::fs::File;

fn host_buffer(status: f32) -> Vec<f32> {
    let mut swap = vec![0f32; 200];
    swap[0] = status;
    swap[2] = 0.01;
    swap[62] = 171.;
    swap
}

fn load() -> Result<DisconConfig, DisconError<ConfigError>> {
    Ok(DisconConfig::default().parameters(ParameterSource::None))
}

fn multirate_controller(config: DisconConfig, log: DataLogging) -> Discon<Passthrough> {
    let model = Passthrough::register().sampling(0.01, &[1, 2, 5]);
    Discon::initialize_with(model, log.build(), config, &host_buffer(0.), "")
        .map_err(|e| e.to_string())
        .unwrap()
}

#[test]
fn multirate_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telltale.pkl");
    let config = DisconConfig::default()
        .tasking(Tasking::MultiTasking)
        .parameters(ParameterSource::None);
    let mut discon = multirate_controller(
        config,
        DataLogging::new().key(Signal::GeneratorTorque).pickle(&path),
    );
    assert_eq!(discon.steps(), 0);
    assert!(discon.model().calls().outputs.is_empty());

    let n = 19;
    let mut swap = host_buffer(1.);
    for k in 0..n {
        swap[22] = k as f32;
        discon.step(&swap).unwrap();
        discon.write_outputs(&mut swap).unwrap();
        assert_eq!(swap[46], k as f32);
        let state = discon.scheduler().state();
        assert_eq!(state.isr_overrun, 0);
        assert!(state.event_flags.iter().all(|&e| e == 0));
    }
    swap[0] = -1.;
    swap[22] = n as f32;
    discon.step(&swap).unwrap();
    discon.cleanup().unwrap();

    assert_eq!(discon.steps(), n + 1);
    let calls = discon.model().calls();
    assert_eq!(calls.terminates, 1);
    let count = |tid: usize| calls.outputs.iter().filter(|&&t| t == tid).count();
    assert_eq!(count(0), 20);
    assert_eq!(count(1), 10);
    assert_eq!(count(2), 4);
    assert_eq!(calls.outputs.len(), calls.updates.len());
    assert!((discon.timing().task_time(2) - 0.2).abs() < 1e-9);

    let data: Vec<(String, TimeSeries)> =
        serde_pickle::from_reader(File::open(&path).unwrap()).unwrap();
    assert_eq!(data.len(), 1);
    let (name, series) = &data[0];
    assert_eq!(name, "Generator_Torque");
    assert_eq!(series.len(), 20);
    assert_eq!(series[7].1, 7.);
    assert!((series[7].0 - 0.07).abs() < 1e-9);
}

#[test]
fn standard_layout_session() {
    let config = DisconConfig::default()
        .layout(Layout::Standard)
        .parameters(ParameterSource::None);
    let mut discon = multirate_controller(config, DataLogging::new());
    let mut swap = host_buffer(1.);
    swap[22] = 0.1;
    swap[3] = -0.3;
    swap[47] = 9.;
    swap[180] = 9.;
    discon.step(&swap).unwrap();
    discon.write_outputs(&mut swap).unwrap();
    assert_eq!(swap[46].to_bits(), 0.1f32.to_bits());
    assert_eq!(swap[43].to_bits(), (-0.3f32).to_bits());
    assert_eq!(swap[47], 0.);
    assert_eq!(swap[64], 0.);
    assert_eq!(swap[180], 9.);
    assert!(discon.adapter().log_names().is_empty());
    discon.cleanup().unwrap();
}

#[test]
fn failed_initialization_leaves_no_controller() {
    let mut slot: Option<Discon<Passthrough>> = None;
    let mut swap = host_buffer(0.);
    swap[62] = 0.;
    dispatch(&mut slot, load, &mut swap, "").unwrap();
    let mut short = vec![1f32; 100];
    assert!(dispatch(&mut slot, load, &mut short, "").is_err());
    let reply = dispatch(&mut slot, load, &mut host_buffer(-1.), "").unwrap();
    assert_eq!(reply.message, STOPPED);

    let mut short = vec![0f32; 100];
    let e = dispatch(&mut slot, load, &mut short, "").unwrap_err();
    assert_eq!(
        e.to_string(),
        "exchange buffer too short: 163 records expected, found 100"
    );
    assert!(slot.is_none());
}
