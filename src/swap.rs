//! Exchange buffer schema
//!
//! The Bladed exchange buffer `avrSwap` is a flat array of `f32` records.
//! A [`SwapSchema`] maps the named [`Signal`]s of the controller model to these records,
//! and lists the constant records written back to the host at every call.
//! Record indices are 0-based.

use crate::{config::Layout, io::Kind, io::Signal, DisconError};
use std::{collections::BTreeSet, fmt};

/// Call phase status
pub const STATUS: usize = 0;
/// Current time
pub const TIME: usize = 1;
/// Communication interval
pub const COMMUNICATION_INTERVAL: usize = 2;
/// Maximum number of characters in the message
pub const MESSAGE_LENGTH: usize = 48;
/// Number of characters in the `accInfile` string
pub const INFILE_LENGTH: usize = 49;
/// Maximum number of characters in the `avcOutname` string
pub const OUTNAME_LENGTH: usize = 50;
/// 1-based record of the first logging channel
pub const FIRST_LOG_RECORD: usize = 62;
/// Maximum number of characters of the logging channel names
pub const OUTNAME_CAPACITY: usize = 63;
/// Number of logging channels returned to the host
pub const LOG_COUNT: usize = 64;
/// Records the controller never writes to
pub const RESERVED: [usize; 6] = [
    STATUS,
    MESSAGE_LENGTH,
    INFILE_LENGTH,
    OUTNAME_LENGTH,
    FIRST_LOG_RECORD,
    OUTNAME_CAPACITY,
];

/// Largest exchange buffer accepted from the host
pub const MAX_RECORDS: usize = 4096;

/// Nearest integer of a record
pub fn nint(x: f32) -> i64 {
    x.round() as i64
}

/// 0-based record of the first logging channel from the value of record [`FIRST_LOG_RECORD`]
///
/// A host that has no room for logging channels sends 0
pub fn first_log_record(x: f32) -> Option<usize> {
    match nint(x) - 1 {
        n if n > LOG_COUNT as i64 => Some(n as usize),
        _ => None,
    }
}

#[derive(Debug, PartialEq)]
pub enum SwapError {
    Reserved(Signal, usize),
    Duplicate(usize),
    Direction(Signal),
    MissingOutput(Signal),
    LogOverlap(Signal, usize),
    OutOfRange(usize, usize),
    TooShort { expected: usize, found: usize },
}
impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SwapError::*;
        match self {
            Reserved(signal, record) => {
                write!(f, "{} cannot be written to reserved record {}", signal, record)
            }
            Duplicate(record) => write!(f, "record {} is written more than once", record),
            Direction(signal) => write!(f, "{} is mapped in the wrong direction", signal),
            MissingOutput(signal) => write!(f, "the model has no {} output", signal),
            LogOverlap(signal, record) => write!(
                f,
                "logging channel {} overlaps with record {}",
                signal, record
            ),
            OutOfRange(first, max) => write!(
                f,
                "first logging record {} is out of range, the exchange buffer is limited to {} records",
                first, max
            ),
            TooShort { expected, found } => write!(
                f,
                "exchange buffer too short: {} records expected, found {}",
                expected, found
            ),
        }
    }
}
type Result<T> = std::result::Result<T, DisconError<SwapError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to model
    Input,
    /// Model to host
    Output,
}

/// Location of a signal in the exchange buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Fixed record
    Record(usize),
    /// Logging channel, relative to the first logging record given by the host
    Log(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub signal: Signal,
    pub cell: Cell,
    pub direction: Direction,
}
impl Field {
    pub fn input(signal: Signal, record: usize) -> Self {
        Self {
            signal,
            cell: Cell::Record(record),
            direction: Direction::Input,
        }
    }
    pub fn output(signal: Signal, record: usize) -> Self {
        Self {
            signal,
            cell: Cell::Record(record),
            direction: Direction::Output,
        }
    }
    pub fn log(signal: Signal, channel: usize) -> Self {
        Self {
            signal,
            cell: Cell::Log(channel),
            direction: Direction::Output,
        }
    }
}

/// Exchange buffer layout
#[derive(Debug, Clone)]
pub struct SwapSchema {
    layout: Layout,
    fields: Vec<Field>,
    constants: Vec<(usize, f32)>,
    seeds: Vec<(Signal, Signal)>,
    mandatory: Vec<Signal>,
}
impl SwapSchema {
    /// Core turbine measurements and demands
    pub fn standard() -> Self {
        use Signal::*;
        Self {
            layout: Layout::Standard,
            fields: vec![
                Field::input(MeasuredPitch, 3),
                Field::input(BelowRatedPitchAngle, 4),
                Field::input(ModeGain, 15),
                Field::input(RatedSpeed, 18),
                Field::input(GeneratorSpeed, 19),
                Field::input(MeasuredTorque, 22),
                Field::input(Blade1OPRootMoment, 29),
                Field::input(Blade2OPRootMoment, 30),
                Field::input(Blade3OPRootMoment, 31),
                Field::input(ForeAftTowerAccel, 52),
                Field::input(SidewardsTowerAccel, 53),
                Field::input(RotorAzimuthAngle, 59),
                Field::output(Blade1PitchAngle, 41),
                Field::output(Blade2PitchAngle, 42),
                Field::output(Blade3PitchAngle, 43),
                Field::output(GeneratorTorque, 46),
            ],
            constants: vec![
                // individual pitch control
                (27, 1.),
                // generator contactor
                (34, 1.),
                (35, 0.),
                (40, 0.),
                // nacelle yaw rate demand
                (47, 0.),
                (54, 0.),
                (55, 0.),
                (LOG_COUNT, 0.),
                (71, 0.),
                // request for loads
                (78, 1.),
                (79, 0.),
                (80, 0.),
            ],
            seeds: vec![
                (GeneratorTorque, MeasuredTorque),
                (Blade1PitchAngle, MeasuredPitch),
                (Blade2PitchAngle, MeasuredPitch),
                (Blade3PitchAngle, MeasuredPitch),
            ],
            mandatory: vec![
                GeneratorTorque,
                Blade1PitchAngle,
                Blade2PitchAngle,
                Blade3PitchAngle,
            ],
        }
    }
    /// Standard layout with user variables, logging channels and yaw control
    pub fn extended() -> Self {
        use Signal::*;
        let mut schema = Self::standard();
        schema.layout = Layout::Extended;
        schema.fields.extend(vec![
            Field::input(Init, STATUS),
            Field::input(ElectricalPower, 14),
            Field::input(YawError, 23),
            Field::input(Blade1IPRootMoment, 68),
            Field::input(Blade2IPRootMoment, 69),
            Field::input(Blade3IPRootMoment, 70),
            Field::input(ShaftTorque, 108),
            Field::input(YawBearingRate, 162),
            Field::output(CollectivePitchAngle, 44),
            Field::output(YawRate, 47),
        ]);
        schema.fields.extend(
            Signal::USER_VARIABLES
                .iter()
                .enumerate()
                .map(|(k, &signal)| Field::input(signal, 119 + k)),
        );
        schema.fields.extend(
            Signal::LOGS
                .iter()
                .enumerate()
                .map(|(k, &signal)| Field::log(signal, k)),
        );
        schema
            .constants
            .retain(|&(record, _)| record != 47 && record != LOG_COUNT);
        // pitch angle
        schema.constants.insert(0, (9, 0.));
        schema.seeds.push((CollectivePitchAngle, MeasuredPitch));
        schema
    }
    pub fn from_layout(layout: Layout) -> Self {
        match layout {
            Layout::Standard => Self::standard(),
            Layout::Extended => Self::extended(),
        }
    }
    pub fn layout(&self) -> Layout {
        self.layout
    }
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
    pub fn constants(&self) -> &[(usize, f32)] {
        &self.constants
    }
    /// Pairs of (output, input) with the output initialized to the input at start-up
    pub fn seeds(&self) -> &[(Signal, Signal)] {
        &self.seeds
    }
    pub fn is_mandatory(&self, signal: Signal) -> bool {
        self.mandatory.contains(&signal)
    }
    /// Returns true if the layout returns logging channels
    pub fn has_logs(&self) -> bool {
        self.fields.iter().any(|f| matches!(f.cell, Cell::Log(_)))
    }
    /// Record of an input signal
    pub fn input_record(&self, signal: Signal) -> Option<usize> {
        self.fields.iter().find_map(|f| match (f.direction, f.cell) {
            (Direction::Input, Cell::Record(r)) if f.signal == signal => Some(r),
            _ => None,
        })
    }
    /// Number of fixed records used by the layout
    pub fn required_len(&self) -> usize {
        self.fields
            .iter()
            .filter_map(|f| match f.cell {
                Cell::Record(r) => Some(r),
                Cell::Log(_) => None,
            })
            .chain(self.constants.iter().map(|(r, _)| *r))
            .chain(self.has_logs().then(|| LOG_COUNT))
            .max()
            .map_or(0, |r| r + 1)
    }
    /// Checks that the schema directions match the signals and that no record is written twice
    /// or is reserved
    pub fn validate(&self) -> Result<()> {
        let mut written = BTreeSet::new();
        for field in &self.fields {
            let kind = match field.direction {
                Direction::Input => Kind::Input,
                Direction::Output => Kind::Output,
            };
            if field.signal.kind() != kind {
                return Err(DisconError::Component(SwapError::Direction(field.signal)));
            }
            match (field.direction, field.cell) {
                (Direction::Input, Cell::Log(_)) => {
                    return Err(DisconError::Component(SwapError::Direction(field.signal)))
                }
                (Direction::Output, Cell::Record(r)) => {
                    if RESERVED.contains(&r) || (self.has_logs() && r == LOG_COUNT) {
                        return Err(DisconError::Component(SwapError::Reserved(
                            field.signal,
                            r,
                        )));
                    }
                    if !written.insert(r) {
                        return Err(DisconError::Component(SwapError::Duplicate(r)));
                    }
                }
                _ => (),
            }
        }
        for &(record, _) in &self.constants {
            if RESERVED.contains(&record) || !written.insert(record) {
                return Err(DisconError::Component(SwapError::Duplicate(record)));
            }
        }
        Ok(())
    }
}
