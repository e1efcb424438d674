//! DISCON inputs/outputs
//!
//! Provides the definitions of all the named ports of the controller model,
//! each identified by the port name of the generated model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Port direction seen from the controller model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Input,
    Output,
}

macro_rules! build_io {
    (inputs: ($($input:ident: $input_name:expr),+),
     user: ($user:ident: $user_name:literal, $($user_n:literal)+),
     outputs: ($($output:ident: $output_name:expr),+),
     logs: ($log:ident: $log_name:literal, $($log_n:literal)+)) => {
        paste::paste! {
            /// Controller model inputs/outputs definition
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            pub enum Signal {
                $($input,)+
                $([<$user $user_n>],)+
                $($output,)+
                $([<$log $log_n>],)+
            }
            impl Signal {
                /// Model inputs
                pub const INPUTS: &'static [Signal] = &[$(Signal::$input,)+ $(Signal::[<$user $user_n>],)+];
                /// Model outputs
                pub const OUTPUTS: &'static [Signal] = &[$(Signal::$output,)+ $(Signal::[<$log $log_n>],)+];
                /// User defined variables, numbered from 1
                pub const USER_VARIABLES: &'static [Signal] = &[$(Signal::[<$user $user_n>]),+];
                /// Logging channels, numbered from 1
                pub const LOGS: &'static [Signal] = &[$(Signal::[<$log $log_n>]),+];
                /// Returns the port name in the generated model
                pub fn name(&self) -> &'static str {
                    match self {
                        $(Signal::$input => $input_name,)+
                        $(Signal::[<$user $user_n>] => concat!($user_name, $user_n),)+
                        $(Signal::$output => $output_name,)+
                        $(Signal::[<$log $log_n>] => concat!($log_name, $log_n),)+
                    }
                }
            }
        }
    };
}

build_io!(
    inputs:
        (
            // Call phase status as sent by Bladed
            Init: "Init",
            GeneratorSpeed: "Generator_Speed",
            RatedSpeed: "Rated_Speed",
            BelowRatedPitchAngle: "Below_Rated_Pitch_Angle",
            ForeAftTowerAccel: "Fore_Aft_Tower_Accel",
            SidewardsTowerAccel: "Sidewards_Tower_Accel",
            MeasuredPitch: "Measured_Pitch",
            MeasuredTorque: "Measured_Torque",
            ShaftTorque: "Shaft_Torque",
            ModeGain: "Mode_Gain",
            RotorAzimuthAngle: "Rotor_Azimuth_Angle",
            // Blade root moments, out of plane
            Blade1OPRootMoment: "Blade1_OP_Root_Moment",
            Blade2OPRootMoment: "Blade2_OP_Root_Moment",
            Blade3OPRootMoment: "Blade3_OP_Root_Moment",
            // Blade root moments, in plane
            Blade1IPRootMoment: "Blade1_IP_Root_Moment",
            Blade2IPRootMoment: "Blade2_IP_Root_Moment",
            Blade3IPRootMoment: "Blade3_IP_Root_Moment",
            YawError: "YawError",
            YawBearingRate: "YawBearingRate",
            ElectricalPower: "ElectricalPower"
        ),
    user: (UserVar: "userVar", 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20),
    outputs:
        (
            GeneratorTorque: "Generator_Torque",
            Blade1PitchAngle: "Blade1_Pitch_Angle",
            Blade2PitchAngle: "Blade2_Pitch_Angle",
            Blade3PitchAngle: "Blade3_Pitch_Angle",
            CollectivePitchAngle: "Collective_Pitch_Angle",
            YawRate: "Yaw_Rate"
        ),
    logs: (Log: "Log", 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20)
);

impl Signal {
    /// Returns the port direction
    pub fn kind(&self) -> Kind {
        if Signal::INPUTS.contains(self) {
            Kind::Input
        } else {
            Kind::Output
        }
    }
    /// Returns the `n`th user variable, `n` starting at 1
    pub fn user_variable(n: usize) -> Option<Signal> {
        n.checked_sub(1)
            .and_then(|i| Signal::USER_VARIABLES.get(i))
            .copied()
    }
    /// Returns the `n`th logging channel, `n` starting at 1
    pub fn log(n: usize) -> Option<Signal> {
        n.checked_sub(1).and_then(|i| Signal::LOGS.get(i)).copied()
    }
    /// Finds a signal from its port name
    pub fn from_name(name: &str) -> Option<Signal> {
        Signal::INPUTS
            .iter()
            .chain(Signal::OUTPUTS.iter())
            .find(|s| s.name() == name)
            .copied()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_families() {
        assert_eq!(Signal::user_variable(1), Some(Signal::UserVar1));
        assert_eq!(Signal::user_variable(20), Some(Signal::UserVar20));
        assert_eq!(Signal::user_variable(0), None);
        assert_eq!(Signal::user_variable(21), None);
        assert_eq!(Signal::log(7), Some(Signal::Log7));
        assert_eq!(Signal::UserVar12.name(), "userVar12");
        assert_eq!(Signal::Log20.name(), "Log20");
    }

    #[test]
    fn kinds_and_names() {
        assert_eq!(Signal::INPUTS.len(), 40);
        assert_eq!(Signal::OUTPUTS.len(), 26);
        assert_eq!(Signal::GeneratorSpeed.kind(), Kind::Input);
        assert_eq!(Signal::UserVar3.kind(), Kind::Input);
        assert_eq!(Signal::GeneratorTorque.kind(), Kind::Output);
        assert_eq!(Signal::Log1.kind(), Kind::Output);
        assert_eq!(
            Signal::from_name("Blade2_OP_Root_Moment"),
            Some(Signal::Blade2OPRootMoment)
        );
        assert_eq!(Signal::from_name("Wind_Speed"), None);
        assert_eq!(Signal::Blade3PitchAngle.to_string(), "Blade3_Pitch_Angle");
    }
}
