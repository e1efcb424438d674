//! Call phase of a host call, from the status record of the exchange buffer

use crate::swap::nint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallPhase {
    /// First call of the simulation
    Initialize,
    /// Regular time step
    Step,
    /// Last time step, the controller is terminated after it
    FinalStep,
    /// Unrecognized status
    Invalid(f32),
}
impl CallPhase {
    /// Classifies the status record, rounded to the nearest integer
    pub fn classify(status: f32) -> Self {
        if !status.is_finite() {
            return CallPhase::Invalid(status);
        }
        match nint(status) {
            0 => CallPhase::Initialize,
            n if n > 0 => CallPhase::Step,
            -1 => CallPhase::FinalStep,
            _ => CallPhase::Invalid(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        assert_eq!(CallPhase::classify(0.), CallPhase::Initialize);
        assert_eq!(CallPhase::classify(0.4), CallPhase::Initialize);
        assert_eq!(CallPhase::classify(-0.4), CallPhase::Initialize);
        assert_eq!(CallPhase::classify(1.), CallPhase::Step);
        assert_eq!(CallPhase::classify(0.6), CallPhase::Step);
        assert_eq!(CallPhase::classify(7.), CallPhase::Step);
        assert_eq!(CallPhase::classify(-1.), CallPhase::FinalStep);
        assert_eq!(CallPhase::classify(-1.3), CallPhase::FinalStep);
        assert_eq!(CallPhase::classify(-2.), CallPhase::Invalid(-2.));
        assert!(matches!(
            CallPhase::classify(f32::NAN),
            CallPhase::Invalid(x) if x.is_nan()
        ));
        assert_eq!(
            CallPhase::classify(f32::INFINITY),
            CallPhase::Invalid(f32::INFINITY)
        );
    }
}
