//! Wizard step machine — which step comes next given the branch flags.

use serde::{Deserialize, Serialize};

/// The steps of the application wizard.
///
/// Steps 2–7 exist only on the licensed path; step 6 only when the applicant
/// brings their own vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Identity,
    Badge,
    Licence,
    Documents,
    VehicleOwnership,
    VehicleDetails,
    Review,
}

/// The two branch flags that shape the flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Branches {
    pub is_licensed_driver: bool,
    pub has_own_vehicle: bool,
}

/// What advancing from a step leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Move to the next step.
    Next(WizardStep),
    /// Unlicensed branch: create the account and minimal record, then show
    /// the progress dashboard.
    FinalizeUnlicensed,
    /// Licensed branch: run the full submission.
    Submit,
}

impl WizardStep {
    /// 1-based step number, persisted for resume.
    pub fn number(&self) -> u8 {
        match self {
            Self::Identity => 1,
            Self::Badge => 2,
            Self::Licence => 3,
            Self::Documents => 4,
            Self::VehicleOwnership => 5,
            Self::VehicleDetails => 6,
            Self::Review => 7,
        }
    }

    /// Inverse of [`number`](Self::number). Out-of-range values clamp to
    /// step 1 so a corrupt resume value cannot strand the applicant.
    pub fn from_number(n: u8) -> Self {
        match n {
            2 => Self::Badge,
            3 => Self::Licence,
            4 => Self::Documents,
            5 => Self::VehicleOwnership,
            6 => Self::VehicleDetails,
            7 => Self::Review,
            _ => Self::Identity,
        }
    }

    /// Where "Next" goes from this step, assuming validation passed.
    pub fn forward(&self, branches: Branches) -> StepOutcome {
        match self {
            Self::Identity => {
                if branches.is_licensed_driver {
                    StepOutcome::Next(Self::Badge)
                } else {
                    StepOutcome::FinalizeUnlicensed
                }
            }
            Self::Badge => StepOutcome::Next(Self::Licence),
            Self::Licence => StepOutcome::Next(Self::Documents),
            Self::Documents => StepOutcome::Next(Self::VehicleOwnership),
            Self::VehicleOwnership => {
                if branches.has_own_vehicle {
                    StepOutcome::Next(Self::VehicleDetails)
                } else {
                    // Skip vehicle details entirely
                    StepOutcome::Next(Self::Review)
                }
            }
            Self::VehicleDetails => StepOutcome::Next(Self::Review),
            Self::Review => StepOutcome::Submit,
        }
    }

    /// Where "Back" goes from this step. `None` at step 1.
    ///
    /// The vehicle-details skip works in reverse too: Back from Review lands
    /// on VehicleOwnership when there is no own vehicle.
    pub fn backward(&self, branches: Branches) -> Option<WizardStep> {
        match self {
            Self::Identity => None,
            Self::Badge => Some(Self::Identity),
            Self::Licence => Some(Self::Badge),
            Self::Documents => Some(Self::Licence),
            Self::VehicleOwnership => Some(Self::Documents),
            Self::VehicleDetails => Some(Self::VehicleOwnership),
            Self::Review => {
                if branches.has_own_vehicle {
                    Some(Self::VehicleDetails)
                } else {
                    Some(Self::VehicleOwnership)
                }
            }
        }
    }

    /// Total steps shown in the progress bar for the given branches.
    pub fn total_steps(branches: Branches) -> u8 {
        if !branches.is_licensed_driver {
            1
        } else if branches.has_own_vehicle {
            7
        } else {
            6
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Badge => "badge",
            Self::Licence => "licence",
            Self::Documents => "documents",
            Self::VehicleOwnership => "vehicle_ownership",
            Self::VehicleDetails => "vehicle_details",
            Self::Review => "review",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn licensed(own_vehicle: bool) -> Branches {
        Branches {
            is_licensed_driver: true,
            has_own_vehicle: own_vehicle,
        }
    }

    #[test]
    fn licensed_with_vehicle_walks_all_steps() {
        let branches = licensed(true);
        let expected = [
            WizardStep::Badge,
            WizardStep::Licence,
            WizardStep::Documents,
            WizardStep::VehicleOwnership,
            WizardStep::VehicleDetails,
            WizardStep::Review,
        ];
        let mut current = WizardStep::Identity;
        for next in expected {
            match current.forward(branches) {
                StepOutcome::Next(step) => {
                    assert_eq!(step, next);
                    current = step;
                }
                other => panic!("expected Next from {current}, got {other:?}"),
            }
        }
        assert_eq!(current.forward(branches), StepOutcome::Submit);
    }

    #[test]
    fn no_vehicle_skips_step_six_forward() {
        let outcome = WizardStep::VehicleOwnership.forward(licensed(false));
        assert_eq!(outcome, StepOutcome::Next(WizardStep::Review));
    }

    #[test]
    fn no_vehicle_skips_step_six_backward() {
        let back = WizardStep::Review.backward(licensed(false));
        assert_eq!(back, Some(WizardStep::VehicleOwnership));
    }

    #[test]
    fn own_vehicle_visits_step_six_both_directions() {
        let branches = licensed(true);
        assert_eq!(
            WizardStep::VehicleOwnership.forward(branches),
            StepOutcome::Next(WizardStep::VehicleDetails)
        );
        assert_eq!(
            WizardStep::Review.backward(branches),
            Some(WizardStep::VehicleDetails)
        );
    }

    #[test]
    fn unlicensed_finalizes_at_step_one() {
        let branches = Branches::default();
        assert_eq!(
            WizardStep::Identity.forward(branches),
            StepOutcome::FinalizeUnlicensed
        );
    }

    #[test]
    fn back_from_step_one_is_none() {
        assert_eq!(WizardStep::Identity.backward(licensed(true)), None);
    }

    #[test]
    fn number_roundtrip() {
        for n in 1..=7u8 {
            assert_eq!(WizardStep::from_number(n).number(), n);
        }
        // Corrupt values clamp to step 1
        assert_eq!(WizardStep::from_number(0), WizardStep::Identity);
        assert_eq!(WizardStep::from_number(42), WizardStep::Identity);
    }

    #[test]
    fn total_steps_per_branch() {
        assert_eq!(WizardStep::total_steps(Branches::default()), 1);
        assert_eq!(WizardStep::total_steps(licensed(false)), 6);
        assert_eq!(WizardStep::total_steps(licensed(true)), 7);
    }
}
