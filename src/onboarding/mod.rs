//! Onboarding router: decides how each inventory switch reaches the fabric.
//!
//! A switch with the full POAP triplet is pre-provisioned, a switch with none
//! of it is discovered over SSH, and anything in between is skipped.

use crate::models::{PoapTriplet, SwitchRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// One or two POAP fields set; lists the missing inventory keys
    IncompletePoap { missing: Vec<&'static str> },
    /// `add_to_fabric` is false
    NotSelected,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::IncompletePoap { missing } => {
                write!(f, "incomplete POAP definition, missing {}", missing.join(", "))
            }
            SkipReason::NotSelected => write!(f, "add_to_fabric is false"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingMode {
    Preprovision(PoapTriplet),
    Discover,
    Skip(SkipReason),
}

impl OnboardingMode {
    pub fn label(&self) -> &'static str {
        match self {
            OnboardingMode::Preprovision(_) => "preprovision",
            OnboardingMode::Discover => "discover",
            OnboardingMode::Skip(_) => "skip",
        }
    }
}

/// Classify one switch by its POAP fields alone. Pure and total:
/// Skip happens exactly when the triplet is partial.
pub fn classify(switch: &SwitchRecord) -> OnboardingMode {
    let fields = switch.poap_fields();
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();

    match (missing.len(), fields) {
        (0, [(_, Some(serial)), (_, Some(model)), (_, Some(version))]) => {
            OnboardingMode::Preprovision(PoapTriplet {
                serial: serial.to_string(),
                model: model.to_string(),
                version: version.to_string(),
            })
        }
        (3, _) => OnboardingMode::Discover,
        _ => OnboardingMode::Skip(SkipReason::IncompletePoap { missing }),
    }
}

/// The onboarding decision for a run: `classify`, then `add_to_fabric`.
/// A partial triplet is reported even for an unselected switch.
pub fn decide(switch: &SwitchRecord) -> OnboardingMode {
    match classify(switch) {
        OnboardingMode::Skip(reason) => OnboardingMode::Skip(reason),
        _ if !switch.add_to_fabric => OnboardingMode::Skip(SkipReason::NotSelected),
        mode => mode,
    }
}

/// Switches partitioned by onboarding mode
#[derive(Debug, Default)]
pub struct Routing<'a> {
    pub preprovision: Vec<(&'a SwitchRecord, PoapTriplet)>,
    pub discover: Vec<&'a SwitchRecord>,
    pub skipped: Vec<(&'a SwitchRecord, SkipReason)>,
}

/// Partition switches, logging one warning per incomplete POAP definition
pub fn route_all<'a>(switches: impl IntoIterator<Item = &'a SwitchRecord>) -> Routing<'a> {
    let mut routing = Routing::default();
    for sw in switches {
        match decide(sw) {
            OnboardingMode::Preprovision(triplet) => routing.preprovision.push((sw, triplet)),
            OnboardingMode::Discover => routing.discover.push(sw),
            OnboardingMode::Skip(reason) => {
                if matches!(reason, SkipReason::IncompletePoap { .. }) {
                    tracing::warn!("Skipping {}: {}", sw.hostname, reason);
                } else {
                    tracing::debug!("Skipping {}: {}", sw.hostname, reason);
                }
                routing.skipped.push((sw, reason));
            }
        }
    }
    routing
}
