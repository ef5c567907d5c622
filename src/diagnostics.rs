//! Wiring diagnostics.
//!
//! Faults are data: every finding is a [`CircuitFault`] scoped to the
//! cluster (and components) that caused it, collected into the simulation
//! result instead of aborting the pass. One cluster's faults never affect
//! the evaluation of another.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentInstance, ComponentKind};
use crate::led::{analyze_led, LedOutcome};
use crate::net::NetList;
use crate::partition::Cluster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    NoGround,
    NoPower,
    ShortCircuit,
    OpenCircuit,
    ReversePolarity,
    MissingResistor,
    Overcurrent,
}

impl FaultKind {
    pub fn code(&self) -> &'static str {
        match self {
            FaultKind::NoGround => "NO_GROUND",
            FaultKind::NoPower => "NO_POWER",
            FaultKind::ShortCircuit => "SHORT_CIRCUIT",
            FaultKind::OpenCircuit => "OPEN_CIRCUIT",
            FaultKind::ReversePolarity => "REVERSE_POLARITY",
            FaultKind::MissingResistor => "MISSING_RESISTOR",
            FaultKind::Overcurrent => "OVERCURRENT",
        }
    }
}

/// `Warning` is part of the model but no current rule emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitFault {
    #[serde(rename = "type")]
    pub kind: FaultKind,
    pub message: String,
    pub affected_components: Vec<String>,
    pub severity: Severity,
    pub cluster_id: String,
}

impl CircuitFault {
    pub fn error(kind: FaultKind, cluster: &Cluster, message: String, affected: Vec<String>) -> Self {
        CircuitFault {
            kind,
            message,
            affected_components: affected,
            severity: Severity::Error,
            cluster_id: cluster.id.clone(),
        }
    }
}

impl fmt::Display for CircuitFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "[{}] {} ({}): {}", tag, self.kind.code(), self.cluster_id, self.message)
    }
}

/// Everything the classifier found in one cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterDiagnosis {
    pub faults: Vec<CircuitFault>,
    /// LED component index -> analysed outcome
    pub leds: HashMap<usize, LedOutcome>,
}

/// Fatal pre-check run before propagation. A net that is both power and
/// ground means the supply is shorted; the whole cluster is silenced.
pub fn short_circuit_guard(
    cluster: &Cluster,
    components: &[ComponentInstance],
    nets: &NetList,
) -> Option<CircuitFault> {
    let shorted: Vec<usize> = cluster
        .nets
        .iter()
        .copied()
        .filter(|&n| nets.nets[n].is_shorted())
        .collect();
    if shorted.is_empty() {
        return None;
    }

    let mut owners: Vec<usize> = shorted
        .iter()
        .flat_map(|&n| nets.nets[n].terminals.iter().map(|m| m.component))
        .filter(|&ci| cluster.contains_component(ci))
        .collect();
    owners.sort_unstable();
    owners.dedup();
    let affected = owners.iter().map(|&ci| components[ci].id.clone()).collect();

    let net_ids: Vec<&str> = shorted.iter().map(|&n| nets.nets[n].id.as_str()).collect();
    warn!("{}: power shorted to ground on {}", cluster.id, net_ids.join(", "));

    Some(CircuitFault::error(
        FaultKind::ShortCircuit,
        cluster,
        format!(
            "Short circuit: power is connected directly to ground ({})",
            net_ids.join(", ")
        ),
        affected,
    ))
}

/// Structural checks plus per-LED analysis for one propagated cluster
pub fn classify_cluster(
    cluster: &Cluster,
    components: &[ComponentInstance],
    nets: &NetList,
) -> ClusterDiagnosis {
    let mut diagnosis = ClusterDiagnosis::default();

    if !needs_checks(cluster, components) {
        debug!("{}: nothing to check", cluster.id);
        return diagnosis;
    }

    let all_members: Vec<String> = cluster
        .components
        .iter()
        .map(|&ci| components[ci].id.clone())
        .collect();

    if !cluster.has_ground {
        diagnosis.faults.push(CircuitFault::error(
            FaultKind::NoGround,
            cluster,
            "Circuit has no ground connection".to_string(),
            all_members.clone(),
        ));
    }
    if !cluster.has_power {
        diagnosis.faults.push(CircuitFault::error(
            FaultKind::NoPower,
            cluster,
            "Circuit has no power source".to_string(),
            all_members,
        ));
    }
    for &n in &cluster.nets {
        let net = &nets.nets[n];
        if net.is_shorted() {
            let affected = net
                .terminals
                .iter()
                .filter(|m| cluster.contains_component(m.component))
                .map(|m| components[m.component].id.clone())
                .collect();
            diagnosis.faults.push(CircuitFault::error(
                FaultKind::ShortCircuit,
                cluster,
                format!("Short circuit on {}", net.id),
                affected,
            ));
        }
    }

    for &ci in &cluster.components {
        if components[ci].kind != ComponentKind::Led {
            continue;
        }
        let analysis = analyze_led(ci, cluster, components, nets);
        diagnosis.faults.extend(analysis.faults);
        diagnosis.leds.insert(ci, analysis.outcome);
    }

    diagnosis
}

/// Only clusters made entirely of fixtures have nothing to malfunction.
/// A lone unwired part is still a circuit and gets checked.
fn needs_checks(cluster: &Cluster, components: &[ComponentInstance]) -> bool {
    cluster
        .components
        .iter()
        .any(|&ci| !components[ci].kind.is_fixture())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{PinStates, Wire};
    use crate::net::build_nets;
    use crate::partition::partition;
    use crate::propagate::{propagate, MAX_PROPAGATION_ROUNDS};

    fn diagnose(list: &[(&str, ComponentKind)], wires: &[Wire]) -> (Vec<Cluster>, Vec<Option<CircuitFault>>, Vec<ClusterDiagnosis>) {
        let components: Vec<_> = list
            .iter()
            .map(|(id, kind)| ComponentInstance::new(id, *kind))
            .collect();
        let mut nets = build_nets(&components, wires, &PinStates::new());
        let clusters = partition(&components, &nets, wires);
        let mut guards = Vec::new();
        let mut diagnoses = Vec::new();
        for cluster in &clusters {
            let guard = short_circuit_guard(cluster, &components, &nets);
            if guard.is_none() {
                propagate(cluster, &components, &mut nets, MAX_PROPAGATION_ROUNDS);
                diagnoses.push(classify_cluster(cluster, &components, &nets));
            } else {
                diagnoses.push(ClusterDiagnosis::default());
            }
            guards.push(guard);
        }
        (clusters, guards, diagnoses)
    }

    fn kinds(diagnosis: &ClusterDiagnosis) -> Vec<FaultKind> {
        diagnosis.faults.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_fixtures_alone_raise_nothing() {
        let (_, guards, diagnoses) = diagnose(
            &[("vcc", ComponentKind::PowerSource), ("gnd", ComponentKind::Ground)],
            &[],
        );
        assert!(guards.iter().all(Option::is_none));
        assert!(diagnoses.iter().all(|d| d.faults.is_empty()));
    }

    #[test]
    fn test_missing_supply() {
        let (_, _, diagnoses) = diagnose(
            &[("r1", ComponentKind::Resistor), ("bz", ComponentKind::Buzzer)],
            &[Wire::new("w1", ("r1", "t2"), ("bz", "positive"))],
        );
        assert_eq!(kinds(&diagnoses[0]), vec![FaultKind::NoGround, FaultKind::NoPower]);
        assert_eq!(diagnoses[0].faults[0].affected_components, vec!["r1", "bz"]);
        assert_eq!(diagnoses[0].faults[0].cluster_id, "circuit-0");
    }

    #[test]
    fn test_unwired_part_is_still_checked() {
        let (_, _, diagnoses) = diagnose(&[("r1", ComponentKind::Resistor)], &[]);
        assert_eq!(kinds(&diagnoses[0]), vec![FaultKind::NoGround, FaultKind::NoPower]);
        assert_eq!(diagnoses[0].faults[1].affected_components, vec!["r1"]);
    }

    #[test]
    fn test_short_guard_trips() {
        let (_, guards, _) = diagnose(
            &[
                ("vcc", ComponentKind::PowerSource),
                ("gnd", ComponentKind::Ground),
                ("r1", ComponentKind::Resistor),
            ],
            &[
                Wire::new("w1", ("vcc", "vcc"), ("gnd", "gnd")),
                Wire::new("w2", ("vcc", "vcc"), ("r1", "t1")),
            ],
        );
        let fault = guards[0].as_ref().unwrap();
        assert_eq!(fault.kind, FaultKind::ShortCircuit);
        assert_eq!(fault.affected_components, vec!["vcc", "gnd", "r1"]);
        assert_eq!(fault.severity, Severity::Error);
    }

    #[test]
    fn test_short_through_breadboard_names_cluster_members_only() {
        let (clusters, guards, _) = diagnose(
            &[
                ("bb", ComponentKind::Breadboard),
                ("vcc", ComponentKind::PowerSource),
                ("gnd", ComponentKind::Ground),
            ],
            &[
                Wire::new("w1", ("vcc", "vcc"), ("bb", "tp1")),
                Wire::new("w2", ("gnd", "gnd"), ("bb", "tp7")),
            ],
        );
        let fault = guards.iter().flatten().next().unwrap();
        assert_eq!(fault.affected_components, vec!["vcc", "gnd"]);
        let cluster = clusters.iter().find(|c| c.id == fault.cluster_id).unwrap();
        assert!(!cluster.contains_component(0));
    }

    #[test]
    fn test_fault_display() {
        let (clusters, _, _) = diagnose(&[("r1", ComponentKind::Resistor)], &[]);
        let fault = CircuitFault::error(
            FaultKind::Overcurrent,
            &clusters[0],
            "too much".to_string(),
            vec!["r1".to_string()],
        );
        assert_eq!(fault.to_string(), "[error] OVERCURRENT (circuit-0): too much");
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["type"], "OVERCURRENT");
        assert_eq!(json["clusterId"], "circuit-0");
    }
}
