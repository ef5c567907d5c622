//! Circuit partitioner.
//!
//! Groups components that share at least one net into independent
//! clusters. Structural fixtures (the breadboard) conduct through their
//! nets but do not by themselves join two clusters; each one ends up in a
//! degenerate cluster of its own.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentInstance, Wire};
use crate::net::NetList;

/// One electrically independent sub-circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    /// Component indices, ascending
    pub components: Vec<usize>,
    /// Net indices, ascending
    pub nets: Vec<usize>,
    /// Wire indices, ascending
    pub wires: Vec<usize>,
    pub has_ground: bool,
    pub has_power: bool,
}

impl Cluster {
    pub fn is_complete(&self) -> bool {
        self.has_ground && self.has_power
    }

    pub fn contains_component(&self, component: usize) -> bool {
        self.components.binary_search(&component).is_ok()
    }

    pub fn contains_net(&self, net: usize) -> bool {
        self.nets.binary_search(&net).is_ok()
    }
}

/// Partition components into clusters. Every component lands in exactly one.
pub fn partition(components: &[ComponentInstance], nets: &NetList, wires: &[Wire]) -> Vec<Cluster> {
    let component_nets: Vec<Vec<usize>> = components
        .iter()
        .enumerate()
        .map(|(ci, c)| {
            if c.kind.is_structural() {
                Vec::new()
            } else {
                nets.nets_of_component(ci)
            }
        })
        .collect();

    let mut net_members: Vec<Vec<usize>> = vec![Vec::new(); nets.len()];
    for (ci, member_nets) in component_nets.iter().enumerate() {
        for &net in member_nets {
            net_members[net].push(ci);
        }
    }

    let mut assigned: Vec<Option<usize>> = vec![None; components.len()];
    let mut clusters = Vec::new();

    for seed in 0..components.len() {
        if assigned[seed].is_some() {
            continue;
        }

        let index = clusters.len();
        let mut members = Vec::new();
        let mut stack = vec![seed];
        assigned[seed] = Some(index);

        while let Some(ci) = stack.pop() {
            members.push(ci);
            for &net in &component_nets[ci] {
                for &other in &net_members[net] {
                    if assigned[other].is_none() {
                        assigned[other] = Some(index);
                        stack.push(other);
                    }
                }
            }
        }

        members.sort_unstable();
        let mut cluster_nets: Vec<usize> = members
            .iter()
            .flat_map(|&ci| component_nets[ci].iter().copied())
            .collect();
        cluster_nets.sort_unstable();
        cluster_nets.dedup();

        let has_ground = cluster_nets.iter().any(|&n| nets.nets[n].is_ground);
        let has_power = cluster_nets.iter().any(|&n| nets.nets[n].is_power);

        let cluster_wires = (0..wires.len())
            .filter(|&w| {
                nets.wire_net(w)
                    .map_or(false, |net| cluster_nets.binary_search(&net).is_ok())
            })
            .collect();

        clusters.push(Cluster {
            id: format!("circuit-{}", index),
            components: members,
            nets: cluster_nets,
            wires: cluster_wires,
            has_ground,
            has_power,
        });
    }

    debug!("Partitioned {} components into {} clusters", components.len(), clusters.len());
    clusters
}
