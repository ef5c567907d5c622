use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentInstance, ComponentState};
use crate::net::NetList;
use crate::partition::Cluster;

/// Round cap for the relaxation; bounds work on cyclic wiring
pub const MAX_PROPAGATION_ROUNDS: usize = 100;

/// Propagation statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationStats {
    pub rounds: usize,
    pub converged: bool,
    pub resolved: usize,
    pub floating: usize,
}

/// Resolve floating net voltages inside one cluster.
///
/// Seeds are the power and ground nets set by the net builder. Each round
/// visits every still-floating net and lets its member terminals' owners
/// drive it: pass-through parts copy the voltage across, the potentiometer
/// divides its supply, and powered sensors drive their output pin. Stops
/// early on a round with no change. Nets unreachable from any source stay
/// floating.
pub fn propagate(
    cluster: &Cluster,
    components: &[ComponentInstance],
    nets: &mut NetList,
    max_rounds: usize,
) -> PropagationStats {
    let mut rounds = 0;
    let mut converged = false;

    while rounds < max_rounds {
        rounds += 1;
        let mut changed = false;

        for &net_index in &cluster.nets {
            if nets.nets[net_index].voltage.is_some() {
                continue;
            }

            let driven = nets.nets[net_index]
                .terminals
                .iter()
                .find_map(|member| drive_voltage(components, nets, member.component, member.terminal));

            if let Some(voltage) = driven {
                trace!("{} resolved to {:.3}V in round {}", nets.nets[net_index].id, voltage, rounds);
                nets.set_voltage(net_index, voltage);
                changed = true;
            }
        }

        if !changed {
            converged = true;
            break;
        }
    }

    let resolved = cluster
        .nets
        .iter()
        .filter(|&&n| nets.nets[n].voltage.is_some())
        .count();
    let stats = PropagationStats {
        rounds,
        converged,
        resolved,
        floating: cluster.nets.len() - resolved,
    };

    debug!(
        "{}: propagation took {} rounds (converged: {}), {} resolved, {} floating",
        cluster.id, stats.rounds, stats.converged, stats.resolved, stats.floating
    );
    stats
}

/// Voltage a component drives onto the net of one of its terminals, if any
fn drive_voltage(components: &[ComponentInstance], nets: &NetList, component: usize, terminal: usize) -> Option<f64> {
    let owner = &components[component];
    let terminal_id = owner.terminals[terminal].id.as_str();

    match (&owner.state, terminal_id) {
        (ComponentState::Resistor { .. }, _) | (ComponentState::Switch { pressed: true }, _) => {
            let other = pass_through_partner(owner, terminal)?;
            nets.voltage_of(component, other)
        }
        (ComponentState::Potentiometer { position }, "wiper") => {
            let (vcc, gnd) = nets.rails(components, component)?;
            Some(gnd + position.clamp(0.0, 1.0) * (vcc - gnd))
        }
        (ComponentState::IrSensor { detected }, "out") => {
            let (vcc, gnd) = operating_rails(components, nets, component)?;
            Some(if *detected { vcc } else { gnd })
        }
        (ComponentState::Ultrasonic { output_voltage, .. }, "echo") => {
            operating_rails(components, nets, component)?;
            Some(*output_voltage)
        }
        (ComponentState::Dht11 { temperature, humidity }, "data") => {
            let (vcc, gnd) = operating_rails(components, nets, component)?;
            Some(if dht11_reading_valid(*temperature, *humidity) { vcc } else { gnd })
        }
        _ => None,
    }
}

fn pass_through_partner(owner: &ComponentInstance, terminal: usize) -> Option<usize> {
    match (owner.terminals.len(), terminal) {
        (2, 0) => Some(1),
        (2, 1) => Some(0),
        _ => None,
    }
}

/// Supply rails of an active part, only when the differential reaches its
/// minimum operating voltage
pub fn operating_rails(components: &[ComponentInstance], nets: &NetList, component: usize) -> Option<(f64, f64)> {
    let (vcc, gnd) = nets.rails(components, component)?;
    let minimum = components[component]
        .kind
        .min_operating_voltage()
        .unwrap_or(0.0);
    (vcc - gnd >= minimum).then_some((vcc, gnd))
}

/// DHT11 drives its data line HIGH only with a plausible reading
pub fn dht11_reading_valid(temperature: f64, humidity: f64) -> bool {
    temperature.is_finite() && humidity.is_finite() && (0.0..=100.0).contains(&humidity)
}
