//! Net builder.
//!
//! Turns wires, closed switches and internal buses into an undirected
//! terminal graph and flood-fills it into nets. Nets are rebuilt from
//! scratch on every simulation pass and carry no identity across passes.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::Supply;
use crate::circuit::{ComponentInstance, PinMode, PinStates, Terminal, Wire};

/// Index-based reference to one terminal of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TerminalRef {
    pub component: usize,
    pub terminal: usize,
}

impl TerminalRef {
    pub fn new(component: usize, terminal: usize) -> Self {
        TerminalRef { component, terminal }
    }
}

/// A maximal set of electrically joined terminals
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub id: String,
    pub terminals: Vec<TerminalRef>,
    /// `None` while floating
    pub voltage: Option<f64>,
    pub is_power: bool,
    pub is_ground: bool,
    pub source_voltage: Option<f64>,
}

impl Net {
    fn new(index: usize) -> Self {
        Net {
            id: format!("net-{}", index),
            terminals: Vec::new(),
            voltage: None,
            is_power: false,
            is_ground: false,
            source_voltage: None,
        }
    }

    /// Power and ground merged: only valid as a fault signal
    pub fn is_shorted(&self) -> bool {
        self.is_power && self.is_ground
    }

    /// Joined to at least one other terminal
    pub fn is_connected(&self) -> bool {
        self.terminals.len() > 1
    }

    fn mark_power(&mut self, volts: f64) {
        self.is_power = true;
        self.source_voltage = Some(self.source_voltage.map_or(volts, |v| v.max(volts)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetList {
    pub nets: Vec<Net>,
    /// component -> terminal -> net index
    terminal_nets: Vec<Vec<Option<usize>>>,
    /// wire -> net index, `None` for wires that could not be resolved
    wire_nets: Vec<Option<usize>>,
}

impl NetList {
    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Net> {
        self.nets.get(index)
    }

    pub fn net_of(&self, component: usize, terminal: usize) -> Option<usize> {
        self.terminal_nets
            .get(component)
            .and_then(|terminals| terminals.get(terminal))
            .copied()
            .flatten()
    }

    pub fn net_of_terminal(&self, components: &[ComponentInstance], component: usize, terminal_id: &str) -> Option<usize> {
        let terminal = components.get(component)?.terminal_index(terminal_id)?;
        self.net_of(component, terminal)
    }

    pub fn voltage_of(&self, component: usize, terminal: usize) -> Option<f64> {
        self.net_of(component, terminal)
            .and_then(|net| self.nets[net].voltage)
    }

    /// Voltage of a named terminal, `None` when missing or floating
    pub fn terminal_voltage(&self, components: &[ComponentInstance], component: usize, terminal_id: &str) -> Option<f64> {
        self.net_of_terminal(components, component, terminal_id)
            .and_then(|net| self.nets[net].voltage)
    }

    /// Resolved (vcc, gnd) voltages of a supplied part
    pub fn rails(&self, components: &[ComponentInstance], component: usize) -> Option<(f64, f64)> {
        let vcc = self.terminal_voltage(components, component, "vcc")?;
        let gnd = self.terminal_voltage(components, component, "gnd")?;
        Some((vcc, gnd))
    }

    pub fn wire_net(&self, wire: usize) -> Option<usize> {
        self.wire_nets.get(wire).copied().flatten()
    }

    /// Indices of every net touched by a component, deduplicated in terminal order
    pub fn nets_of_component(&self, component: usize) -> Vec<usize> {
        let mut nets = Vec::new();
        if let Some(terminals) = self.terminal_nets.get(component) {
            for net in terminals.iter().flatten() {
                if !nets.contains(net) {
                    nets.push(*net);
                }
            }
        }
        nets
    }

    pub fn set_voltage(&mut self, net: usize, voltage: f64) {
        if let Some(net) = self.nets.get_mut(net) {
            net.voltage = Some(voltage);
        }
    }
}

/// Build the nets for one simulation pass.
///
/// Two terminals share a net iff they are joined, transitively, by wires,
/// currently-closed switches or a component's internal bus.
pub fn build_nets(components: &[ComponentInstance], wires: &[Wire], pin_states: &PinStates) -> NetList {
    let lookup: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    let mut adjacency: HashMap<TerminalRef, Vec<TerminalRef>> = HashMap::new();
    let mut link = |a: TerminalRef, b: TerminalRef| {
        if a != b {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
    };

    let mut wire_ends = Vec::with_capacity(wires.len());
    for wire in wires {
        let resolved = resolve_wire(components, &lookup, wire);
        match resolved {
            Some((a, b)) => link(a, b),
            None => debug!("Ignoring wire {} without a resolvable terminal pair", wire.id),
        }
        wire_ends.push(resolved.map(|(a, _)| a));
    }

    for (ci, component) in components.iter().enumerate() {
        if component.is_closed_switch() && component.terminals.len() == 2 {
            link(TerminalRef::new(ci, 0), TerminalRef::new(ci, 1));
        }

        let mut buses: HashMap<&str, TerminalRef> = HashMap::new();
        for (ti, terminal) in component.terminals.iter().enumerate() {
            if let Some(bus) = terminal.bus.as_deref() {
                let here = TerminalRef::new(ci, ti);
                match buses.get(bus) {
                    Some(&first) => link(first, here),
                    None => {
                        buses.insert(bus, here);
                    }
                }
            }
        }
    }

    let mut terminal_nets: Vec<Vec<Option<usize>>> = components
        .iter()
        .map(|c| vec![None; c.terminals.len()])
        .collect();
    let mut nets = Vec::new();

    for (ci, component) in components.iter().enumerate() {
        for ti in 0..component.terminals.len() {
            if terminal_nets[ci][ti].is_some() {
                continue;
            }

            let index = nets.len();
            let mut net = Net::new(index);
            let mut stack = vec![TerminalRef::new(ci, ti)];

            while let Some(current) = stack.pop() {
                if terminal_nets[current.component][current.terminal].is_some() {
                    continue;
                }
                terminal_nets[current.component][current.terminal] = Some(index);
                net.terminals.push(current);

                let owner = &components[current.component];
                classify_terminal(&mut net, owner, &owner.terminals[current.terminal], pin_states);

                if let Some(neighbours) = adjacency.get(&current) {
                    for next in neighbours {
                        if terminal_nets[next.component][next.terminal].is_none() {
                            stack.push(*next);
                        }
                    }
                }
            }

            // A short pulls the net to ground
            net.voltage = if net.is_ground {
                Some(0.0)
            } else if net.is_power {
                net.source_voltage
            } else {
                None
            };
            nets.push(net);
        }
    }

    let wire_nets = wire_ends
        .into_iter()
        .map(|end| end.and_then(|r| terminal_nets[r.component][r.terminal]))
        .collect();

    debug!("Built {} nets from {} wires", nets.len(), wires.len());

    NetList {
        nets,
        terminal_nets,
        wire_nets,
    }
}

fn resolve_wire(
    components: &[ComponentInstance],
    lookup: &HashMap<&str, usize>,
    wire: &Wire,
) -> Option<(TerminalRef, TerminalRef)> {
    let ((start_comp, start_term), (end_comp, end_term)) = wire.endpoints()?;
    let resolve = |comp: &str, term: &str| {
        let ci = *lookup.get(comp)?;
        let ti = components[ci].terminal_index(term)?;
        Some(TerminalRef::new(ci, ti))
    };
    Some((resolve(start_comp, start_term)?, resolve(end_comp, end_term)?))
}

fn classify_terminal(net: &mut Net, owner: &ComponentInstance, terminal: &Terminal, pin_states: &PinStates) {
    match terminal.supply {
        Some(Supply::Fixed(volts)) => net.mark_power(volts),
        Some(Supply::Ground) => net.is_ground = true,
        Some(Supply::Gpio) => {
            let mode = pin_states
                .get(&owner.id)
                .and_then(|pins| pins.get(&terminal.id));
            match mode {
                Some(PinMode::High) => net.mark_power(owner.kind.logic_voltage().unwrap_or(5.0)),
                Some(PinMode::Low) => net.is_ground = true,
                Some(PinMode::Input) | None => {}
            }
        }
        None => {}
    }
}
