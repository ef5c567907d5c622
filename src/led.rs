//! LED path analysis.
//!
//! For each LED, derive a series graph over the cluster's nets (one edge per
//! two-terminal part, open switches excluded) and look for a closed
//! power-to-ground loop through the LED. The loop decides polarity, the
//! resistors on it decide the current (single aggregate path, Ohm's law).

use std::collections::VecDeque;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentInstance, ComponentKind, ComponentState, DEFAULT_RESISTANCE};
use crate::diagnostics::{CircuitFault, FaultKind};
use crate::net::NetList;
use crate::partition::Cluster;

/// Minimum anode-cathode drop for the potentiometer fallback
const FALLBACK_MIN_DROP: f64 = 1.8;
/// Drop at which the fallback reports full brightness
const FALLBACK_FULL_DROP: f64 = 3.0;

/// Electrical characteristics by colour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedSpec {
    pub forward_voltage: f64,
    pub max_current: f64,
}

/// Unknown colours use the red characteristics.
pub fn led_spec(color: &str) -> LedSpec {
    match color {
        "yellow" => LedSpec { forward_voltage: 2.0, max_current: 0.020 },
        "green" => LedSpec { forward_voltage: 2.2, max_current: 0.020 },
        _ => LedSpec { forward_voltage: 1.8, max_current: 0.020 },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedOutcome {
    pub is_on: bool,
    pub powered: bool,
    pub brightness: f64,
    /// Amperes; `None` when no current could be computed
    pub current: Option<f64>,
}

impl LedOutcome {
    pub fn off() -> Self {
        LedOutcome {
            is_on: false,
            powered: false,
            brightness: 0.0,
            current: None,
        }
    }

    fn powered_off(current: Option<f64>) -> Self {
        LedOutcome {
            powered: true,
            current,
            ..LedOutcome::off()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedAnalysis {
    pub outcome: LedOutcome,
    pub faults: Vec<CircuitFault>,
}

impl LedAnalysis {
    fn quiet(outcome: LedOutcome) -> Self {
        LedAnalysis { outcome, faults: Vec::new() }
    }
}

/// One two-terminal part as an edge between the nets of its terminals
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeriesEdge {
    component: usize,
    first: usize,
    second: usize,
}

/// One traversed edge of a loop, in traversal direction
#[derive(Debug, Clone, Copy, PartialEq)]
struct Step {
    edge: usize,
    from: usize,
    to: usize,
}

struct SeriesGraph {
    edges: Vec<SeriesEdge>,
    net_count: usize,
}

impl SeriesGraph {
    fn build(cluster: &Cluster, components: &[ComponentInstance], nets: &NetList) -> Self {
        let mut edges = Vec::new();

        for &ci in &cluster.components {
            let component = &components[ci];
            if component.terminals.len() != 2 || component.is_open_switch() {
                continue;
            }
            let (Some(first), Some(second)) = (nets.net_of(ci, 0), nets.net_of(ci, 1)) else {
                continue;
            };
            edges.push(SeriesEdge { component: ci, first, second });
        }

        SeriesGraph { edges, net_count: nets.nets.len() }
    }

    fn edge_of(&self, component: usize) -> Option<usize> {
        self.edges.iter().position(|e| e.component == component)
    }

    /// Simple path from `power` to `ground` that uses `required`.
    ///
    /// Such a path exists exactly when the two ends of `required` reach
    /// `power` and `ground` along net-disjoint routes, so this is a two-unit
    /// flow from the `required` edge to {power, ground} with unit net
    /// capacities. Augmenting paths are breadth-first in component order,
    /// which keeps the result deterministic and the work polynomial.
    fn find_loop(&self, power: usize, ground: usize, required: usize) -> Option<Vec<Step>> {
        let led = self.edges[required];
        if power == ground || led.first == led.second {
            return None;
        }

        let mut flow = FlowNetwork::new(self.net_count);
        let (source, sink) = (flow.source(), flow.sink());
        for net in 0..self.net_count {
            flow.add_arc(FlowNetwork::entry(net), FlowNetwork::exit(net), None);
        }
        let from_first = flow.add_arc(source, FlowNetwork::entry(led.first), None);
        let from_second = flow.add_arc(source, FlowNetwork::entry(led.second), None);
        flow.add_arc(FlowNetwork::exit(power), sink, None);
        flow.add_arc(FlowNetwork::exit(ground), sink, None);
        for (index, edge) in self.edges.iter().enumerate() {
            if index == required || edge.first == edge.second {
                continue;
            }
            flow.add_arc(FlowNetwork::exit(edge.first), FlowNetwork::entry(edge.second), Some(index));
            flow.add_arc(FlowNetwork::exit(edge.second), FlowNetwork::entry(edge.first), Some(index));
        }

        if !(flow.augment() && flow.augment()) {
            return None;
        }

        let (first_route, first_end) = flow.route(from_first);
        let (second_route, _) = flow.route(from_second);

        // One route runs back to power, the other on to ground
        let (to_power, to_ground, led_step) = if first_end == power {
            (first_route, second_route, Step { edge: required, from: led.first, to: led.second })
        } else {
            (second_route, first_route, Step { edge: required, from: led.second, to: led.first })
        };

        let mut path: Vec<Step> = to_power
            .iter()
            .rev()
            .map(|s| Step { edge: s.edge, from: s.to, to: s.from })
            .collect();
        path.push(led_step);
        path.extend(to_ground);
        Some(path)
    }
}

/// Unit-capacity residual network over split nets. Net `n` is entered at
/// node `2n` and left at `2n + 1`, so each net carries at most one route.
/// Arcs are stored in forward/reverse pairs at indices `i` and `i ^ 1`.
struct FlowNetwork {
    arcs: Vec<FlowArc>,
    outgoing: Vec<Vec<usize>>,
}

struct FlowArc {
    to: usize,
    capacity: u8,
    /// Series edge this arc stands for
    edge: Option<usize>,
}

impl FlowNetwork {
    fn new(net_count: usize) -> Self {
        FlowNetwork {
            arcs: Vec::new(),
            outgoing: vec![Vec::new(); 2 * net_count + 2],
        }
    }

    fn entry(net: usize) -> usize {
        2 * net
    }

    fn exit(net: usize) -> usize {
        2 * net + 1
    }

    fn source(&self) -> usize {
        self.outgoing.len() - 2
    }

    fn sink(&self) -> usize {
        self.outgoing.len() - 1
    }

    fn add_arc(&mut self, from: usize, to: usize, edge: Option<usize>) -> usize {
        let index = self.arcs.len();
        self.arcs.push(FlowArc { to, capacity: 1, edge });
        self.arcs.push(FlowArc { to: from, capacity: 0, edge });
        self.outgoing[from].push(index);
        self.outgoing[to].push(index + 1);
        index
    }

    fn carries_flow(&self, arc: usize) -> bool {
        arc % 2 == 0 && self.arcs[arc + 1].capacity > 0
    }

    /// Push one unit along the first breadth-first path in the residual network
    fn augment(&mut self) -> bool {
        let (source, sink) = (self.source(), self.sink());
        let mut via: Vec<Option<usize>> = vec![None; self.outgoing.len()];
        let mut seen = vec![false; self.outgoing.len()];
        let mut queue = VecDeque::from([source]);
        seen[source] = true;

        while let Some(node) = queue.pop_front() {
            if node == sink {
                break;
            }
            for &arc in &self.outgoing[node] {
                let next = self.arcs[arc].to;
                if self.arcs[arc].capacity > 0 && !seen[next] {
                    seen[next] = true;
                    via[next] = Some(arc);
                    queue.push_back(next);
                }
            }
        }
        if !seen[sink] {
            return false;
        }

        let mut node = sink;
        while let Some(arc) = via[node] {
            self.arcs[arc].capacity -= 1;
            self.arcs[arc ^ 1].capacity += 1;
            node = self.arcs[arc ^ 1].to;
        }
        true
    }

    /// Follow the unit of flow leaving the source through `start`. Returns
    /// the series steps in travel order and the net where the route ends.
    fn route(&self, start: usize) -> (Vec<Step>, usize) {
        let sink = self.sink();
        let mut net = self.arcs[start].to / 2;
        let mut steps = Vec::new();

        // Each net carries at most one route, so this visits a net once
        for _ in 0..self.outgoing.len() {
            let next = self.outgoing[FlowNetwork::exit(net)]
                .iter()
                .copied()
                .find(|&arc| self.carries_flow(arc));
            let Some(arc) = next else { break };
            let to = self.arcs[arc].to;
            if to == sink {
                break;
            }
            if let Some(edge) = self.arcs[arc].edge {
                steps.push(Step { edge, from: net, to: to / 2 });
            }
            net = to / 2;
        }
        (steps, net)
    }
}

/// Analyse one LED inside its (already propagated) cluster.
pub fn analyze_led(
    led: usize,
    cluster: &Cluster,
    components: &[ComponentInstance],
    nets: &NetList,
) -> LedAnalysis {
    let component = &components[led];
    let color = match &component.state {
        ComponentState::Led { color } => color.as_str(),
        _ => "red",
    };

    let (Some(anode), Some(cathode)) = (
        nets.net_of_terminal(components, led, "anode"),
        nets.net_of_terminal(components, led, "cathode"),
    ) else {
        return LedAnalysis::quiet(LedOutcome::off());
    };

    // Not part of any circuit yet
    if !nets.nets[anode].is_connected() || !nets.nets[cathode].is_connected() {
        return LedAnalysis::quiet(LedOutcome::off());
    }
    let (Some(anode_v), Some(cathode_v)) = (nets.nets[anode].voltage, nets.nets[cathode].voltage) else {
        return LedAnalysis::quiet(LedOutcome::off());
    };

    let awaiting_user = cluster.components.iter().any(|&ci| {
        components[ci].is_open_switch() || components[ci].kind == ComponentKind::Potentiometer
    });
    let has_potentiometer = cluster
        .components
        .iter()
        .any(|&ci| components[ci].kind == ComponentKind::Potentiometer);

    let power_nets: Vec<usize> = cluster.nets.iter().copied().filter(|&n| nets.nets[n].is_power).collect();
    let ground_nets: Vec<usize> = cluster.nets.iter().copied().filter(|&n| nets.nets[n].is_ground).collect();

    let open_circuit = |message: String| LedAnalysis {
        outcome: LedOutcome::off(),
        faults: vec![CircuitFault::error(
            FaultKind::OpenCircuit,
            cluster,
            message,
            vec![component.id.clone()],
        )],
    };

    if power_nets.is_empty() || ground_nets.is_empty() {
        if awaiting_user {
            return LedAnalysis::quiet(LedOutcome::off());
        }
        return open_circuit(format!("LED {} is not part of a closed power-to-ground loop", component.id));
    }

    let graph = SeriesGraph::build(cluster, components, nets);
    let Some(led_edge) = graph.edge_of(led) else {
        return LedAnalysis::quiet(LedOutcome::off());
    };

    let mut found = None;
    'pairs: for &power in &power_nets {
        for &ground in &ground_nets {
            if let Some(path) = graph.find_loop(power, ground, led_edge) {
                found = Some((power, path));
                break 'pairs;
            }
        }
    }

    let Some((power, path)) = found else {
        if has_potentiometer {
            return potentiometer_fallback(led, cluster, components, anode_v, cathode_v);
        }
        if awaiting_user {
            return LedAnalysis::quiet(LedOutcome::off());
        }
        return open_circuit(format!("LED {} has no complete path from power to ground", component.id));
    };

    trace!(
        "LED {}: loop via {:?}",
        component.id,
        path.iter().map(|s| components[graph.edges[s.edge].component].id.as_str()).collect::<Vec<_>>()
    );

    let mut faults = Vec::new();
    let resistors: Vec<&ComponentInstance> = path
        .iter()
        .map(|s| &components[graph.edges[s.edge].component])
        .filter(|c| c.kind == ComponentKind::Resistor)
        .collect();

    if resistors.is_empty() {
        faults.push(CircuitFault::error(
            FaultKind::MissingResistor,
            cluster,
            format!("LED {} has no current-limiting resistor", component.id),
            vec![component.id.clone()],
        ));
    }

    let Some(led_step) = path.iter().find(|s| s.edge == led_edge) else {
        faults.push(CircuitFault::error(
            FaultKind::OpenCircuit,
            cluster,
            format!("LED {} is not on the detected loop", component.id),
            vec![component.id.clone()],
        ));
        return LedAnalysis { outcome: LedOutcome::off(), faults };
    };
    if led_step.from == cathode && led_step.to == anode {
        faults.push(CircuitFault::error(
            FaultKind::ReversePolarity,
            cluster,
            format!("LED {} is connected backwards (anode and cathode swapped)", component.id),
            vec![component.id.clone()],
        ));
        return LedAnalysis { outcome: LedOutcome::powered_off(None), faults };
    }
    if !(led_step.from == anode && led_step.to == cathode) {
        faults.push(CircuitFault::error(
            FaultKind::OpenCircuit,
            cluster,
            format!("LED {} orientation could not be matched to the loop", component.id),
            vec![component.id.clone()],
        ));
        return LedAnalysis { outcome: LedOutcome::off(), faults };
    }

    let total_resistance: f64 = resistors
        .iter()
        .map(|r| r.resistance().unwrap_or(DEFAULT_RESISTANCE))
        .sum();
    if total_resistance <= 0.0 {
        faults.push(CircuitFault::error(
            FaultKind::Overcurrent,
            cluster,
            format!("LED {} has nothing limiting its current", component.id),
            vec![component.id.clone()],
        ));
        return LedAnalysis { outcome: LedOutcome::powered_off(None), faults };
    }

    let spec = led_spec(color);
    let supply = nets.nets[power].voltage.unwrap_or(0.0);
    let available = supply - spec.forward_voltage;
    if available <= 0.0 {
        debug!("LED {}: {:.2}V supply below forward voltage", component.id, supply);
        return LedAnalysis { outcome: LedOutcome::powered_off(Some(0.0)), faults };
    }

    let current = available / total_resistance;
    if current <= 0.0 {
        return LedAnalysis { outcome: LedOutcome::powered_off(Some(0.0)), faults };
    }
    if current > spec.max_current {
        faults.push(CircuitFault::error(
            FaultKind::Overcurrent,
            cluster,
            format!(
                "LED {} draws {:.1}mA, above its {:.0}mA limit",
                component.id,
                current * 1000.0,
                spec.max_current * 1000.0
            ),
            vec![component.id.clone()],
        ));
        return LedAnalysis { outcome: LedOutcome::powered_off(Some(current)), faults };
    }

    LedAnalysis {
        outcome: LedOutcome {
            is_on: true,
            powered: true,
            brightness: (current / spec.max_current).min(1.0),
            current: Some(current),
        },
        faults,
    }
}

/// Voltage-drop heuristic for LEDs fed from a potentiometer wiper. The
/// series graph excludes the potentiometer, so no loop is ever found; this
/// lights the LED from the resolved drop alone without verifying a loop.
fn potentiometer_fallback(
    led: usize,
    cluster: &Cluster,
    components: &[ComponentInstance],
    anode_v: f64,
    cathode_v: f64,
) -> LedAnalysis {
    let drop = anode_v - cathode_v;
    let has_resistor = cluster
        .components
        .iter()
        .any(|&ci| components[ci].kind == ComponentKind::Resistor);

    if drop < FALLBACK_MIN_DROP || !has_resistor {
        return LedAnalysis::quiet(LedOutcome::off());
    }

    debug!("LED {}: lit by potentiometer drop of {:.2}V", components[led].id, drop);
    LedAnalysis::quiet(LedOutcome {
        is_on: true,
        powered: true,
        brightness: (drop / FALLBACK_FULL_DROP).min(1.0),
        current: Some(drop / DEFAULT_RESISTANCE),
    })
}
