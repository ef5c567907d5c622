use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use colored::{Color, Colorize};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitLayout, ComponentInstance, ComponentKind, ComponentState, PinMode, PinStates, Wire};
use crate::catalog::Supply;
use crate::cli::OutputFormat;
use crate::diagnostics::{classify_cluster, short_circuit_guard, CircuitFault, Severity};
use crate::error::{SimError, SimResult};
use crate::evaluate::{evaluate, inert, signal_to_angle, ComponentProperties, ComponentReading, PinLevel};
use crate::net::{build_nets, NetList};
use crate::parser::CircuitParser;
use crate::partition::{partition, Cluster};
use crate::propagate::{operating_rails, propagate, PropagationStats, MAX_PROPAGATION_ROUNDS};

/// Result of one `simulate()` pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub title: String,
    pub is_valid: bool,
    pub circuits: Vec<CircuitReport>,
    pub errors: Vec<CircuitFault>,
    pub warnings: Vec<CircuitFault>,
    /// component id -> visible state
    pub component_states: BTreeMap<String, ComponentReading>,
    /// net id -> voltage and polarity
    pub net_states: BTreeMap<String, NetReading>,
}

impl SimulationResult {
    pub fn component(&self, id: &str) -> Option<&ComponentReading> {
        self.component_states.get(id)
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.kind.code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitReport {
    pub id: String,
    pub components: Vec<String>,
    pub wires: Vec<String>,
    pub has_power: bool,
    pub has_ground: bool,
    pub is_complete: bool,
    pub shorted: bool,
    pub propagation: Option<PropagationStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetPolarity {
    Power,
    Ground,
    Short,
    Signal,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetReading {
    pub voltage: Option<f64>,
    pub polarity: NetPolarity,
    /// `component.terminal` labels
    pub terminals: Vec<String>,
    pub cluster: String,
}

/// Main simulator engine
pub struct Simulator {
    title: String,
    components: Vec<ComponentInstance>,
    wires: Vec<Wire>,
    pin_states: PinStates,
    results: Option<SimulationResult>,
    config: SimulatorConfig,
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub max_propagation_rounds: usize,
    /// Write the angle derived from a powered servo's signal net back into its state
    pub servo_write_back: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            max_propagation_rounds: MAX_PROPAGATION_ROUNDS,
            servo_write_back: true,
        }
    }
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        Simulator {
            title: String::new(),
            components: Vec::new(),
            wires: Vec::new(),
            pin_states: PinStates::new(),
            results: None,
            config,
        }
    }

    /// Load a circuit from file: `.json` layouts via serde, anything else
    /// through the text format
    pub fn load_file(&mut self, filename: &str) -> Result<()> {
        info!("Loading circuit from: {}", filename);

        let is_json = Path::new(filename)
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        let layout = if is_json {
            let content = fs::read_to_string(filename)
                .with_context(|| format!("Failed to read file '{}'", filename))?;
            CircuitLayout::from_json_str(&content)
                .with_context(|| format!("Invalid circuit layout in '{}'", filename))?
        } else {
            CircuitParser::new().parse_file(filename)?
        };

        self.load_layout(layout)?;
        Ok(())
    }

    /// Replace the loaded circuit. Components of unknown type are skipped.
    pub fn load_layout(&mut self, layout: CircuitLayout) -> SimResult<()> {
        let mut seen = HashSet::new();
        let mut components = Vec::with_capacity(layout.components.len());

        for placed in &layout.components {
            if !seen.insert(placed.id.as_str()) {
                return Err(SimError::DuplicateComponent(placed.id.clone()));
            }
            match ComponentInstance::instantiate(placed) {
                Ok(instance) => components.push(instance),
                Err(SimError::UnknownComponentType { id, kind }) => {
                    warn!("Skipping component {} of unknown type '{}'", id, kind);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Loaded circuit '{}': {} components, {} wires",
            layout.title,
            components.len(),
            layout.wires.len()
        );

        self.title = layout.title;
        self.components = components;
        self.wires = layout.wires;
        self.pin_states = layout.pin_states;
        self.results = None;
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn components(&self) -> &[ComponentInstance] {
        &self.components
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn pin_states(&self) -> &PinStates {
        &self.pin_states
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn component(&self, id: &str) -> Option<&ComponentInstance> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Run one full pass over the current components, wires and pin states.
    ///
    /// Everything except component state is rebuilt from scratch, so the
    /// result depends only on the current snapshot.
    pub fn simulate(&mut self) -> &SimulationResult {
        let mut nets = build_nets(&self.components, &self.wires, &self.pin_states);
        let clusters = partition(&self.components, &nets, &self.wires);
        debug!("Built {} nets in {} clusters", nets.len(), clusters.len());

        let mut circuits = Vec::with_capacity(clusters.len());
        let mut faults = Vec::new();
        let mut component_states = BTreeMap::new();
        let mut net_states = BTreeMap::new();

        for cluster in &clusters {
            if let Some(fault) = short_circuit_guard(cluster, &self.components, &nets) {
                for &ci in &cluster.components {
                    let component = &self.components[ci];
                    component_states.insert(component.id.clone(), inert(component));
                }
                self.record_nets(cluster, &nets, &mut net_states);
                circuits.push(self.report(cluster, true, None));
                faults.push(fault);
                continue;
            }

            let stats = propagate(cluster, &self.components, &mut nets, self.config.max_propagation_rounds);
            if !stats.converged {
                warn!(
                    "{}: propagation stopped after {} rounds with {} nets floating",
                    cluster.id, stats.rounds, stats.floating
                );
            }
            if self.config.servo_write_back {
                self.write_back_servo_angles(cluster, &nets);
            }

            let diagnosis = classify_cluster(cluster, &self.components, &nets);
            for &ci in &cluster.components {
                let reading = evaluate(ci, &self.components, &nets, &diagnosis.leds);
                component_states.insert(self.components[ci].id.clone(), reading);
            }
            self.record_nets(cluster, &nets, &mut net_states);
            circuits.push(self.report(cluster, false, Some(stats)));
            faults.extend(diagnosis.faults);
        }

        let (errors, warnings): (Vec<_>, Vec<_>) = faults
            .into_iter()
            .partition(|f| f.severity == Severity::Error);

        info!(
            "Simulation of '{}' finished: {} circuits, {} errors, {} warnings",
            self.title,
            circuits.len(),
            errors.len(),
            warnings.len()
        );

        self.results.insert(SimulationResult {
            title: self.title.clone(),
            is_valid: errors.is_empty(),
            circuits,
            errors,
            warnings,
            component_states,
            net_states,
        })
    }

    fn write_back_servo_angles(&mut self, cluster: &Cluster, nets: &NetList) {
        for &ci in &cluster.components {
            if self.components[ci].kind != ComponentKind::Servo {
                continue;
            }
            let Some((vcc, gnd)) = operating_rails(&self.components, nets, ci) else {
                continue;
            };
            let Some(signal) = nets.terminal_voltage(&self.components, ci, "signal") else {
                continue;
            };
            let angle = signal_to_angle(signal - gnd, vcc - gnd);
            debug!("Servo {} follows its signal to {:.1} degrees", self.components[ci].id, angle);
            self.components[ci].state = ComponentState::Servo { angle };
        }
    }

    fn record_nets(&self, cluster: &Cluster, nets: &NetList, out: &mut BTreeMap<String, NetReading>) {
        for &n in &cluster.nets {
            let net = &nets.nets[n];
            let polarity = if net.is_shorted() {
                NetPolarity::Short
            } else if net.is_power {
                NetPolarity::Power
            } else if net.is_ground {
                NetPolarity::Ground
            } else if net.voltage.is_some() {
                NetPolarity::Signal
            } else {
                NetPolarity::Floating
            };
            let terminals = net
                .terminals
                .iter()
                .map(|t| {
                    let component = &self.components[t.component];
                    format!("{}.{}", component.id, component.terminals[t.terminal].id)
                })
                .collect();

            out.insert(
                net.id.clone(),
                NetReading {
                    voltage: net.voltage,
                    polarity,
                    terminals,
                    cluster: cluster.id.clone(),
                },
            );
        }
    }

    fn report(&self, cluster: &Cluster, shorted: bool, propagation: Option<PropagationStats>) -> CircuitReport {
        CircuitReport {
            id: cluster.id.clone(),
            components: cluster
                .components
                .iter()
                .map(|&ci| self.components[ci].id.clone())
                .collect(),
            wires: cluster.wires.iter().map(|&w| self.wires[w].id.clone()).collect(),
            has_power: cluster.has_power,
            has_ground: cluster.has_ground,
            is_complete: cluster.is_complete(),
            shorted,
            propagation,
        }
    }

    fn component_mut(&mut self, id: &str, expected: ComponentKind) -> SimResult<&mut ComponentInstance> {
        let component = self
            .components
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SimError::UnknownComponent(id.to_string()))?;

        let matches = component.kind == expected
            || (expected.is_switch() && component.kind.is_switch())
            || (expected.is_board() && component.kind.is_board());
        if !matches {
            return Err(SimError::WrongComponentType {
                id: id.to_string(),
                expected: expected.type_name(),
                actual: component.kind.type_name(),
            });
        }
        Ok(component)
    }

    pub fn set_resistance(&mut self, id: &str, ohms: f64) -> SimResult<()> {
        if !ohms.is_finite() || ohms < 0.0 {
            return Err(invalid(id, "resistance", format!("{} is not a usable resistance", ohms)));
        }
        self.component_mut(id, ComponentKind::Resistor)?.state = ComponentState::Resistor { resistance: ohms };
        Ok(())
    }

    pub fn set_switch_pressed(&mut self, id: &str, pressed: bool) -> SimResult<()> {
        self.component_mut(id, ComponentKind::PushButton)?.state = ComponentState::Switch { pressed };
        Ok(())
    }

    /// Position is clamped into [0, 1]
    pub fn set_potentiometer_position(&mut self, id: &str, position: f64) -> SimResult<()> {
        if position.is_nan() {
            return Err(invalid(id, "position", "position is not a number".to_string()));
        }
        self.component_mut(id, ComponentKind::Potentiometer)?.state = ComponentState::Potentiometer {
            position: position.clamp(0.0, 1.0),
        };
        Ok(())
    }

    pub fn set_ir_detected(&mut self, id: &str, detected: bool) -> SimResult<()> {
        self.component_mut(id, ComponentKind::IrSensor)?.state = ComponentState::IrSensor { detected };
        Ok(())
    }

    pub fn set_ultrasonic_reading(&mut self, id: &str, output_voltage: f64, distance_cm: f64) -> SimResult<()> {
        if !output_voltage.is_finite() || !distance_cm.is_finite() {
            return Err(invalid(id, "reading", "ultrasonic readings must be finite".to_string()));
        }
        self.component_mut(id, ComponentKind::UltrasonicSensor)?.state = ComponentState::Ultrasonic {
            output_voltage,
            distance_cm: distance_cm.max(0.0),
        };
        Ok(())
    }

    /// Out-of-range humidity is accepted; the sensor then holds its data line LOW
    pub fn set_dht11_reading(&mut self, id: &str, temperature: f64, humidity: f64) -> SimResult<()> {
        if !temperature.is_finite() || !humidity.is_finite() {
            return Err(invalid(id, "reading", "temperature and humidity must be finite".to_string()));
        }
        self.component_mut(id, ComponentKind::Dht11)?.state = ComponentState::Dht11 { temperature, humidity };
        Ok(())
    }

    /// Angle is clamped into [0, 180]
    pub fn set_servo_angle(&mut self, id: &str, angle: f64) -> SimResult<()> {
        if angle.is_nan() {
            return Err(invalid(id, "angle", "angle is not a number".to_string()));
        }
        self.component_mut(id, ComponentKind::Servo)?.state = ComponentState::Servo {
            angle: angle.clamp(0.0, 180.0),
        };
        Ok(())
    }

    /// Drive (or release) a GPIO pin from the logic panel
    pub fn set_pin_mode(&mut self, board: &str, pin: &str, mode: PinMode) -> SimResult<()> {
        let component = self.component_mut(board, ComponentKind::ArduinoUno)?;
        let is_gpio = component
            .terminals
            .iter()
            .any(|t| t.id == pin && t.supply == Some(Supply::Gpio));
        if !is_gpio {
            return Err(SimError::UnknownPin {
                board: board.to_string(),
                pin: pin.to_string(),
            });
        }

        self.pin_states
            .entry(board.to_string())
            .or_default()
            .insert(pin.to_string(), mode);
        Ok(())
    }

    /// Angle a servo's current signal voltage maps to, 0V -> 0 degrees up to
    /// its supply -> 180. `None` while the signal or supply is unresolved.
    pub fn servo_angle_from_signal(&self, id: &str) -> SimResult<Option<f64>> {
        let servo = self
            .components
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| SimError::UnknownComponent(id.to_string()))?;
        let kind = self.components[servo].kind;
        if kind != ComponentKind::Servo {
            return Err(SimError::WrongComponentType {
                id: id.to_string(),
                expected: ComponentKind::Servo.type_name(),
                actual: kind.type_name(),
            });
        }

        let mut nets = build_nets(&self.components, &self.wires, &self.pin_states);
        let clusters = partition(&self.components, &nets, &self.wires);
        let Some(cluster) = clusters.iter().find(|c| c.contains_component(servo)) else {
            return Ok(None);
        };
        if short_circuit_guard(cluster, &self.components, &nets).is_some() {
            return Ok(None);
        }
        propagate(cluster, &self.components, &mut nets, self.config.max_propagation_rounds);

        let angle = nets
            .rails(&self.components, servo)
            .zip(nets.terminal_voltage(&self.components, servo, "signal"))
            .map(|((vcc, gnd), signal)| signal_to_angle(signal - gnd, vcc - gnd));
        Ok(angle)
    }

    /// Get simulation results
    pub fn get_results(&self) -> Option<&SimulationResult> {
        self.results.as_ref()
    }

    /// Export simulation results to file
    pub fn export_results(&self, filename: &str, format: OutputFormat) -> Result<()> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| anyhow!("No simulation results available"))?;

        match format {
            OutputFormat::Csv => self.export_csv(results, filename),
            OutputFormat::Json => self.export_json(results, filename),
            OutputFormat::Text => {
                fs::write(filename, render_summary(results, false))
                    .with_context(|| format!("Failed to write '{}'", filename))?;
                info!("Results exported to text: {}", filename);
                Ok(())
            }
        }
    }

    /// Export results to CSV format
    fn export_csv(&self, results: &SimulationResult, filename: &str) -> Result<()> {
        let file = File::create(filename).with_context(|| format!("Failed to create '{}'", filename))?;
        write_csv(results, file)?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    /// Export results to JSON format
    fn export_json(&self, results: &SimulationResult, filename: &str) -> Result<()> {
        let file = File::create(filename).with_context(|| format!("Failed to create '{}'", filename))?;
        serde_json::to_writer_pretty(file, results)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print simulation summary
    pub fn print_summary(&self) {
        match &self.results {
            Some(results) => print!("{}", render_summary(results, true)),
            None => println!("No simulation results available"),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(id: &str, property: &str, reason: String) -> SimError {
    SimError::InvalidValue {
        id: id.to_string(),
        property: property.to_string(),
        reason,
    }
}

/// One flat row for CSV export; components, nets and faults share the layout
#[derive(Debug, Serialize)]
struct CsvRow {
    section: &'static str,
    id: String,
    kind: String,
    active: Option<bool>,
    powered: Option<bool>,
    voltage: Option<f64>,
    detail: String,
}

/// Write components, nets and faults as CSV rows
pub fn write_csv<W: Write>(results: &SimulationResult, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in csv_rows(results) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_rows(results: &SimulationResult) -> Vec<CsvRow> {
    let mut rows = Vec::new();

    for (id, reading) in &results.component_states {
        rows.push(CsvRow {
            section: "component",
            id: id.clone(),
            kind: reading.component_type.clone(),
            active: Some(reading.is_active),
            powered: Some(reading.powered),
            voltage: None,
            detail: describe(&reading.properties),
        });
    }
    for (id, net) in &results.net_states {
        rows.push(CsvRow {
            section: "net",
            id: id.clone(),
            kind: format!("{:?}", net.polarity).to_lowercase(),
            active: None,
            powered: None,
            voltage: net.voltage,
            detail: net.terminals.join(" "),
        });
    }
    for fault in results.errors.iter().chain(&results.warnings) {
        rows.push(CsvRow {
            section: "fault",
            id: fault.cluster_id.clone(),
            kind: fault.kind.code().to_string(),
            active: None,
            powered: None,
            voltage: None,
            detail: fault.message.clone(),
        });
    }

    rows
}

/// Short human-readable form of a component's properties
fn describe(properties: &ComponentProperties) -> String {
    match properties {
        ComponentProperties::Source { voltage } => format!("{:.1}V", voltage),
        ComponentProperties::Ground | ComponentProperties::Breadboard => String::new(),
        ComponentProperties::Resistor { resistance } => format!("{}ohm", resistance),
        ComponentProperties::Led { color, brightness, current } => match current {
            Some(amps) => format!("{} brightness={:.2} current={:.1}mA", color, brightness, amps * 1000.0),
            None => format!("{} brightness={:.2}", color, brightness),
        },
        ComponentProperties::Switch { pressed } => {
            if *pressed { "pressed".to_string() } else { "released".to_string() }
        }
        ComponentProperties::Buzzer { voltage } => match voltage {
            Some(v) => format!("{:.2}V across", v),
            None => "floating".to_string(),
        },
        ComponentProperties::Potentiometer { position, output_voltage } => match output_voltage {
            Some(v) => format!("position={:.2} wiper={:.2}V", position, v),
            None => format!("position={:.2}", position),
        },
        ComponentProperties::Servo { angle } => format!("angle={:.0}deg", angle),
        ComponentProperties::IrSensor { detected } => {
            if *detected { "object detected".to_string() } else { "clear".to_string() }
        }
        ComponentProperties::Ultrasonic { distance_cm, output_voltage } => {
            format!("distance={:.1}cm echo={:.2}V", distance_cm, output_voltage)
        }
        ComponentProperties::Dht11 { temperature, humidity } => {
            format!("{:.1}C {:.0}%RH", temperature, humidity)
        }
        ComponentProperties::Board { pins, .. } => pins
            .iter()
            .filter(|(_, level)| **level != PinLevel::Floating)
            .map(|(pin, level)| format!("{}={:?}", pin, level).to_uppercase())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn paint(text: String, color: Color, styled: bool) -> String {
    if styled {
        text.color(color).to_string()
    } else {
        text
    }
}

/// Human-readable report; `styled` adds terminal colours
pub fn render_summary(results: &SimulationResult, styled: bool) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n=== Simulation Summary: {} ===\n", results.title));
    let status = if results.is_valid {
        paint("VALID".to_string(), Color::Green, styled)
    } else {
        paint("INVALID".to_string(), Color::Red, styled)
    };
    out.push_str(&format!("Status: {}\n", status));

    out.push_str(&format!("\nCircuits ({}):\n", results.circuits.len()));
    for circuit in &results.circuits {
        let state = if circuit.shorted {
            paint("shorted".to_string(), Color::Red, styled)
        } else if circuit.is_complete {
            "complete".to_string()
        } else {
            "incomplete".to_string()
        };
        out.push_str(&format!(
            "  {}: {} ({})\n",
            circuit.id,
            circuit.components.join(", "),
            state
        ));
    }

    if !results.errors.is_empty() {
        out.push_str(&format!("\nErrors ({}):\n", results.errors.len()));
        for fault in &results.errors {
            out.push_str(&format!("  {}\n", paint(fault.to_string(), Color::Red, styled)));
        }
    }
    if !results.warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):\n", results.warnings.len()));
        for fault in &results.warnings {
            out.push_str(&format!("  {}\n", paint(fault.to_string(), Color::Yellow, styled)));
        }
    }

    out.push_str("\nComponents:\n");
    for (id, reading) in &results.component_states {
        let state = if reading.is_active {
            paint("ON ".to_string(), Color::Green, styled)
        } else {
            "off".to_string()
        };
        let power = if reading.powered { "powered" } else { "unpowered" };
        out.push_str(&format!(
            "  {} {} ({}, {}) {}\n",
            state,
            id,
            reading.component_type,
            power,
            describe(&reading.properties)
        ));
    }

    out.push_str("\nNets:\n");
    for (id, net) in &results.net_states {
        if net.terminals.len() < 2 {
            continue;
        }
        let voltage = match net.voltage {
            Some(v) => format!("{:.3}V", v),
            None => "floating".to_string(),
        };
        out.push_str(&format!(
            "  {}: {} {:?} [{}]\n",
            id,
            voltage,
            net.polarity,
            net.terminals.join(", ")
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FaultKind;
    use serde_json::json;

    /// vcc -> r1 -> led1 -> [extra] -> gnd
    fn led_loop() -> CircuitLayout {
        CircuitLayout::new("led loop")
            .part("vcc", "power-5v")
            .part("r1", "resistor")
            .part("led1", "led-red")
            .part("gnd", "ground")
            .wire("w1", ("vcc", "vcc"), ("r1", "t1"))
            .wire("w2", ("r1", "t2"), ("led1", "anode"))
            .wire("w3", ("led1", "cathode"), ("gnd", "gnd"))
    }

    fn simulator_for(layout: CircuitLayout) -> Simulator {
        let mut simulator = Simulator::new();
        simulator.load_layout(layout).unwrap();
        simulator
    }

    fn error_kinds(result: &SimulationResult) -> Vec<FaultKind> {
        result.errors.iter().map(|e| e.kind).collect()
    }

    fn led_properties(result: &SimulationResult, id: &str) -> (f64, Option<f64>) {
        match &result.component(id).unwrap().properties {
            ComponentProperties::Led { brightness, current, .. } => (*brightness, *current),
            other => panic!("not an LED: {:?}", other),
        }
    }

    #[test]
    fn test_led_loop_lights() {
        let mut simulator = simulator_for(led_loop());
        let result = simulator.simulate().clone();

        assert!(result.is_valid, "{:?}", result.errors);
        let led = result.component("led1").unwrap();
        assert!(led.is_active && led.powered);
        let (brightness, current) = led_properties(&result, "led1");
        assert!((brightness - 0.727).abs() < 1e-3);
        assert!((current.unwrap() - 0.014545).abs() < 1e-5);
        assert_eq!(result.circuits.len(), 1);
        assert!(result.circuits[0].is_complete);
    }

    #[test]
    fn test_direct_wire_led() {
        let layout = CircuitLayout::new("no resistor")
            .part("vcc", "power-5v")
            .part("led1", "led")
            .part("gnd", "ground")
            .wire("w1", ("vcc", "vcc"), ("led1", "anode"))
            .wire("w2", ("led1", "cathode"), ("gnd", "gnd"));
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();

        assert!(!result.is_valid);
        assert_eq!(error_kinds(result), vec![FaultKind::MissingResistor, FaultKind::Overcurrent]);
        assert!(!result.component("led1").unwrap().is_active);
    }

    #[test]
    fn test_reversed_led() {
        let layout = CircuitLayout::new("backwards")
            .part("vcc", "power-5v")
            .part("r1", "resistor")
            .part("led1", "led")
            .part("gnd", "ground")
            .wire("w1", ("vcc", "vcc"), ("r1", "t1"))
            .wire("w2", ("r1", "t2"), ("led1", "cathode"))
            .wire("w3", ("led1", "anode"), ("gnd", "gnd"));
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();

        assert_eq!(error_kinds(result), vec![FaultKind::ReversePolarity]);
        let led = result.component("led1").unwrap();
        assert!(!led.is_active);
        assert!(led.powered);
    }

    #[test]
    fn test_short_circuit_silences_cluster_only() {
        let layout = led_loop()
            .part("vcc2", "power-5v")
            .part("gnd2", "ground")
            .part("bz", "buzzer")
            .wire("w4", ("vcc2", "vcc"), ("gnd2", "gnd"))
            .wire("w5", ("vcc2", "vcc"), ("bz", "positive"))
            .wire("w6", ("bz", "negative"), ("gnd2", "gnd"));
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();

        assert_eq!(error_kinds(result), vec![FaultKind::ShortCircuit]);
        let short = &result.errors[0];
        assert_eq!(short.affected_components, vec!["vcc2", "gnd2", "bz"]);
        for id in ["vcc2", "gnd2", "bz"] {
            let reading = result.component(id).unwrap();
            assert!(!reading.is_active && !reading.powered, "{} should be inert", id);
        }

        // The healthy loop next door is untouched
        assert!(result.component("led1").unwrap().is_active);
        let shorted = result.circuits.iter().find(|c| c.shorted).unwrap();
        assert_eq!(shorted.id, short.cluster_id);
        assert!(shorted.propagation.is_none());
        assert!(result.net_states.values().any(|n| n.polarity == NetPolarity::Short));
    }

    #[test]
    fn test_button_gates_led() {
        let layout = CircuitLayout::new("button")
            .part("vcc", "power-5v")
            .part("r1", "resistor")
            .part("led1", "led")
            .part("btn", "push-button")
            .part("gnd", "ground")
            .wire("w1", ("vcc", "vcc"), ("r1", "t1"))
            .wire("w2", ("r1", "t2"), ("led1", "anode"))
            .wire("w3", ("led1", "cathode"), ("btn", "t1"))
            .wire("w4", ("btn", "t2"), ("gnd", "gnd"));
        let mut simulator = simulator_for(layout);

        let released = simulator.simulate().clone();
        assert!(released.is_valid, "{:?}", released.errors);
        assert!(!released.component("led1").unwrap().is_active);

        simulator.set_switch_pressed("btn", true).unwrap();
        let pressed = simulator.simulate().clone();
        assert!(pressed.is_valid);
        assert!(pressed.component("led1").unwrap().is_active);
        assert!(pressed.component("btn").unwrap().is_active);

        // Releasing splits the net again and restores the first result
        simulator.set_switch_pressed("btn", false).unwrap();
        assert_eq!(simulator.simulate(), &released);
    }

    #[test]
    fn test_fixtures_only_are_valid() {
        let layout = CircuitLayout::new("bare").part("vcc", "power-5v").part("gnd", "ground");
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();
        assert!(result.is_valid);
        assert!(result.errors.is_empty() && result.warnings.is_empty());
    }

    #[test]
    fn test_lone_led_has_no_supply() {
        let mut simulator = simulator_for(CircuitLayout::new("lone").part("led1", "led"));
        let result = simulator.simulate();

        assert!(!result.is_valid);
        assert_eq!(error_kinds(result), vec![FaultKind::NoGround, FaultKind::NoPower]);
        assert_eq!(result.errors[0].affected_components, vec!["led1"]);
        assert!(!result.component("led1").unwrap().is_active);
    }

    #[test]
    fn test_simulate_is_idempotent() {
        let layout = led_loop()
            .part("servo", "servo")
            .part("uno", "arduino-uno")
            .part("pot", "potentiometer")
            .wire("w4", ("uno", "5V"), ("servo", "vcc"))
            .wire("w5", ("uno", "GND"), ("servo", "gnd"))
            .wire("w6", ("uno", "D9"), ("servo", "signal"))
            .wire("w7", ("uno", "5V"), ("pot", "vcc"))
            .pin("uno", "D9", PinMode::High);
        let mut simulator = simulator_for(layout);

        let first = simulator.simulate().clone();
        let second = simulator.simulate().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_servo_follows_signal() {
        let layout = CircuitLayout::new("servo")
            .part("uno", "arduino-uno")
            .part("servo", "servo")
            .wire("w1", ("uno", "5V"), ("servo", "vcc"))
            .wire("w2", ("uno", "GND"), ("servo", "gnd"))
            .wire("w3", ("uno", "D9"), ("servo", "signal"));
        let mut simulator = simulator_for(layout);

        // Floating signal leaves the default angle alone
        simulator.simulate();
        assert_eq!(simulator.servo_angle_from_signal("servo").unwrap(), None);
        assert_eq!(simulator.component("servo").unwrap().state, ComponentState::Servo { angle: 90.0 });

        simulator.set_pin_mode("uno", "D9", PinMode::High).unwrap();
        assert_eq!(simulator.servo_angle_from_signal("servo").unwrap(), Some(180.0));
        let result = simulator.simulate();
        assert_eq!(
            result.component("servo").unwrap().properties,
            ComponentProperties::Servo { angle: 180.0 }
        );

        simulator.set_pin_mode("uno", "D9", PinMode::Low).unwrap();
        simulator.simulate();
        assert_eq!(simulator.component("servo").unwrap().state, ComponentState::Servo { angle: 0.0 });
    }

    #[test]
    fn test_gpio_drives_led() {
        let layout = CircuitLayout::new("blink")
            .part("uno", "arduino-uno")
            .part("r1", "resistor")
            .part("led1", "led")
            .wire("w1", ("uno", "D13"), ("r1", "t1"))
            .wire("w2", ("r1", "t2"), ("led1", "anode"))
            .wire("w3", ("led1", "cathode"), ("uno", "GND"));
        let mut simulator = simulator_for(layout);

        // D13 released: the loop floats and the LED stays dark
        let idle = simulator.simulate().clone();
        assert!(!idle.component("led1").unwrap().is_active);

        simulator.set_pin_mode("uno", "D13", PinMode::High).unwrap();
        let lit = simulator.simulate();
        assert!(lit.is_valid, "{:?}", lit.errors);
        assert!(lit.component("led1").unwrap().is_active);
    }

    #[test]
    fn test_independent_faults_stay_scoped() {
        let layout = led_loop()
            .part("r9", "resistor")
            .part("bz", "buzzer")
            .wire("w9", ("r9", "t2"), ("bz", "positive"));
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();

        assert_eq!(error_kinds(result), vec![FaultKind::NoGround, FaultKind::NoPower]);
        let faulty = &result.errors[0].cluster_id;
        let healthy = result.circuits.iter().find(|c| c.components.contains(&"led1".to_string())).unwrap();
        assert_ne!(&healthy.id, faulty);
        assert!(result.component("led1").unwrap().is_active);
    }

    #[test]
    fn test_sensor_mutators_reach_outputs() {
        let layout = CircuitLayout::new("sensors")
            .part("vcc", "power-5v")
            .part("gnd", "ground")
            .part("ir", "ir-sensor")
            .part("dht", "dht11")
            .part("us", "hc-sr04")
            .wire("w1", ("vcc", "vcc"), ("ir", "vcc"))
            .wire("w2", ("gnd", "gnd"), ("ir", "gnd"))
            .wire("w3", ("vcc", "vcc"), ("dht", "vcc"))
            .wire("w4", ("gnd", "gnd"), ("dht", "gnd"))
            .wire("w5", ("vcc", "vcc"), ("us", "vcc"))
            .wire("w6", ("gnd", "gnd"), ("us", "gnd"));
        let mut simulator = simulator_for(layout);

        simulator.set_ir_detected("ir", true).unwrap();
        simulator.set_dht11_reading("dht", 31.5, 70.0).unwrap();
        simulator.set_ultrasonic_reading("us", 1.2, 42.0).unwrap();
        let result = simulator.simulate().clone();

        assert_eq!(result.component("ir").unwrap().properties, ComponentProperties::IrSensor { detected: true });
        assert_eq!(
            result.component("dht").unwrap().properties,
            ComponentProperties::Dht11 { temperature: 31.5, humidity: 70.0 }
        );
        assert!(result.component("us").unwrap().powered);

        let echo = result
            .net_states
            .values()
            .find(|n| n.terminals.contains(&"us.echo".to_string()))
            .unwrap();
        assert_eq!(echo.voltage, Some(1.2));
        assert_eq!(echo.polarity, NetPolarity::Signal);
    }

    #[test]
    fn test_mutator_errors() {
        let mut simulator = simulator_for(led_loop().part("uno", "uno"));

        assert_eq!(
            simulator.set_resistance("nope", 10.0),
            Err(SimError::UnknownComponent("nope".to_string()))
        );
        assert!(matches!(
            simulator.set_switch_pressed("r1", true),
            Err(SimError::WrongComponentType { actual: "resistor", .. })
        ));
        assert!(matches!(
            simulator.set_resistance("r1", -1.0),
            Err(SimError::InvalidValue { .. })
        ));
        assert!(matches!(
            simulator.set_pin_mode("uno", "GND", PinMode::High),
            Err(SimError::UnknownPin { .. })
        ));
        assert!(simulator.set_pin_mode("uno", "A0", PinMode::Input).is_ok());
        assert!(matches!(
            simulator.servo_angle_from_signal("led1"),
            Err(SimError::WrongComponentType { .. })
        ));
    }

    #[test]
    fn test_potentiometer_clamps() {
        let layout = CircuitLayout::new("pot").part("pot", "potentiometer");
        let mut simulator = simulator_for(layout);
        simulator.set_potentiometer_position("pot", 1.7).unwrap();
        assert_eq!(
            simulator.component("pot").unwrap().state,
            ComponentState::Potentiometer { position: 1.0 }
        );
        simulator.set_servo_angle("pot", 10.0).unwrap_err();
    }

    #[test]
    fn test_load_layout_rules() {
        let mut simulator = Simulator::new();
        let layout = led_loop().part("cap1", "capacitor");
        simulator.load_layout(layout).unwrap();
        assert_eq!(simulator.components().len(), 4);

        let duplicate = led_loop().part("r1", "resistor");
        assert_eq!(
            simulator.load_layout(duplicate),
            Err(SimError::DuplicateComponent("r1".to_string()))
        );

        let bad_value = CircuitLayout::new("bad").part_with("r1", "resistor", &[("resistance", json!(-10))]);
        assert!(matches!(simulator.load_layout(bad_value), Err(SimError::InvalidValue { .. })));
    }

    #[test]
    fn test_breadboard_routes_current() {
        let layout = CircuitLayout::new("breadboard")
            .part("bb", "breadboard")
            .part("vcc", "power-5v")
            .part("gnd", "ground")
            .part("r1", "resistor")
            .part("led1", "led-green")
            .wire("w1", ("vcc", "vcc"), ("bb", "tp1"))
            .wire("w2", ("bb", "tp5"), ("r1", "t1"))
            .wire("w3", ("r1", "t2"), ("bb", "a10"))
            .wire("w4", ("bb", "c10"), ("led1", "anode"))
            .wire("w5", ("led1", "cathode"), ("bb", "tn3"))
            .wire("w6", ("bb", "tn20"), ("gnd", "gnd"));
        let mut simulator = simulator_for(layout);
        let result = simulator.simulate();

        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.component("led1").unwrap().is_active);
        let (_, current) = led_properties(result, "led1");
        assert!((current.unwrap() - 2.8 / 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_formats() {
        let mut simulator = simulator_for(led_loop());
        assert!(simulator.export_results("unused.json", OutputFormat::Json).is_err());
        simulator.simulate();

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("result.json");
        let csv_path = dir.path().join("result.csv");
        let text_path = dir.path().join("result.txt");

        simulator.export_results(json_path.to_str().unwrap(), OutputFormat::Json).unwrap();
        simulator.export_results(csv_path.to_str().unwrap(), OutputFormat::Csv).unwrap();
        simulator.export_results(text_path.to_str().unwrap(), OutputFormat::Text).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["componentStates"]["led1"]["isActive"], true);
        assert_eq!(json["componentStates"]["led1"]["properties"]["kind"], "led");

        let csv = fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("section,id,kind,active,powered,voltage,detail"));
        assert!(csv.lines().any(|l| l.starts_with("component,led1,led,true,true")));

        let text = fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("Status: VALID"));
        assert!(text.contains("led1 (led, powered)"));
    }
}
