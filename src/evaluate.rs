//! Component evaluator: resolved net voltages plus each part's own state
//! mapped onto what the UI shows (lit, powered, angle, distance, pin levels).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::catalog::Supply;
use crate::circuit::{ComponentInstance, ComponentKind, ComponentState};
use crate::led::LedOutcome;
use crate::net::NetList;
use crate::propagate::operating_rails;

/// Minimum |positive - negative| for the buzzer to sound
const BUZZER_MIN_VOLTAGE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinLevel {
    High,
    Low,
    Floating,
}

impl PinLevel {
    /// Logic level of a pin voltage against half the board's logic voltage
    pub fn from_voltage(voltage: Option<f64>, logic_voltage: f64) -> Self {
        match voltage {
            Some(v) if v >= logic_voltage / 2.0 => PinLevel::High,
            Some(_) => PinLevel::Low,
            None => PinLevel::Floating,
        }
    }
}

/// Visible state of one component after a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReading {
    pub component_type: String,
    pub is_active: bool,
    pub powered: bool,
    pub properties: ComponentProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ComponentProperties {
    Source { voltage: f64 },
    Ground,
    Breadboard,
    Resistor { resistance: f64 },
    Led {
        color: String,
        brightness: f64,
        current: Option<f64>,
    },
    Switch { pressed: bool },
    Buzzer { voltage: Option<f64> },
    Potentiometer {
        position: f64,
        output_voltage: Option<f64>,
    },
    Servo { angle: f64 },
    IrSensor { detected: bool },
    Ultrasonic {
        distance_cm: f64,
        output_voltage: f64,
    },
    Dht11 { temperature: f64, humidity: f64 },
    Board {
        logic_voltage: f64,
        pins: BTreeMap<String, PinLevel>,
    },
}

/// Map a servo signal voltage onto 0..=180 degrees, linear over the supply
pub fn signal_to_angle(signal: f64, supply: f64) -> f64 {
    if supply <= 0.0 {
        return 0.0;
    }
    (signal / supply * 180.0).clamp(0.0, 180.0)
}

/// Reading for a component in a silenced (shorted) cluster
pub fn inert(component: &ComponentInstance) -> ComponentReading {
    ComponentReading {
        component_type: component.kind.type_name().to_string(),
        is_active: false,
        powered: false,
        properties: properties(component, None, None),
    }
}

/// Evaluate one component of a propagated, non-shorted cluster
pub fn evaluate(
    component: usize,
    components: &[ComponentInstance],
    nets: &NetList,
    leds: &HashMap<usize, LedOutcome>,
) -> ComponentReading {
    let instance = &components[component];
    let voltage = |terminal: &str| nets.terminal_voltage(components, component, terminal);

    let (is_active, powered) = match instance.kind {
        ComponentKind::PowerSource => (true, true),
        ComponentKind::Ground => (true, false),
        ComponentKind::Breadboard => (false, false),
        ComponentKind::Resistor => {
            let powered = voltage("t1").is_some() && voltage("t2").is_some();
            (powered, powered)
        }
        ComponentKind::Led => {
            let outcome = leds.get(&component).cloned().unwrap_or_else(LedOutcome::off);
            (outcome.is_on, outcome.powered)
        }
        ComponentKind::PushButton | ComponentKind::SlideSwitch => {
            let powered = voltage("t1").is_some() || voltage("t2").is_some();
            (instance.is_closed_switch(), powered)
        }
        ComponentKind::Buzzer => {
            let sounding = match (voltage("positive"), voltage("negative")) {
                (Some(p), Some(n)) => (p - n).abs() >= BUZZER_MIN_VOLTAGE,
                _ => false,
            };
            (sounding, sounding)
        }
        ComponentKind::Potentiometer
        | ComponentKind::Servo
        | ComponentKind::IrSensor
        | ComponentKind::UltrasonicSensor
        | ComponentKind::Dht11 => {
            let powered = operating_rails(components, nets, component).is_some();
            (powered, powered)
        }
        ComponentKind::ArduinoUno | ComponentKind::Esp32 => {
            let supply = instance.kind.supply_pin().unwrap_or("5V");
            let powered = nets.net_of_terminal(components, component, supply).is_some()
                && nets.net_of_terminal(components, component, "GND").is_some();
            (powered, powered)
        }
    };

    ComponentReading {
        component_type: instance.kind.type_name().to_string(),
        is_active,
        powered,
        properties: properties(instance, Some((component, components, nets)), leds.get(&component)),
    }
}

type Resolved<'a> = (usize, &'a [ComponentInstance], &'a NetList);

fn properties(
    instance: &ComponentInstance,
    resolved: Option<Resolved<'_>>,
    led: Option<&LedOutcome>,
) -> ComponentProperties {
    let voltage = |terminal: &str| {
        resolved.and_then(|(ci, components, nets)| nets.terminal_voltage(components, ci, terminal))
    };

    match &instance.state {
        ComponentState::Fixture => match instance.kind {
            ComponentKind::PowerSource => ComponentProperties::Source {
                voltage: fixed_supply(instance),
            },
            ComponentKind::Ground => ComponentProperties::Ground,
            _ => ComponentProperties::Breadboard,
        },
        ComponentState::Resistor { .. } => ComponentProperties::Resistor {
            resistance: instance.resistance().unwrap_or_default(),
        },
        ComponentState::Led { color } => {
            let outcome = led.cloned().unwrap_or_else(LedOutcome::off);
            ComponentProperties::Led {
                color: color.clone(),
                brightness: outcome.brightness,
                current: outcome.current,
            }
        }
        ComponentState::Switch { pressed } => ComponentProperties::Switch { pressed: *pressed },
        ComponentState::Buzzer => ComponentProperties::Buzzer {
            voltage: voltage("positive")
                .zip(voltage("negative"))
                .map(|(p, n)| p - n),
        },
        ComponentState::Potentiometer { position } => ComponentProperties::Potentiometer {
            position: *position,
            output_voltage: voltage("wiper"),
        },
        ComponentState::Servo { angle } => ComponentProperties::Servo { angle: *angle },
        ComponentState::IrSensor { detected } => ComponentProperties::IrSensor { detected: *detected },
        ComponentState::Ultrasonic {
            output_voltage,
            distance_cm,
        } => ComponentProperties::Ultrasonic {
            distance_cm: *distance_cm,
            output_voltage: *output_voltage,
        },
        ComponentState::Dht11 { temperature, humidity } => ComponentProperties::Dht11 {
            temperature: *temperature,
            humidity: *humidity,
        },
        ComponentState::Board => {
            let logic_voltage = instance.kind.logic_voltage().unwrap_or(5.0);
            let pins = instance
                .terminals
                .iter()
                .filter(|t| t.supply == Some(Supply::Gpio))
                .map(|t| (t.id.clone(), PinLevel::from_voltage(voltage(&t.id), logic_voltage)))
                .collect();
            ComponentProperties::Board { logic_voltage, pins }
        }
    }
}

fn fixed_supply(instance: &ComponentInstance) -> f64 {
    instance
        .terminals
        .iter()
        .find_map(|t| match t.supply {
            Some(Supply::Fixed(volts)) => Some(volts),
            _ => None,
        })
        .unwrap_or(0.0)
}
