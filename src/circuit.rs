use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::debug;

use crate::catalog::{self, Direction, Supply, TerminalRole};
use crate::error::{SimError, SimResult};

pub const DEFAULT_RESISTANCE: f64 = 220.0;

/// Types of placeable components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    #[serde(rename = "power-5v")]
    PowerSource,
    Ground,
    Breadboard,
    Resistor,
    Led,
    PushButton,
    SlideSwitch,
    Buzzer,
    Potentiometer,
    Servo,
    IrSensor,
    UltrasonicSensor,
    Dht11,
    ArduinoUno,
    Esp32,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 15] = [
        ComponentKind::PowerSource,
        ComponentKind::Ground,
        ComponentKind::Breadboard,
        ComponentKind::Resistor,
        ComponentKind::Led,
        ComponentKind::PushButton,
        ComponentKind::SlideSwitch,
        ComponentKind::Buzzer,
        ComponentKind::Potentiometer,
        ComponentKind::Servo,
        ComponentKind::IrSensor,
        ComponentKind::UltrasonicSensor,
        ComponentKind::Dht11,
        ComponentKind::ArduinoUno,
        ComponentKind::Esp32,
    ];

    /// Resolve a palette type string. `led-<color>` maps to [`ComponentKind::Led`].
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        if name == "led" || name.starts_with("led-") {
            return Some(ComponentKind::Led);
        }
        let kind = match name.as_str() {
            "power-5v" | "5v" | "vcc" => ComponentKind::PowerSource,
            "ground" | "gnd" => ComponentKind::Ground,
            "breadboard" => ComponentKind::Breadboard,
            "resistor" => ComponentKind::Resistor,
            "push-button" | "button" => ComponentKind::PushButton,
            "slide-switch" | "switch" => ComponentKind::SlideSwitch,
            "buzzer" => ComponentKind::Buzzer,
            "potentiometer" => ComponentKind::Potentiometer,
            "servo" => ComponentKind::Servo,
            "ir-sensor" => ComponentKind::IrSensor,
            "ultrasonic-sensor" | "hc-sr04" => ComponentKind::UltrasonicSensor,
            "dht11" => ComponentKind::Dht11,
            "arduino-uno" | "uno" => ComponentKind::ArduinoUno,
            "esp32" => ComponentKind::Esp32,
            _ => return None,
        };
        Some(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentKind::PowerSource => "power-5v",
            ComponentKind::Ground => "ground",
            ComponentKind::Breadboard => "breadboard",
            ComponentKind::Resistor => "resistor",
            ComponentKind::Led => "led",
            ComponentKind::PushButton => "push-button",
            ComponentKind::SlideSwitch => "slide-switch",
            ComponentKind::Buzzer => "buzzer",
            ComponentKind::Potentiometer => "potentiometer",
            ComponentKind::Servo => "servo",
            ComponentKind::IrSensor => "ir-sensor",
            ComponentKind::UltrasonicSensor => "ultrasonic-sensor",
            ComponentKind::Dht11 => "dht11",
            ComponentKind::ArduinoUno => "arduino-uno",
            ComponentKind::Esp32 => "esp32",
        }
    }

    /// Passive power/ground/structural parts: nothing on them can malfunction
    pub fn is_fixture(&self) -> bool {
        matches!(
            self,
            ComponentKind::PowerSource | ComponentKind::Ground | ComponentKind::Breadboard
        )
    }

    /// Conducts between its holes but never links clusters by itself
    pub fn is_structural(&self) -> bool {
        matches!(self, ComponentKind::Breadboard)
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, ComponentKind::PushButton | ComponentKind::SlideSwitch)
    }

    pub fn is_board(&self) -> bool {
        matches!(self, ComponentKind::ArduinoUno | ComponentKind::Esp32)
    }

    /// Voltage a board drives onto a GPIO set HIGH
    pub fn logic_voltage(&self) -> Option<f64> {
        match self {
            ComponentKind::ArduinoUno => Some(5.0),
            ComponentKind::Esp32 => Some(3.3),
            _ => None,
        }
    }

    /// Designated supply pin used to decide whether a board is powered
    pub fn supply_pin(&self) -> Option<&'static str> {
        match self {
            ComponentKind::ArduinoUno => Some("5V"),
            ComponentKind::Esp32 => Some("3V3"),
            _ => None,
        }
    }

    /// Minimum VCC-GND differential for active parts to operate
    pub fn min_operating_voltage(&self) -> Option<f64> {
        match self {
            ComponentKind::IrSensor | ComponentKind::Dht11 | ComponentKind::Buzzer => Some(3.0),
            ComponentKind::UltrasonicSensor | ComponentKind::Servo => Some(4.0),
            ComponentKind::Potentiometer => Some(1.0),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Per-type electrical state. This is the only part of a component that
/// changes after load, through user interaction or servo angle write-back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ComponentState {
    Fixture,
    Resistor { resistance: f64 },
    Led { color: String },
    Switch { pressed: bool },
    Buzzer,
    Potentiometer { position: f64 },
    Servo { angle: f64 },
    IrSensor { detected: bool },
    Ultrasonic { output_voltage: f64, distance_cm: f64 },
    Dht11 { temperature: f64, humidity: f64 },
    Board,
}

impl ComponentState {
    pub fn default_for(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::PowerSource | ComponentKind::Ground | ComponentKind::Breadboard => {
                ComponentState::Fixture
            }
            ComponentKind::Resistor => ComponentState::Resistor { resistance: DEFAULT_RESISTANCE },
            ComponentKind::Led => ComponentState::Led { color: "red".to_string() },
            ComponentKind::PushButton | ComponentKind::SlideSwitch => {
                ComponentState::Switch { pressed: false }
            }
            ComponentKind::Buzzer => ComponentState::Buzzer,
            ComponentKind::Potentiometer => ComponentState::Potentiometer { position: 0.5 },
            ComponentKind::Servo => ComponentState::Servo { angle: 90.0 },
            ComponentKind::IrSensor => ComponentState::IrSensor { detected: false },
            ComponentKind::UltrasonicSensor => ComponentState::Ultrasonic {
                output_voltage: 0.0,
                distance_cm: 100.0,
            },
            ComponentKind::Dht11 => ComponentState::Dht11 {
                temperature: 25.0,
                humidity: 50.0,
            },
            ComponentKind::ArduinoUno | ComponentKind::Esp32 => ComponentState::Board,
        }
    }
}

/// A terminal on a live component instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub id: String,
    pub role: TerminalRole,
    pub direction: Direction,
    pub supply: Option<Supply>,
    pub bus: Option<String>,
}

/// Live component: catalog terminals plus mutable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub id: String,
    pub kind: ComponentKind,
    pub terminals: Vec<Terminal>,
    pub state: ComponentState,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

impl ComponentInstance {
    /// Fresh instance with the kind's default state, placed at the origin
    pub fn new(id: &str, kind: ComponentKind) -> Self {
        let terminals = catalog::terminals_for(kind)
            .iter()
            .map(|desc| Terminal {
                id: desc.id.clone(),
                role: desc.role,
                direction: desc.direction,
                supply: desc.supply,
                bus: desc.bus.clone(),
            })
            .collect();

        ComponentInstance {
            id: id.to_string(),
            kind,
            terminals,
            state: ComponentState::default_for(kind),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
        }
    }

    /// Build a live instance from a placed-component record
    pub fn instantiate(placed: &PlacedComponent) -> SimResult<Self> {
        let kind = ComponentKind::from_type_name(&placed.component_type).ok_or_else(|| {
            SimError::UnknownComponentType {
                id: placed.id.clone(),
                kind: placed.component_type.clone(),
            }
        })?;

        let mut instance = ComponentInstance::new(&placed.id, kind);
        instance.x = placed.x;
        instance.y = placed.y;
        instance.rotation = placed.rotation;

        if kind == ComponentKind::Led {
            if let Some(color) = placed.component_type.to_lowercase().strip_prefix("led-") {
                instance.state = ComponentState::Led { color: color.to_string() };
            }
        }

        for (key, value) in &placed.props {
            instance.apply_property(key, value)?;
        }

        Ok(instance)
    }

    /// Apply one untyped property from the UI onto the typed state.
    /// Boolean flags only accept a literal `true`.
    pub fn apply_property(&mut self, key: &str, value: &Value) -> SimResult<()> {
        let id = self.id.clone();
        let number = |value: &Value| {
            value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| SimError::InvalidValue {
                    id: id.clone(),
                    property: key.to_string(),
                    reason: format!("expected a number, got {}", value),
                })
        };

        match (&mut self.state, key) {
            (ComponentState::Resistor { resistance }, "resistance") => {
                let ohms = number(value)?;
                if ohms < 0.0 {
                    return Err(SimError::InvalidValue {
                        id: id.clone(),
                        property: key.to_string(),
                        reason: "resistance cannot be negative".to_string(),
                    });
                }
                *resistance = ohms;
            }
            (ComponentState::Led { color }, "color") => {
                *color = value.as_str().unwrap_or("red").to_lowercase();
            }
            (ComponentState::Switch { pressed }, "pressed") => {
                *pressed = value == &Value::Bool(true);
            }
            (ComponentState::Potentiometer { position }, "position") => {
                *position = number(value)?.clamp(0.0, 1.0);
            }
            (ComponentState::Servo { angle }, "angle") => {
                *angle = number(value)?.clamp(0.0, 180.0);
            }
            (ComponentState::IrSensor { detected }, "detected") => {
                *detected = value == &Value::Bool(true);
            }
            (ComponentState::Ultrasonic { output_voltage, .. }, "outputVoltage") => {
                *output_voltage = number(value)?;
            }
            (ComponentState::Ultrasonic { distance_cm, .. }, "distance") => {
                *distance_cm = number(value)?.max(0.0);
            }
            (ComponentState::Dht11 { temperature, .. }, "temperature") => {
                *temperature = number(value)?;
            }
            (ComponentState::Dht11 { humidity, .. }, "humidity") => {
                *humidity = number(value)?;
            }
            _ => debug!("Ignoring property '{}' on {} ({})", key, self.id, self.kind),
        }

        Ok(())
    }

    pub fn terminal_index(&self, terminal_id: &str) -> Option<usize> {
        self.terminals.iter().position(|t| t.id == terminal_id)
    }

    /// A switch whose state currently conducts
    pub fn is_closed_switch(&self) -> bool {
        matches!(self.state, ComponentState::Switch { pressed: true })
    }

    pub fn is_open_switch(&self) -> bool {
        matches!(self.state, ComponentState::Switch { pressed: false })
    }

    /// Resistance for series-path sums; anything unusable falls back to the default
    pub fn resistance(&self) -> Option<f64> {
        match self.state {
            ComponentState::Resistor { resistance } if resistance.is_finite() && resistance >= 0.0 => {
                Some(resistance)
            }
            ComponentState::Resistor { .. } => Some(DEFAULT_RESISTANCE),
            _ => None,
        }
    }
}

/// Placed-component record as supplied by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

impl PlacedComponent {
    pub fn new(id: &str, component_type: &str) -> Self {
        PlacedComponent {
            id: id.to_string(),
            component_type: component_type.to_string(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            props: BTreeMap::new(),
        }
    }
}

/// Wire between two (component, terminal) pairs. Either end may be missing
/// while the user is still dragging; such wires are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wire {
    pub id: String,
    #[serde(default)]
    pub start_component: Option<String>,
    #[serde(default)]
    pub start_terminal: Option<String>,
    #[serde(default)]
    pub end_component: Option<String>,
    #[serde(default)]
    pub end_terminal: Option<String>,
}

impl Wire {
    pub fn new(id: &str, start: (&str, &str), end: (&str, &str)) -> Self {
        Wire {
            id: id.to_string(),
            start_component: Some(start.0.to_string()),
            start_terminal: Some(start.1.to_string()),
            end_component: Some(end.0.to_string()),
            end_terminal: Some(end.1.to_string()),
        }
    }

    pub fn endpoints(&self) -> Option<((&str, &str), (&str, &str))> {
        let start = (self.start_component.as_deref()?, self.start_terminal.as_deref()?);
        let end = (self.end_component.as_deref()?, self.end_terminal.as_deref()?);
        Some((start, end))
    }
}

/// Microcontroller pin mode from the logic panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinMode {
    High,
    Low,
    Input,
}

impl PinMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "HIGH" | "1" => Some(PinMode::High),
            "LOW" | "0" => Some(PinMode::Low),
            "INPUT" => Some(PinMode::Input),
            _ => None,
        }
    }
}

/// `board id -> pin id -> mode`
pub type PinStates = BTreeMap<String, BTreeMap<String, PinMode>>;

/// Complete circuit description: what the UI hands the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitLayout {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub components: Vec<PlacedComponent>,
    #[serde(default)]
    pub wires: Vec<Wire>,
    #[serde(default)]
    pub pin_states: PinStates,
}

impl CircuitLayout {
    pub fn new(title: &str) -> Self {
        CircuitLayout {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn part(mut self, id: &str, component_type: &str) -> Self {
        self.components.push(PlacedComponent::new(id, component_type));
        self
    }

    pub fn part_with(mut self, id: &str, component_type: &str, props: &[(&str, Value)]) -> Self {
        let mut placed = PlacedComponent::new(id, component_type);
        for (key, value) in props {
            placed.props.insert(key.to_string(), value.clone());
        }
        self.components.push(placed);
        self
    }

    pub fn wire(mut self, id: &str, start: (&str, &str), end: (&str, &str)) -> Self {
        self.wires.push(Wire::new(id, start, end));
        self
    }

    pub fn pin(mut self, board: &str, pin: &str, mode: PinMode) -> Self {
        self.pin_states
            .entry(board.to_string())
            .or_default()
            .insert(pin.to_string(), mode);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names_round_trip() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(ComponentKind::from_type_name("LED-Green"), Some(ComponentKind::Led));
        assert_eq!(ComponentKind::from_type_name("hc-sr04"), Some(ComponentKind::UltrasonicSensor));
        assert_eq!(ComponentKind::from_type_name("capacitor"), None);
    }

    #[test]
    fn test_instantiate_defaults() {
        let resistor = ComponentInstance::instantiate(&PlacedComponent::new("r1", "resistor")).unwrap();
        assert_eq!(resistor.state, ComponentState::Resistor { resistance: 220.0 });
        assert_eq!(resistor.terminals.len(), 2);

        let led = ComponentInstance::instantiate(&PlacedComponent::new("led1", "led-green")).unwrap();
        assert_eq!(led.state, ComponentState::Led { color: "green".to_string() });

        let plain = ComponentInstance::instantiate(&PlacedComponent::new("led2", "led")).unwrap();
        assert_eq!(plain.state, ComponentState::Led { color: "red".to_string() });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = ComponentInstance::instantiate(&PlacedComponent::new("c1", "capacitor")).unwrap_err();
        assert!(matches!(err, SimError::UnknownComponentType { .. }));
    }

    #[test]
    fn test_pressed_only_accepts_literal_true() {
        let mut button = ComponentInstance::new("sw1", ComponentKind::PushButton);
        for value in [json!("true"), json!(1), json!(null), json!(false)] {
            button.apply_property("pressed", &value).unwrap();
            assert!(!button.is_closed_switch(), "{} should not close the switch", value);
        }
        button.apply_property("pressed", &json!(true)).unwrap();
        assert!(button.is_closed_switch());
    }

    #[test]
    fn test_property_validation() {
        let mut resistor = ComponentInstance::new("r1", ComponentKind::Resistor);
        assert!(resistor.apply_property("resistance", &json!(-5.0)).is_err());
        assert!(resistor.apply_property("resistance", &json!("lots")).is_err());
        resistor.apply_property("resistance", &json!(1000)).unwrap();
        assert_eq!(resistor.resistance(), Some(1000.0));

        let mut pot = ComponentInstance::new("p1", ComponentKind::Potentiometer);
        pot.apply_property("position", &json!(3.0)).unwrap();
        assert_eq!(pot.state, ComponentState::Potentiometer { position: 1.0 });
    }

    #[test]
    fn test_wire_endpoints() {
        let wire = Wire::new("w1", ("r1", "t1"), ("led1", "anode"));
        assert_eq!(wire.endpoints(), Some((("r1", "t1"), ("led1", "anode"))));

        let dangling = Wire {
            end_terminal: None,
            ..wire
        };
        assert_eq!(dangling.endpoints(), None);
    }

    #[test]
    fn test_layout_from_json() {
        let content = r#"{
            "title": "blink",
            "components": [
                {"id": "r1", "type": "resistor", "x": 10, "y": 20, "props": {"resistance": 330}},
                {"id": "uno", "type": "arduino-uno"}
            ],
            "wires": [
                {"id": "w1", "startComponent": "uno", "startTerminal": "D13", "endComponent": "r1", "endTerminal": "t1"},
                {"id": "w2", "startComponent": "uno"}
            ],
            "pinStates": {"uno": {"D13": "HIGH"}}
        }"#;
        let layout = CircuitLayout::from_json_str(content).unwrap();
        assert_eq!(layout.components.len(), 2);
        assert_eq!(layout.components[0].x, 10.0);
        assert_eq!(layout.wires[1].endpoints(), None);
        assert_eq!(layout.pin_states["uno"]["D13"], PinMode::High);
    }
}
