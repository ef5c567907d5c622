//! Static terminal catalog.
//!
//! Maps every component kind to its ordered list of terminal descriptors.
//! The order is significant: two-terminal parts are always listed as
//! (first, second) and the engine relies on that for pass-through and
//! series-graph edge direction. Offsets are in component-local pixels and
//! only matter to the renderer.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentInstance, ComponentKind};

/// Electrical role of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalRole {
    Positive,
    Negative,
    Signal,
    Power,
    Ground,
    Data,
    Gpio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
    Bidirectional,
}

/// How a terminal seeds the net it ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Supply {
    /// Always sources the given voltage.
    Fixed(f64),
    /// Always ties its net to 0V.
    Ground,
    /// Board GPIO: sources or sinks only when the pin map drives it.
    Gpio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalDescriptor {
    pub id: String,
    pub role: TerminalRole,
    pub direction: Direction,
    pub offset: (f64, f64),
    pub supply: Option<Supply>,
    /// Terminals of one component sharing a bus are internally joined.
    pub bus: Option<String>,
}

impl TerminalDescriptor {
    fn new(id: &str, role: TerminalRole, direction: Direction, x: f64, y: f64) -> Self {
        TerminalDescriptor {
            id: id.to_string(),
            role,
            direction,
            offset: (x, y),
            supply: None,
            bus: None,
        }
    }

    fn supply(mut self, supply: Supply) -> Self {
        self.supply = Some(supply);
        self
    }

    fn bus(mut self, bus: String) -> Self {
        self.bus = Some(bus);
        self
    }
}

pub const BREADBOARD_COLUMNS: usize = 30;
pub const BREADBOARD_RAIL_HOLES: usize = 25;
const BREADBOARD_PITCH: f64 = 10.0;

lazy_static! {
    static ref CATALOG: HashMap<ComponentKind, Vec<TerminalDescriptor>> = build_catalog();
}

/// Ordered terminal descriptors for a component kind.
pub fn terminals_for(kind: ComponentKind) -> &'static [TerminalDescriptor] {
    CATALOG.get(&kind).map(Vec::as_slice).unwrap_or(&[])
}

/// Look up a single descriptor by terminal id.
pub fn descriptor(kind: ComponentKind, terminal_id: &str) -> Option<&'static TerminalDescriptor> {
    terminals_for(kind).iter().find(|t| t.id == terminal_id)
}

/// Absolute position of a terminal, applying the component's rotation
/// (degrees, clockwise in screen space) about its origin.
pub fn terminal_position(component: &ComponentInstance, terminal_id: &str) -> Option<(f64, f64)> {
    let desc = descriptor(component.kind, terminal_id)?;
    let (dx, dy) = desc.offset;
    let theta = component.rotation.to_radians();
    let (sin, cos) = theta.sin_cos();
    let rx = dx * cos - dy * sin;
    let ry = dx * sin + dy * cos;
    Some((component.x + rx, component.y + ry))
}

fn build_catalog() -> HashMap<ComponentKind, Vec<TerminalDescriptor>> {
    use Direction::*;
    use TerminalRole::*;

    let mut catalog = HashMap::new();

    catalog.insert(
        ComponentKind::PowerSource,
        vec![TerminalDescriptor::new("vcc", Power, Output, 0.0, 20.0).supply(Supply::Fixed(5.0))],
    );
    catalog.insert(
        ComponentKind::Ground,
        vec![TerminalDescriptor::new("gnd", Ground, Input, 0.0, -20.0).supply(Supply::Ground)],
    );
    catalog.insert(
        ComponentKind::Resistor,
        vec![
            TerminalDescriptor::new("t1", Signal, Bidirectional, -30.0, 0.0),
            TerminalDescriptor::new("t2", Signal, Bidirectional, 30.0, 0.0),
        ],
    );
    catalog.insert(
        ComponentKind::Led,
        vec![
            TerminalDescriptor::new("anode", Positive, Input, -5.0, 25.0),
            TerminalDescriptor::new("cathode", Negative, Output, 5.0, 25.0),
        ],
    );
    for kind in [ComponentKind::PushButton, ComponentKind::SlideSwitch] {
        catalog.insert(
            kind,
            vec![
                TerminalDescriptor::new("t1", Signal, Bidirectional, -15.0, 15.0),
                TerminalDescriptor::new("t2", Signal, Bidirectional, 15.0, 15.0),
            ],
        );
    }
    catalog.insert(
        ComponentKind::Buzzer,
        vec![
            TerminalDescriptor::new("positive", Positive, Input, -8.0, 22.0),
            TerminalDescriptor::new("negative", Negative, Input, 8.0, 22.0),
        ],
    );
    catalog.insert(
        ComponentKind::Potentiometer,
        vec![
            TerminalDescriptor::new("vcc", Power, Input, -15.0, 25.0),
            TerminalDescriptor::new("wiper", Signal, Output, 0.0, 25.0),
            TerminalDescriptor::new("gnd", Ground, Input, 15.0, 25.0),
        ],
    );
    catalog.insert(
        ComponentKind::Servo,
        vec![
            TerminalDescriptor::new("gnd", Ground, Input, -10.0, 30.0),
            TerminalDescriptor::new("vcc", Power, Input, 0.0, 30.0),
            TerminalDescriptor::new("signal", Signal, Input, 10.0, 30.0),
        ],
    );
    catalog.insert(
        ComponentKind::IrSensor,
        vec![
            TerminalDescriptor::new("vcc", Power, Input, -10.0, 25.0),
            TerminalDescriptor::new("gnd", Ground, Input, 0.0, 25.0),
            TerminalDescriptor::new("out", Signal, Output, 10.0, 25.0),
        ],
    );
    catalog.insert(
        ComponentKind::UltrasonicSensor,
        vec![
            TerminalDescriptor::new("vcc", Power, Input, -15.0, 20.0),
            TerminalDescriptor::new("trig", Signal, Input, -5.0, 20.0),
            TerminalDescriptor::new("echo", Signal, Output, 5.0, 20.0),
            TerminalDescriptor::new("gnd", Ground, Input, 15.0, 20.0),
        ],
    );
    catalog.insert(
        ComponentKind::Dht11,
        vec![
            TerminalDescriptor::new("vcc", Power, Input, -10.0, 25.0),
            TerminalDescriptor::new("data", Data, Output, 0.0, 25.0),
            TerminalDescriptor::new("gnd", Ground, Input, 10.0, 25.0),
        ],
    );
    catalog.insert(ComponentKind::ArduinoUno, arduino_uno_terminals());
    catalog.insert(ComponentKind::Esp32, esp32_terminals());
    catalog.insert(ComponentKind::Breadboard, breadboard_terminals());

    catalog
}

fn arduino_uno_terminals() -> Vec<TerminalDescriptor> {
    use Direction::*;
    use TerminalRole::*;

    // Power header along the bottom edge
    let mut pins = vec![
        TerminalDescriptor::new("3V3", Power, Output, 90.0, 95.0).supply(Supply::Fixed(3.3)),
        TerminalDescriptor::new("5V", Power, Output, 100.0, 95.0).supply(Supply::Fixed(5.0)),
        TerminalDescriptor::new("GND", Ground, Output, 110.0, 95.0).supply(Supply::Ground),
        TerminalDescriptor::new("GND2", Ground, Output, 120.0, 95.0).supply(Supply::Ground),
        TerminalDescriptor::new("VIN", Power, Input, 130.0, 95.0),
    ];
    for i in 0..=13 {
        let id = format!("D{}", i);
        pins.push(
            TerminalDescriptor::new(&id, Gpio, Bidirectional, 200.0 - 10.0 * i as f64, -95.0)
                .supply(Supply::Gpio),
        );
    }
    for i in 0..=5 {
        let id = format!("A{}", i);
        pins.push(
            TerminalDescriptor::new(&id, Gpio, Bidirectional, 150.0 + 10.0 * i as f64, 95.0)
                .supply(Supply::Gpio),
        );
    }
    pins
}

fn esp32_terminals() -> Vec<TerminalDescriptor> {
    use Direction::*;
    use TerminalRole::*;

    let mut pins = vec![
        TerminalDescriptor::new("3V3", Power, Output, -40.0, -70.0).supply(Supply::Fixed(3.3)),
        TerminalDescriptor::new("GND", Ground, Output, -40.0, -60.0).supply(Supply::Ground),
        TerminalDescriptor::new("VIN", Power, Input, 40.0, -70.0),
    ];
    let gpio = [
        2, 4, 5, 12, 13, 14, 15, 16, 17, 18, 19, 21, 22, 23, 25, 26, 27, 32, 33,
    ];
    for (row, n) in gpio.iter().enumerate() {
        let id = format!("D{}", n);
        let x = if row % 2 == 0 { -40.0 } else { 40.0 };
        let y = -50.0 + 10.0 * (row / 2) as f64;
        pins.push(TerminalDescriptor::new(&id, Gpio, Bidirectional, x, y).supply(Supply::Gpio));
    }
    pins
}

/// Hole ids: `a1`..`j30` for the strips, `tp1`/`tn1`/`bp1`/`bn1`.. for the
/// rails. Rows a-e of a column share one bus, f-j another.
fn breadboard_terminals() -> Vec<TerminalDescriptor> {
    use Direction::*;
    use TerminalRole::*;

    let mut holes = Vec::new();
    let rails = [("tp", "top+", -30.0), ("tn", "top-", -20.0)];
    for (prefix, bus, y) in rails {
        for hole in 1..=BREADBOARD_RAIL_HOLES {
            let x = BREADBOARD_PITCH * (hole as f64 + ((hole - 1) / 5) as f64);
            holes.push(
                TerminalDescriptor::new(&format!("{}{}", prefix, hole), Signal, Bidirectional, x, y)
                    .bus(bus.to_string()),
            );
        }
    }
    for col in 1..=BREADBOARD_COLUMNS {
        for (i, row) in ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j'].iter().enumerate() {
            let half = if i < 5 { "top" } else { "bottom" };
            let y = BREADBOARD_PITCH * i as f64 + if i < 5 { 0.0 } else { 10.0 };
            holes.push(
                TerminalDescriptor::new(
                    &format!("{}{}", row, col),
                    Signal,
                    Bidirectional,
                    BREADBOARD_PITCH * col as f64,
                    y,
                )
                .bus(format!("col{}-{}", col, half)),
            );
        }
    }
    let rails = [("bp", "bottom+", 120.0), ("bn", "bottom-", 130.0)];
    for (prefix, bus, y) in rails {
        for hole in 1..=BREADBOARD_RAIL_HOLES {
            let x = BREADBOARD_PITCH * (hole as f64 + ((hole - 1) / 5) as f64);
            holes.push(
                TerminalDescriptor::new(&format!("{}{}", prefix, hole), Signal, Bidirectional, x, y)
                    .bus(bus.to_string()),
            );
        }
    }
    holes
}
