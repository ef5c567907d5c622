pub mod catalog;
pub mod circuit;
pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod evaluate;
pub mod led;
pub mod net;
pub mod parser;
pub mod partition;
pub mod propagate;
pub mod simulator;

// Re-export commonly used types
pub use circuit::{CircuitLayout, ComponentInstance, ComponentKind, ComponentState, PinMode, Wire};
pub use diagnostics::{CircuitFault, FaultKind, Severity};
pub use error::SimError;
pub use evaluate::{ComponentProperties, ComponentReading, PinLevel};
pub use parser::CircuitParser;
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
