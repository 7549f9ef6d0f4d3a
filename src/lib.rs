// musicgate - Music gate coordinator
// Waits for the user to start the embedded player, then hands off to the main page

pub mod cli;
pub mod clock;
pub mod coordinator;
pub mod models;
pub mod server;
pub mod session;
pub mod store;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use coordinator::{Effect, GateCoordinator, GateState, StartOutcome};
pub use models::{DecisionRecord, GateConfig, Signal};
pub use session::{GateHost, GateSession, SessionOutcome};
