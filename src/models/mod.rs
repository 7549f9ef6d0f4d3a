pub mod config;
pub mod decision;
pub mod signal;

pub use config::{
    DetectionConfig, GateConfig, GateTimings, ServerConfig, StorageConfig, TimingConfig,
};
pub use decision::DecisionRecord;
pub use signal::{FocusChange, PointerKind, Signal};
