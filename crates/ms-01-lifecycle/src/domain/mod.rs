//! Domain layer: the mobile station and its settings.

pub mod call_control;
pub mod settings;
pub mod station;

pub use call_control::CallControlSink;
pub use settings::{ChannelCapability, MsSettings, SimType, TestCardSettings, DEFAULT_FBTS_PORT, DEFAULT_IMEI};
pub use station::{MobileStation, StopOutcome};
