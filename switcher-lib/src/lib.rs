pub mod constants;
pub mod crc;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod message;
pub mod packet;
pub mod status;

#[cfg(test)]
mod tests;

// Re-export the main entry points for easy access
pub use device::Switcher;
pub use discovery::{DiscoveredDevice, StatusEvent, StatusListener, discover};
pub use error::SwitcherError;
pub use events::SwitcherEvent;
pub use status::{DeviceId, DeviceState, DeviceStatus, SessionToken};
