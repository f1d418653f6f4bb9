//! Host integrations for fleetup on Linux devices.

mod control;
mod reboot;

pub use control::LinuxSystem;
pub use reboot::SystemRebooter;
