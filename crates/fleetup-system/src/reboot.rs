use fleetup_backend::Rebooter;
use log::{error, warn};

/// Restarts the device with `shutdown -r now` and ends the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRebooter;

impl Rebooter for SystemRebooter {
    fn reboot(&self) {
        warn!("[update] rebooting ...");
        log::logger().flush();

        if let Err(error) = std::process::Command::new("sync").status() {
            error!("[update] sync failed: {error}");
        }
        match std::process::Command::new("shutdown")
            .args(["-r", "now"])
            .status()
        {
            Ok(status) if !status.success() => error!("[update] shutdown exited with {status}"),
            Ok(_) => {}
            Err(error) => error!("[update] failed to run shutdown: {error}"),
        }

        log::logger().flush();
        std::process::exit(0);
    }
}
