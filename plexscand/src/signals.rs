//! Bridges OS signals to the control-plane channel.
//!
//! Signal handling itself is delegated to `signal-hook`'s self-pipe-backed
//! iterator, which already satisfies the async-signal-safety requirement:
//! the only code that runs in true signal-handler context lives inside that
//! crate. Our side just reads delivered signals off a background thread and
//! forwards them through `ControlHandle::raise`, never touching Watcher,
//! Scheduler, or DirCache state directly.

use plexscan_core::{ControlEvent, ControlHandle};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

pub fn spawn_signal_bridge(control: ControlHandle) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-bridge".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGINT | SIGTERM => {
                        info!(signal, "shutdown signal received");
                        control.raise(ControlEvent::Exit);
                    }
                    SIGHUP => {
                        info!("reload signal received");
                        control.raise(ControlEvent::Reload);
                    }
                    _ => {}
                }
            }
        })?;

    Ok(())
}
