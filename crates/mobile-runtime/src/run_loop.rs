//! Main loop of the `mobile` binary.
//!
//! Ticks the [`Supervisor`] every `period`, and back to back while stations
//! report work. Interrupts are checked before every tick; the first one
//! shuts down gracefully, any later one forces the shutdown.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::supervisor::Supervisor;

/// Run until the supervisor reports `done`.
///
/// A closed interrupt channel counts as a forced shutdown.
pub async fn run(
    supervisor: &Supervisor,
    period: Duration,
    interrupts: &mut UnboundedReceiver<()>,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seen = 0u32;
    let mut pending = false;

    loop {
        tokio::select! {
            biased;
            received = interrupts.recv() => {
                if received.is_none() {
                    warn!("Interrupt source closed, forcing shutdown");
                    supervisor.shutdown(true);
                } else {
                    seen += 1;
                    let force = seen > 1;
                    info!(force, "Shutdown requested");
                    supervisor.shutdown(force);
                }
            }
            () = tokio::task::yield_now(), if pending => {}
            _ = interval.tick() => {}
        }

        let tick = supervisor.tick();
        if tick.done {
            break;
        }
        pending = tick.work;
    }
}
