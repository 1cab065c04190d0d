// Resource monitor (spec §4.7 step 4): polls a running script's wall-clock
// budget and memory footprint on a fixed cadence and interrupts the
// interpreter the first time either budget is exceeded, recording which
// one it was so the caller can report an accurate `Interrupted` error.

use super::pool::VMHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which budget the monitor caught a script exceeding. Kept separate from
/// `InterruptKind` — the monitor only ever detects these two conditions,
/// never a call-stack overflow, and callers map each variant onto the
/// error taxonomy themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorViolation {
    Timeout,
    Memory,
}

/// Spawns a background task that polls `handle` every 100ms for the
/// duration of `deadline` (spec §4.7/§9 "resource monitor polls at 100ms
/// resolution"). Returns a watch receiver that fires with `Some(violation)`
/// the moment a violation is detected; the task exits on its own once
/// `stop` is signalled (normal completion) or the deadline passes.
pub fn spawn(handle: Arc<VMHandle>, deadline: Duration, max_memory_bytes: usize, mut stop: watch::Receiver<bool>) -> watch::Receiver<Option<MonitorViolation>> {
    let (tx, rx) = watch::channel(None);
    let start = Instant::now();

    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if start.elapsed() >= deadline {
                        handle.interrupt();
                        let _ = tx.send(Some(MonitorViolation::Timeout));
                        return;
                    }
                    if handle.memory_used_bytes() >= max_memory_bytes {
                        handle.interrupt();
                        let _ = tx.send(Some(MonitorViolation::Memory));
                        return;
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
            }
        }
    });

    rx
}
