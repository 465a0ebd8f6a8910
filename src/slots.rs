//! Virtual output slot management.
//!
//! Connect/disconnect against the output bus can take tens of milliseconds,
//! so report threads never call the bus directly for lifecycle changes: they
//! queue actions on a channel drained by one dedicated worker. A single
//! consumer guarantees bus operations are never reordered or overlapped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use tracing::{info, warn};

use crate::controls::OutputFrame;

/// Logical controller slots available to the service.
pub const SLOT_COUNT: usize = 4;

/// Settle delay before a regular disconnect reaches the bus.
const DETACH_SETTLE: Duration = Duration::from_millis(100);

/// Virtual output device collaborator.
pub trait OutputBus: Send + Sync {
    fn connect(&self, slot: usize) -> anyhow::Result<()>;
    fn disconnect(&self, slot: usize) -> anyhow::Result<()>;
    /// Per-frame state push for a connected slot.
    fn submit(&self, slot: usize, frame: &OutputFrame);
}

enum SlotAction {
    Attach(usize),
    Detach { slot: usize, immediate: bool },
}

/// Serializes slot lifecycle onto one background worker; the connected table
/// is readable lock-free from report threads.
pub struct OutputSlotManager {
    queue: Sender<SlotAction>,
    connected: Arc<[AtomicBool; SLOT_COUNT]>,
}

impl OutputSlotManager {
    pub fn new(bus: Arc<dyn OutputBus>) -> Self {
        let (queue, rx) = unbounded::<SlotAction>();
        let connected: Arc<[AtomicBool; SLOT_COUNT]> =
            Arc::new(std::array::from_fn(|_| AtomicBool::new(false)));
        let table = connected.clone();
        let spawned = thread::Builder::new()
            .name("output_slots".to_string())
            .spawn(move || {
                for action in rx {
                    match action {
                        SlotAction::Attach(slot) => match bus.connect(slot) {
                            Ok(()) => {
                                table[slot].store(true, Ordering::Release);
                                info!(slot, "output slot connected");
                            }
                            Err(err) => warn!(slot, %err, "output slot connect failed"),
                        },
                        SlotAction::Detach { slot, immediate } => {
                            if !immediate {
                                thread::sleep(DETACH_SETTLE);
                            }
                            table[slot].store(false, Ordering::Release);
                            match bus.disconnect(slot) {
                                Ok(()) => info!(slot, "output slot disconnected"),
                                Err(err) => warn!(slot, %err, "output slot disconnect failed"),
                            }
                        }
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(%err, "output slot worker spawn failed");
        }
        Self { queue, connected }
    }

    /// Queues a connect; completes on the worker, never here.
    pub fn attach(&self, slot: usize) {
        if slot < SLOT_COUNT {
            let _ = self.queue.send(SlotAction::Attach(slot));
        }
    }

    /// Queues a disconnect. `immediate` skips the settle delay; a queued
    /// action still runs to completion once started.
    pub fn detach(&self, slot: usize, immediate: bool) {
        if slot < SLOT_COUNT {
            let _ = self.queue.send(SlotAction::Detach { slot, immediate });
        }
    }

    #[inline]
    pub fn is_connected(&self, slot: usize) -> bool {
        slot < SLOT_COUNT && self.connected[slot].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct BusRecorder {
        ops: Mutex<Vec<(usize, bool)>>,
    }

    impl OutputBus for BusRecorder {
        fn connect(&self, slot: usize) -> anyhow::Result<()> {
            self.ops.lock().unwrap().push((slot, true));
            Ok(())
        }
        fn disconnect(&self, slot: usize) -> anyhow::Result<()> {
            self.ops.lock().unwrap().push((slot, false));
            Ok(())
        }
        fn submit(&self, _slot: usize, _frame: &OutputFrame) {}
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "slot worker too slow");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_attach_detach_in_submission_order() {
        let bus = Arc::new(BusRecorder::default());
        let manager = OutputSlotManager::new(bus.clone());

        manager.attach(0);
        manager.attach(1);
        manager.detach(0, true);
        wait_for(|| bus.ops.lock().unwrap().len() == 3);

        assert_eq!(
            bus.ops.lock().unwrap().as_slice(),
            &[(0, true), (1, true), (0, false)]
        );
        assert!(!manager.is_connected(0));
        assert!(manager.is_connected(1));
    }

    #[test]
    fn test_out_of_range_slot_ignored() {
        let bus = Arc::new(BusRecorder::default());
        let manager = OutputSlotManager::new(bus.clone());
        manager.attach(SLOT_COUNT);
        manager.detach(SLOT_COUNT, true);
        assert!(!manager.is_connected(SLOT_COUNT));
        thread::sleep(Duration::from_millis(20));
        assert!(bus.ops.lock().unwrap().is_empty());
    }
}
