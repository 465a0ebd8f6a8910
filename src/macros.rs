//! Macro playback engine.
//!
//! Macros run as named background threads so a multi-hundred-millisecond code
//! list never stalls the report thread that triggered it. Synchronized macros
//! are serialized through a dedicated channel per trigger signature with a
//! single consumer, which makes overlapping re-triggers strictly FIFO without
//! any shared dictionary of continuations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, warn};

use crate::device::{FeedbackSink, LightbarSink};
use crate::synthetic::{InputSink, MouseButton};

/// Number of gamepad buttons addressable by macro codes 261..=285.
pub const MACRO_BUTTON_COUNT: usize = 25;

/// First reserved mouse-button code.
const MOUSE_CODE_BASE: i64 = 256;
/// First gamepad macro-button code.
const PAD_CODE_BASE: i64 = 261;
/// Last gamepad macro-button code.
const PAD_CODE_LAST: i64 = 285;
/// Delay codes encode `value - DELAY_CODE_BASE` milliseconds.
const DELAY_CODE_BASE: i64 = 300;
/// Rumble codes start here: `base + heavy*1000 + light`.
const RUMBLE_CODE_BASE: i64 = 1_000_000;
/// Lightbar codes start here: `base + r*10^6 + g*10^3 + b`; the bare base
/// value forces the override off.
const LIGHTBAR_CODE_BASE: i64 = 1_000_000_000;

/// Virtual codes of the reserved Alt+Tab sequence.
const ALT_TAB_CODES: [i64; 2] = [164, 9];
const VK_ALT: u16 = 164;
const VK_TAB: u16 = 9;

/// One playback request, fully resolved by the caller.
#[derive(Debug, Clone)]
pub struct MacroRequest {
    pub device: usize,
    pub codes: Vec<i64>,
    /// FNV-1a over device, trigger control and codes; keys the FIFO lane and
    /// the in-flight marker.
    pub signature: u64,
    /// Emit keys as scan codes instead of virtual codes.
    pub scancode: bool,
    /// Serialize re-triggers of this signature instead of overlapping them.
    pub synchronized: bool,
    /// Leave keys/buttons down at list end instead of force-releasing.
    pub keep_state: bool,
    /// Minimum spacing between Tab taps for the Alt+Tab handler.
    pub alt_tab_interval: Duration,
}

struct MacroJob {
    request: MacroRequest,
    cancel: Arc<AtomicBool>,
}

struct EngineShared {
    input: Arc<dyn InputSink>,
    feedback: Arc<dyn FeedbackSink>,
    lightbar: Arc<dyn LightbarSink>,
    /// Gamepad buttons driven by running macros, merged into the output
    /// state each frame.
    pad_buttons: [AtomicBool; MACRO_BUTTON_COUNT],
    /// Signatures with a task in flight; blocks relaunch until completion
    /// or an explicit end.
    in_flight: scc::HashSet<u64>,
    /// Cancellation flag per in-flight signature.
    cancel_flags: scc::HashMap<u64, Arc<AtomicBool>>,
}

/// Spawns and serializes macro playback tasks.
pub struct MacroEngine {
    shared: Arc<EngineShared>,
    lanes: scc::HashMap<u64, Sender<MacroJob>>,
}

impl MacroEngine {
    pub fn new(
        input: Arc<dyn InputSink>,
        feedback: Arc<dyn FeedbackSink>,
        lightbar: Arc<dyn LightbarSink>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                input,
                feedback,
                lightbar,
                pad_buttons: std::array::from_fn(|_| AtomicBool::new(false)),
                in_flight: scc::HashSet::new(),
                cancel_flags: scc::HashMap::new(),
            }),
            lanes: scc::HashMap::new(),
        }
    }

    /// Current macro-driven gamepad button states.
    pub fn pad_buttons(&self) -> [bool; MACRO_BUTTON_COUNT] {
        std::array::from_fn(|i| self.shared.pad_buttons[i].load(Ordering::Relaxed))
    }

    /// Starts (or, for a synchronized macro, enqueues) one playback.
    ///
    /// A signature already in flight is left alone; it re-arms when the task
    /// completes or [`end`](Self::end) clears it.
    pub fn play(&self, request: MacroRequest) {
        if request.codes.is_empty() {
            // Malformed list: schedule nothing, never an error.
            debug!(signature = request.signature, "empty macro ignored");
            return;
        }
        let signature = request.signature;
        if self.shared.in_flight.insert_sync(signature).is_err() {
            return;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let _ = self
            .shared
            .cancel_flags
            .upsert_sync(signature, cancel.clone());
        let job = MacroJob { request, cancel };

        if job.request.synchronized {
            let _ = self.lane(signature).send(job);
        } else {
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name("macro".to_string())
                .spawn(move || run_job(&shared, job));
            if let Err(err) = spawned {
                warn!(%err, "macro thread spawn failed");
                self.shared.in_flight.remove_sync(&signature);
            }
        }
    }

    /// Forcibly ends the signature's playback: the task abandons the list at
    /// the next code boundary and the next press edge may relaunch.
    pub fn end(&self, signature: u64) {
        if let Some(cancel) = self
            .shared
            .cancel_flags
            .read_sync(&signature, |_, flag| flag.clone())
        {
            cancel.store(true, Ordering::Release);
        }
        self.shared.in_flight.remove_sync(&signature);
    }

    /// Whether the signature has a task in flight.
    pub fn in_flight(&self, signature: u64) -> bool {
        self.shared.in_flight.contains_sync(&signature)
    }

    /// FIFO lane for one trigger signature, created with its single consumer
    /// thread on first use and kept for the service lifetime.
    fn lane(&self, signature: u64) -> Sender<MacroJob> {
        loop {
            if let Some(tx) = self.lanes.read_sync(&signature, |_, tx| tx.clone()) {
                return tx;
            }
            let (tx, rx) = unbounded::<MacroJob>();
            if self.lanes.insert_sync(signature, tx.clone()).is_ok() {
                let shared = self.shared.clone();
                let spawned = thread::Builder::new()
                    .name(format!("macro_lane_{signature:016x}"))
                    .spawn(move || {
                        for job in rx {
                            run_job(&shared, job);
                        }
                    });
                if let Err(err) = spawned {
                    warn!(%err, "macro lane spawn failed");
                }
                return tx;
            }
            // Lost the creation race; reread the winner's sender.
        }
    }
}

fn run_job(shared: &EngineShared, job: MacroJob) {
    let signature = job.request.signature;
    if job.request.codes == ALT_TAB_CODES {
        run_alt_tab(shared, &job);
    } else {
        run_codes(shared, &job);
    }
    if !job.cancel.load(Ordering::Acquire) {
        shared.in_flight.remove_sync(&signature);
    }
    // A cancelled job may already have been replaced; only drop our own flag.
    shared
        .cancel_flags
        .remove_if_sync(&signature, |flag| Arc::ptr_eq(flag, &job.cancel));
}

/// Plays one code list, guaranteeing balanced key/button release at the end
/// unless the request keeps state.
fn run_codes(shared: &EngineShared, job: &MacroJob) {
    let request = &job.request;
    let mut keydown = [false; MOUSE_CODE_BASE as usize + 5];
    let mut pad_down = [false; MACRO_BUTTON_COUNT];

    for &code in &request.codes {
        if job.cancel.load(Ordering::Acquire) {
            break;
        }
        match code {
            0..MOUSE_CODE_BASE => {
                let key = code as u16;
                let slot = &mut keydown[code as usize];
                if *slot {
                    shared.input.key_up(key, request.scancode);
                } else {
                    shared.input.key_down(key, request.scancode);
                }
                *slot = !*slot;
            }
            MOUSE_CODE_BASE..PAD_CODE_BASE => {
                let button = mouse_button(code);
                let slot = &mut keydown[code as usize];
                if *slot {
                    shared.input.mouse_up(button);
                } else {
                    shared.input.mouse_down(button);
                }
                *slot = !*slot;
            }
            PAD_CODE_BASE..=PAD_CODE_LAST => {
                let index = (code - PAD_CODE_BASE) as usize;
                let down = !pad_down[index];
                pad_down[index] = down;
                shared.pad_buttons[index].store(down, Ordering::Relaxed);
            }
            DELAY_CODE_BASE..RUMBLE_CODE_BASE => {
                thread::sleep(Duration::from_millis((code - DELAY_CODE_BASE) as u64));
            }
            RUMBLE_CODE_BASE..LIGHTBAR_CODE_BASE => {
                let value = code - RUMBLE_CODE_BASE;
                let heavy = ((value / 1000) % 1000).min(255) as u8;
                let light = (value % 1000).min(255) as u8;
                shared.feedback.rumble(request.device, heavy, light);
            }
            LIGHTBAR_CODE_BASE.. => {
                if code == LIGHTBAR_CODE_BASE {
                    shared.lightbar.set_override(request.device, None, false);
                } else {
                    let value = code - LIGHTBAR_CODE_BASE;
                    let color = [
                        ((value / 1_000_000) % 1000).min(255) as u8,
                        ((value / 1000) % 1000).min(255) as u8,
                        (value % 1000).min(255) as u8,
                    ];
                    shared.lightbar.set_override(request.device, Some(color), false);
                }
            }
            _ => {
                debug!(code, "uninterpretable macro code skipped");
            }
        }
    }

    if request.keep_state {
        return;
    }
    // Stuck-input prevention: everything still down goes up, even after a
    // forced end mid-list.
    for (code, down) in keydown.iter().enumerate() {
        if !down {
            continue;
        }
        if (code as i64) < MOUSE_CODE_BASE {
            shared.input.key_up(code as u16, request.scancode);
        } else {
            shared.input.mouse_up(mouse_button(code as i64));
        }
    }
    for (index, down) in pad_down.iter().enumerate() {
        if *down {
            shared.pad_buttons[index].store(false, Ordering::Relaxed);
        }
    }
}

/// Dedicated two-phase Alt+Tab handler: Alt goes down once and stays down,
/// Tab is re-tapped no faster than the configured interval, and the end edge
/// releases both as one combined Alt+Tab-up.
fn run_alt_tab(shared: &EngineShared, job: &MacroJob) {
    let request = &job.request;
    shared.input.key_down(VK_ALT, false);
    shared.input.key_down(VK_TAB, false);
    loop {
        thread::sleep(request.alt_tab_interval);
        if job.cancel.load(Ordering::Acquire) {
            break;
        }
        shared.input.key_up(VK_TAB, false);
        shared.input.key_down(VK_TAB, false);
    }
    shared.input.key_up(VK_TAB, false);
    shared.input.key_up(VK_ALT, false);
}

#[inline]
fn mouse_button(code: i64) -> MouseButton {
    match code - MOUSE_CODE_BASE {
        0 => MouseButton::Left,
        1 => MouseButton::Right,
        2 => MouseButton::Middle,
        3 => MouseButton::X1,
        _ => MouseButton::X2,
    }
}
