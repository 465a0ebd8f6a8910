//! Synthetic keyboard/mouse state and the cross-device event coalescer.
//!
//! Every device tracks reference counts for the keys and mouse actions its
//! bindings synthesize during the current frame. `commit` folds those counts
//! into one global state under a single process-wide lock and emits exactly
//! the OS-level down/up/repeat events implied by the count deltas, so two
//! devices holding the same key produce one down and one up total.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::util::unlikely;

/// Initial delay before a held key starts repeating.
pub const KEY_REPEAT_DELAY: Duration = Duration::from_millis(500);
/// Interval between key repeats once repeating.
pub const KEY_REPEAT_INTERVAL: Duration = Duration::from_millis(25);
/// Interval between sustained wheel ticks while a wheel direction is held.
pub const WHEEL_SUSTAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Mouse buttons addressable by bindings and macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Wheel scroll directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelDirection {
    Up,
    Down,
}

/// OS input-injection collaborator. Implementations perform the actual
/// platform calls; tests substitute a recording fake.
pub trait InputSink: Send + Sync {
    fn key_down(&self, code: u16, scancode: bool);
    fn key_up(&self, code: u16, scancode: bool);
    fn mouse_down(&self, button: MouseButton);
    fn mouse_up(&self, button: MouseButton);
    fn wheel(&self, direction: WheelDirection);
    fn mouse_move(&self, dx: i32, dy: i32);
}

/// Countable mouse action slots: five buttons plus two wheel directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ClickSlot {
    Left,
    Right,
    Middle,
    X1,
    X2,
    WheelUp,
    WheelDown,
}

impl ClickSlot {
    pub const COUNT: usize = 7;

    pub const ALL: [ClickSlot; Self::COUNT] = [
        ClickSlot::Left,
        ClickSlot::Right,
        ClickSlot::Middle,
        ClickSlot::X1,
        ClickSlot::X2,
        ClickSlot::WheelUp,
        ClickSlot::WheelDown,
    ];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn button(self) -> Option<MouseButton> {
        match self {
            ClickSlot::Left => Some(MouseButton::Left),
            ClickSlot::Right => Some(MouseButton::Right),
            ClickSlot::Middle => Some(MouseButton::Middle),
            ClickSlot::X1 => Some(MouseButton::X1),
            ClickSlot::X2 => Some(MouseButton::X2),
            _ => None,
        }
    }

    #[inline]
    pub const fn wheel(self) -> Option<WheelDirection> {
        match self {
            ClickSlot::WheelUp => Some(WheelDirection::Up),
            ClickSlot::WheelDown => Some(WheelDirection::Down),
            _ => None,
        }
    }
}

/// Per-frame press counts for one key code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCounts {
    /// Virtual-code presses.
    pub vk: i32,
    /// Scan-code presses.
    pub sc: i32,
    /// Repeats fired while held.
    pub repeats: i32,
    /// Toggle-bucket presses.
    pub toggle_count: i32,
    /// Latched toggle state.
    pub toggle: bool,
}

impl KeyCounts {
    #[inline(always)]
    fn held(&self) -> bool {
        self.vk > 0 || self.sc > 0
    }
}

/// Previous/current frame counts for one key code.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPresses {
    pub previous: KeyCounts,
    pub current: KeyCounts,
}

/// Previous/current mouse action counters plus toggle latches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickState {
    pub current: [i32; ClickSlot::COUNT],
    pub previous: [i32; ClickSlot::COUNT],
    pub toggle: [bool; ClickSlot::COUNT],
    pub toggle_count: [i32; ClickSlot::COUNT],
}

/// One device's synthetic contribution for the frame being processed.
///
/// Mutated only by the owning device's report thread between commits;
/// created once per slot and cleared, never destroyed, on disconnect.
#[derive(Debug, Default)]
pub struct DeviceSynthetic {
    pub clicks: ClickState,
    pub keys: HashMap<u16, KeyPresses>,
    /// Mouse movement accumulated by movement bindings this frame.
    pub move_x: f64,
    pub move_y: f64,
    /// Carry for sub-pixel movement between frames.
    remainder_x: f64,
    remainder_y: f64,
}

impl DeviceSynthetic {
    /// Counts one key press for this frame.
    #[inline]
    pub fn press_key(&mut self, code: u16, scancode: bool) {
        let entry = self.keys.entry(code).or_default();
        if scancode {
            entry.current.sc += 1;
        } else {
            entry.current.vk += 1;
        }
    }

    /// Counts one toggle-key press edge for this frame.
    #[inline]
    pub fn press_key_toggle(&mut self, code: u16) {
        let entry = self.keys.entry(code).or_default();
        entry.current.toggle_count += 1;
    }

    /// Counts one mouse button/wheel activation for this frame.
    #[inline]
    pub fn press_click(&mut self, slot: ClickSlot) {
        self.clicks.current[slot.index()] += 1;
    }

    /// Counts one toggle mouse-binding press edge for this frame.
    #[inline]
    pub fn press_click_toggle(&mut self, slot: ClickSlot) {
        self.clicks.toggle_count[slot.index()] += 1;
    }

    /// Adds analog mouse movement for this frame.
    #[inline]
    pub fn add_move(&mut self, dx: f64, dy: f64) {
        self.move_x += dx;
        self.move_y += dy;
    }

    /// Zeroes current counts, leaving previous intact so the next commit
    /// releases everything this device still holds. Used on disconnect.
    pub fn clear_current(&mut self) {
        self.clicks.current = [0; ClickSlot::COUNT];
        self.clicks.toggle_count = [0; ClickSlot::COUNT];
        for presses in self.keys.values_mut() {
            presses.current = KeyCounts {
                toggle: presses.current.toggle,
                ..KeyCounts::default()
            };
        }
        self.move_x = 0.0;
        self.move_y = 0.0;
    }
}

/// Repeat/sustain timing for one global key entry.
#[derive(Debug, Clone, Copy, Default)]
struct KeyTiming {
    next_repeat: Option<Instant>,
    /// Bucket the key was last emitted with; a flip while held is replayed
    /// as a fresh press of the new bucket.
    scancode_mode: bool,
}

/// The merged keyboard/mouse state of all devices.
#[derive(Default)]
struct GlobalSynthetic {
    clicks: ClickState,
    keys: HashMap<u16, KeyPresses>,
    timing: HashMap<u16, KeyTiming>,
    next_wheel: [Option<Instant>; ClickSlot::COUNT],
}

/// Cross-device synthetic event coalescer.
///
/// All device threads funnel through the single internal lock; the critical
/// section covers only delta folding and emission (§5 of the design), never
/// the per-device pipeline stages.
pub struct Coalescer {
    global: Mutex<GlobalSynthetic>,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            global: Mutex::new(GlobalSynthetic::default()),
        }
    }

    /// Folds one device's frame into the global state and emits the implied
    /// OS events. Advances previous-to-current for the global state first,
    /// then for the device, so edges survive two devices targeting the same
    /// key in one frame.
    pub fn commit(&self, device: &mut DeviceSynthetic, sink: &dyn InputSink) {
        self.commit_at(device, sink, Instant::now())
    }

    /// `commit` with an explicit clock, for deterministic tests.
    pub fn commit_at(&self, device: &mut DeviceSynthetic, sink: &dyn InputSink, now: Instant) {
        let mut global = self.global.lock().unwrap_or_else(|e| e.into_inner());

        Self::fold_clicks(&mut global, device, sink, now);
        Self::fold_keys(&mut global, device, sink, now);

        // Movement: whole pixels emitted, fraction carried to the next frame.
        let total_x = device.move_x + device.remainder_x;
        let total_y = device.move_y + device.remainder_y;
        let dx = total_x.trunc() as i32;
        let dy = total_y.trunc() as i32;
        if dx != 0 || dy != 0 {
            sink.mouse_move(dx, dy);
        }
        device.remainder_x = total_x.fract();
        device.remainder_y = total_y.fract();
        device.move_x = 0.0;
        device.move_y = 0.0;

        // Save-to-previous: global first, then device-local.
        global.clicks.previous = global.clicks.current;
        global.clicks.toggle_count = [0; ClickSlot::COUNT];
        for presses in global.keys.values_mut() {
            presses.previous = presses.current;
            presses.current.toggle_count = 0;
            presses.current.repeats = presses.previous.repeats;
        }
        drop(global);

        device.clicks.previous = device.clicks.current;
        device.clicks.current = [0; ClickSlot::COUNT];
        device.clicks.toggle_count = [0; ClickSlot::COUNT];
        for presses in device.keys.values_mut() {
            presses.previous = presses.current;
            presses.current = KeyCounts {
                toggle: presses.current.toggle,
                ..KeyCounts::default()
            };
        }
    }

    fn fold_clicks(
        global: &mut GlobalSynthetic,
        device: &mut DeviceSynthetic,
        sink: &dyn InputSink,
        now: Instant,
    ) {
        for slot in ClickSlot::ALL {
            let i = slot.index();

            let delta = device.clicks.current[i] - device.clicks.previous[i];
            global.clicks.current[i] = (global.clicks.current[i] + delta).max(0);

            // Toggle bindings act on the toggle edge only.
            let toggles = device.clicks.toggle_count[i];
            for _ in 0..toggles {
                global.clicks.toggle[i] = !global.clicks.toggle[i];
                if let Some(button) = slot.button() {
                    if global.clicks.toggle[i] {
                        sink.mouse_down(button);
                    } else {
                        sink.mouse_up(button);
                    }
                }
                global.clicks.toggle_count[i] += 1;
            }
            device.clicks.toggle[i] = global.clicks.toggle[i];

            let current = global.clicks.current[i];
            let previous = global.clicks.previous[i];
            if current > 0 && previous == 0 {
                if let Some(button) = slot.button() {
                    sink.mouse_down(button);
                } else if let Some(direction) = slot.wheel() {
                    sink.wheel(direction);
                    global.next_wheel[i] = Some(now + WHEEL_SUSTAIN_INTERVAL);
                }
            } else if current == 0 && previous > 0 {
                if let Some(button) = slot.button() {
                    sink.mouse_up(button);
                }
                global.next_wheel[i] = None;
            } else if current > 0
                && let Some(direction) = slot.wheel()
                && let Some(deadline) = global.next_wheel[i]
                && now >= deadline
            {
                // Sustained scrolling while the direction stays active.
                sink.wheel(direction);
                global.next_wheel[i] = Some(now + WHEEL_SUSTAIN_INTERVAL);
            }
        }
    }

    fn fold_keys(
        global: &mut GlobalSynthetic,
        device: &mut DeviceSynthetic,
        sink: &dyn InputSink,
        now: Instant,
    ) {
        for (&code, presses) in device.keys.iter_mut() {
            let entry = global.keys.entry(code).or_default();
            entry.current.vk = (entry.current.vk + presses.current.vk - presses.previous.vk).max(0);
            entry.current.sc = (entry.current.sc + presses.current.sc - presses.previous.sc).max(0);

            // Toggle bucket: emit on the toggle edge only.
            for _ in 0..presses.current.toggle_count {
                entry.current.toggle = !entry.current.toggle;
                entry.current.toggle_count += 1;
                if entry.current.toggle {
                    sink.key_down(code, false);
                } else {
                    sink.key_up(code, false);
                }
            }
            presses.current.toggle = entry.current.toggle;

            let timing = global.timing.entry(code).or_default();
            let held = entry.current.held();
            let was_held = entry.previous.held();
            let scancode = entry.current.sc > 0;

            if held && !was_held {
                sink.key_down(code, scancode);
                timing.scancode_mode = scancode;
                timing.next_repeat = Some(now + KEY_REPEAT_DELAY);
            } else if !held && was_held {
                sink.key_up(code, timing.scancode_mode);
                timing.next_repeat = None;
            } else if held {
                if unlikely(scancode != timing.scancode_mode) {
                    // Bucket flip while held counts as a fresh press.
                    sink.key_up(code, timing.scancode_mode);
                    sink.key_down(code, scancode);
                    timing.scancode_mode = scancode;
                    timing.next_repeat = Some(now + KEY_REPEAT_DELAY);
                } else if let Some(deadline) = timing.next_repeat
                    && now >= deadline
                {
                    sink.key_down(code, scancode);
                    entry.current.repeats += 1;
                    timing.next_repeat = Some(now + KEY_REPEAT_INTERVAL);
                }
            }
        }
    }

    /// Whether any wheel direction currently sustains scrolling.
    pub fn wheel_active(&self) -> bool {
        let global = self.global.lock().unwrap_or_else(|e| e.into_inner());
        global.next_wheel.iter().any(|deadline| deadline.is_some())
    }
}
