//! Special-action lifecycle: profile swap, program launch, disconnect,
//! battery check, wheel calibration and macro triggers bound to control
//! combinations, with tap/hold/double-tap disambiguation.
//!
//! Action payloads arrive fully decoded from the profile; nothing is parsed
//! here. Each configured action owns one state cell per device, rebuilt on
//! profile swap.

use std::time::{Duration, Instant};

use tracing::info;

use crate::bindings::{Profile, SpecialActionDef, SpecialBehavior};
use crate::fieldmap::FieldMapping;
use crate::macros::{MacroEngine, MacroRequest};
use crate::resolver::control_active;
use crate::util::{fnv1a_hash_codes, fnv1a_hash_u64, fnv64};

/// Window in which a second tap counts as a double-tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(150);
/// Continuous hold long enough to pick the hold outcome.
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(500);

/// Host operations special actions can request. The engine owner implements
/// this against the device/profile collaborators.
pub trait SpecialHost: Send + Sync {
    fn swap_profile(&self, device: usize, profile: &str);
    fn launch_program(&self, path: &str);
    fn disconnect(&self, device: usize);
    fn battery_check(&self, device: usize);
    fn start_wheel_calibration(&self, device: usize);
}

/// Per-action lifecycle state.
#[derive(Debug, Clone, Default)]
struct ActionState {
    active: bool,
    /// Tap/hold disambiguation flags.
    first_touch: bool,
    tapped_once: bool,
    second_touch_begin: bool,
    press_time: Option<Instant>,
    first_tap_time: Option<Instant>,
    /// Profile active before a swap, restored on automatic untrigger.
    saved_profile: Option<String>,
}

/// All special-action state for one device under the current profile.
#[derive(Debug, Default)]
pub struct SpecialRuntime {
    states: Vec<ActionState>,
    /// Trigger-combination signature suppressed after a profile swap until
    /// the combination is fully released, preventing a double-fire across
    /// the switch.
    suppressed: Option<u64>,
}

impl SpecialRuntime {
    pub fn new(profile: &Profile) -> Self {
        Self {
            states: vec![ActionState::default(); profile.special_actions.len()],
            suppressed: None,
        }
    }

    /// Carries swap suppression into the state set for a newly loaded
    /// profile; everything else starts idle.
    pub fn rebuild(&mut self, profile: &Profile) {
        self.states = vec![ActionState::default(); profile.special_actions.len()];
    }

    /// Advances every configured action by one frame.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        device: usize,
        profile: &Profile,
        input: &FieldMapping,
        now: Instant,
        host: &dyn SpecialHost,
        macros: &MacroEngine,
    ) {
        if self.states.len() != profile.special_actions.len() {
            self.rebuild(profile);
        }

        // Suppression clears only once the swapped combination is released.
        if let Some(signature) = self.suppressed {
            let still_held = profile
                .special_actions
                .iter()
                .any(|def| combo_signature(&def.trigger) == signature && combo_active(input, def));
            if !still_held {
                self.suppressed = None;
            }
        }

        for (index, def) in profile.special_actions.iter().enumerate() {
            let suppressed = self.suppressed == Some(combo_signature(&def.trigger));
            let state = &mut self.states[index];
            if suppressed {
                continue;
            }
            match &def.behavior {
                SpecialBehavior::MultiTap {
                    tap,
                    hold,
                    double_tap,
                } => {
                    if let Some(outcome) =
                        step_multi_tap(state, combo_active(input, def), now, hold, double_tap)
                    {
                        let behavior = match outcome {
                            TapOutcome::Tap => tap.as_ref(),
                            TapOutcome::Hold => hold.as_deref().unwrap_or(tap.as_ref()),
                            TapOutcome::DoubleTap => double_tap.as_deref().unwrap_or(tap.as_ref()),
                        };
                        self.fire(device, index, profile, behavior.clone(), host, macros);
                    }
                }
                behavior => {
                    let triggered = combo_active(input, def);
                    let untriggered = if def.untrigger.is_empty() {
                        !triggered
                    } else {
                        def.untrigger.iter().all(|c| control_active(input, *c))
                    };
                    if triggered && !self.states[index].active {
                        self.states[index].active = true;
                        self.fire(device, index, profile, behavior.clone(), host, macros);
                    } else if self.states[index].active && untriggered {
                        self.states[index].active = false;
                        self.untrigger(device, index, profile, host);
                    }
                }
            }
        }
    }

    fn fire(
        &mut self,
        device: usize,
        index: usize,
        profile: &Profile,
        behavior: SpecialBehavior,
        host: &dyn SpecialHost,
        macros: &MacroEngine,
    ) {
        match behavior {
            SpecialBehavior::ProfileSwap { profile: target } => {
                info!(device, %target, "profile swap triggered");
                self.states[index].saved_profile = Some(profile.name.clone());
                self.suppressed = Some(combo_signature(
                    &profile.special_actions[index].trigger,
                ));
                host.swap_profile(device, &target);
            }
            SpecialBehavior::LaunchProgram { path } => host.launch_program(&path),
            SpecialBehavior::Disconnect => host.disconnect(device),
            SpecialBehavior::BatteryCheck => host.battery_check(device),
            SpecialBehavior::WheelCalibrate => host.start_wheel_calibration(device),
            SpecialBehavior::Macro {
                codes,
                synchronized,
                keep_state,
            } => {
                let signature = special_macro_signature(device, index, &codes);
                macros.play(MacroRequest {
                    device,
                    codes,
                    signature,
                    scancode: false,
                    synchronized,
                    keep_state,
                    alt_tab_interval: Duration::from_millis(100),
                });
            }
            SpecialBehavior::MultiTap { tap, .. } => {
                // Nested multi-tap payloads collapse to their tap outcome.
                self.fire(device, index, profile, *tap, host, macros);
            }
        }
    }

    fn untrigger(&mut self, device: usize, index: usize, _profile: &Profile, host: &dyn SpecialHost) {
        if let Some(saved) = self.states[index].saved_profile.take() {
            info!(device, %saved, "profile swap reverted");
            host.swap_profile(device, &saved);
        }
    }
}

/// Outcome of one multi-tap step, if any.
enum TapOutcome {
    Tap,
    Hold,
    DoubleTap,
}

/// One frame of the tap / tap-and-hold / double-tap disambiguation.
fn step_multi_tap(
    state: &mut ActionState,
    active: bool,
    now: Instant,
    hold: &Option<Box<SpecialBehavior>>,
    double_tap: &Option<Box<SpecialBehavior>>,
) -> Option<TapOutcome> {
    let was_active = state.active;
    state.active = active;

    if active && !was_active {
        if state.tapped_once
            && let Some(first) = state.first_tap_time
            && now.duration_since(first) <= DOUBLE_TAP_WINDOW
        {
            state.second_touch_begin = true;
            state.tapped_once = false;
        } else {
            state.first_touch = true;
            state.press_time = Some(now);
        }
        return None;
    }

    if active && state.first_touch && hold.is_some() {
        if let Some(pressed) = state.press_time
            && now.duration_since(pressed) >= HOLD_THRESHOLD
        {
            state.first_touch = false;
            return Some(TapOutcome::Hold);
        }
        return None;
    }

    if !active && was_active {
        if state.second_touch_begin {
            state.second_touch_begin = false;
            return Some(TapOutcome::DoubleTap);
        }
        if state.first_touch {
            state.first_touch = false;
            if double_tap.is_some() {
                // Wait out the double-tap window before committing to a tap.
                state.tapped_once = true;
                state.first_tap_time = Some(now);
                return None;
            }
            return Some(TapOutcome::Tap);
        }
        return None;
    }

    if !active
        && state.tapped_once
        && let Some(first) = state.first_tap_time
        && now.duration_since(first) > DOUBLE_TAP_WINDOW
    {
        state.tapped_once = false;
        return Some(TapOutcome::Tap);
    }

    None
}

fn combo_active(input: &FieldMapping, def: &SpecialActionDef) -> bool {
    !def.trigger.is_empty() && def.trigger.iter().all(|c| control_active(input, *c))
}

fn combo_signature(combo: &[crate::controls::ControlId]) -> u64 {
    combo
        .iter()
        .fold(fnv64::OFFSET_BASIS, |hash, c| {
            fnv1a_hash_u64(hash, c.index() as u64)
        })
}

fn special_macro_signature(device: usize, index: usize, codes: &[i64]) -> u64 {
    let hash = fnv1a_hash_u64(fnv64::OFFSET_BASIS, device as u64);
    let hash = fnv1a_hash_u64(hash, 0x5000 + index as u64);
    fnv1a_hash_codes(hash, codes)
}
