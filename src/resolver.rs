//! Binding resolution and the deferred remap queue.
//!
//! Runs once per frame per device, after the transform pipeline: picks the
//! active layer for each control, dispatches the four action kinds, then
//! drains the control-to-control remap queue into the output field mapping.
//! Remaps are deferred so several inputs can combine onto one output axis;
//! the larger-magnitude contribution wins deterministically.

use smallvec::SmallVec;

use crate::bindings::{BindingAction, BindingExtras, MoveDirection, Profile};
use crate::controls::{AXIS_NEUTRAL, ControlId, ControlKind};
use crate::device::{FeedbackSink, LightbarSink};
use crate::fieldmap::{FieldMapping, axis_magnitude};
use crate::macros::{MacroEngine, MacroRequest};
use crate::synthetic::DeviceSynthetic;
use crate::util::{fnv1a_hash_codes, fnv1a_hash_u64, fnv64};

/// Reference frame duration for time-scaled cursor movement, ms.
const FRAME_REFERENCE_MS: f64 = 8.0;
/// Spacing for Alt+Tab re-taps launched from bindings.
const ALT_TAB_TAP_MS: u64 = 100;
/// Acceleration ramp saturates after this much continuous activity, ms.
const ACCEL_RAMP_MS: f64 = 500.0;

/// Per-device cursor movement state carried across frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseMotion {
    /// Milliseconds of consecutive movement activity, drives the ramp.
    accel_ms: f64,
    /// Temporary speed override installed by binding extras, percent.
    pub sensitivity_override: Option<u32>,
}

/// Deferred control-to-control remap pairs for one frame.
pub type RemapQueue = SmallVec<[(ControlId, ControlId); 16]>;

/// Everything the resolver reads and writes for one device frame.
pub struct ResolveContext<'a> {
    pub device: usize,
    pub profile: &'a Profile,
    pub input: &'a FieldMapping,
    pub previous: &'a FieldMapping,
    pub output: &'a mut FieldMapping,
    pub synthetic: &'a mut DeviceSynthetic,
    pub remap: &'a mut RemapQueue,
    pub mouse: &'a mut MouseMotion,
    pub extras_active: &'a mut [bool; ControlId::COUNT],
    /// Time since the previous report, ms.
    pub elapsed_ms: f64,
}

/// Resolves all 38 controls for one frame.
pub fn resolve(
    ctx: &mut ResolveContext<'_>,
    engine: &MacroEngine,
    feedback: &dyn FeedbackSink,
    lightbar: &dyn LightbarSink,
) {
    let shift_active = ctx
        .profile
        .shift_trigger
        .map(|control| control_active(ctx.input, control))
        .unwrap_or(false);

    ctx.output.touch_button = ctx.input.touch_button;
    let mut movement_active = false;

    for control in ControlId::ALL {
        let active = control_active(ctx.input, control);
        let was_active = control_active(ctx.previous, control);

        match ctx.profile.action_for(control, shift_active) {
            BindingAction::PassThrough => pass_through(ctx.input, ctx.output, control),
            BindingAction::Control { target } => {
                if active {
                    ctx.remap.push((control, *target));
                }
            }
            BindingAction::Key {
                code,
                toggle,
                scancode,
            } => {
                if *toggle {
                    if active && !was_active {
                        ctx.synthetic.press_key_toggle(*code);
                    }
                } else if active {
                    ctx.synthetic.press_key(*code, *scancode);
                }
            }
            BindingAction::Macro {
                codes,
                synchronized,
                repeat_held,
                keep_state,
            } => {
                let press_edge = active && !was_active;
                let release_edge = !active && was_active;
                if press_edge || (active && *repeat_held) {
                    engine.play(MacroRequest {
                        device: ctx.device,
                        codes: codes.clone(),
                        signature: macro_signature(ctx.device, control, codes),
                        scancode: false,
                        synchronized: *synchronized,
                        keep_state: *keep_state,
                        alt_tab_interval: std::time::Duration::from_millis(ALT_TAB_TAP_MS),
                    });
                } else if release_edge && !*repeat_held {
                    engine.end(macro_signature(ctx.device, control, codes));
                }
            }
            BindingAction::MouseButton { button, toggle } => {
                if *toggle {
                    if active && !was_active {
                        ctx.synthetic.press_click_toggle(button.slot());
                    }
                } else if active {
                    ctx.synthetic.press_click(button.slot());
                }
            }
            BindingAction::MouseMove {
                direction,
                sensitivity,
            } => {
                if active {
                    movement_active = true;
                    let magnitude = control_magnitude(ctx.input, control);
                    let pixels = move_pixels(ctx, *sensitivity, magnitude);
                    let (dx, dy) = match direction {
                        MoveDirection::Up => (0.0, -pixels),
                        MoveDirection::Down => (0.0, pixels),
                        MoveDirection::Left => (-pixels, 0.0),
                        MoveDirection::Right => (pixels, 0.0),
                    };
                    ctx.synthetic.add_move(dx, dy);
                }
            }
        }
    }

    drain_remaps(ctx);
    apply_extras(ctx, shift_active, feedback, lightbar);

    // Acceleration decays twice as fast as it builds.
    if ctx.profile.mouse_accel {
        if movement_active {
            ctx.mouse.accel_ms = (ctx.mouse.accel_ms + ctx.elapsed_ms).min(ACCEL_RAMP_MS);
        } else {
            ctx.mouse.accel_ms = (ctx.mouse.accel_ms - 2.0 * ctx.elapsed_ms).max(0.0);
        }
    }
}

/// FIFO signature for a macro bound to one control on one device.
pub fn macro_signature(device: usize, control: ControlId, codes: &[i64]) -> u64 {
    let hash = fnv1a_hash_u64(fnv64::OFFSET_BASIS, device as u64);
    let hash = fnv1a_hash_u64(hash, control.index() as u64);
    fnv1a_hash_codes(hash, codes)
}

/// Whether a control is past its activation point this frame.
pub fn control_active(mapping: &FieldMapping, control: ControlId) -> bool {
    let i = control.index();
    match control.kind() {
        ControlKind::Button | ControlKind::Touch => mapping.buttons[i],
        ControlKind::AxisDir => {
            let value = mapping.axis_dirs[i];
            if axis_dir_negative(control) {
                value < AXIS_NEUTRAL
            } else {
                value > AXIS_NEUTRAL
            }
        }
        ControlKind::Trigger => mapping.triggers[i] > 0,
        ControlKind::GyroDir => mapping.gyro_dirs[i] != 0,
        ControlKind::Swipe => mapping.swipe_bools[i],
    }
}

/// Normalized activation magnitude in [0, 1].
pub fn control_magnitude(mapping: &FieldMapping, control: ControlId) -> f64 {
    let i = control.index();
    match control.kind() {
        ControlKind::Button | ControlKind::Touch => {
            if mapping.buttons[i] { 1.0 } else { 0.0 }
        }
        ControlKind::AxisDir => {
            if control_active(mapping, control) {
                axis_magnitude(mapping.axis_dirs[i]) as f64 / 127.0
            } else {
                0.0
            }
        }
        ControlKind::Trigger => mapping.triggers[i] as f64 / 255.0,
        ControlKind::GyroDir => (mapping.gyro_dirs[i].unsigned_abs() as f64 / 128.0).min(1.0),
        ControlKind::Swipe => mapping.swipe_dirs[i] as f64 / 255.0,
    }
}

/// Whether an axis-direction control covers the below-neutral half.
#[inline]
const fn axis_dir_negative(control: ControlId) -> bool {
    matches!(
        control,
        ControlId::LxNeg | ControlId::LyNeg | ControlId::RxNeg | ControlId::RyNeg
    )
}

/// Identity remap: copies the control's slot from input to output.
fn pass_through(input: &FieldMapping, output: &mut FieldMapping, control: ControlId) {
    let i = control.index();
    match control.kind() {
        ControlKind::Button | ControlKind::Touch => output.buttons[i] = input.buttons[i],
        ControlKind::AxisDir => output.axis_dirs[i] = input.axis_dirs[i],
        ControlKind::Trigger => output.triggers[i] = input.triggers[i],
        ControlKind::GyroDir => output.gyro_dirs[i] = input.gyro_dirs[i],
        ControlKind::Swipe => {
            output.swipe_dirs[i] = input.swipe_dirs[i];
            output.swipe_bools[i] = input.swipe_bools[i];
        }
    }
}

/// Drains queued `(source, dest)` pairs into the output mapping, merging by
/// maximum magnitude per destination.
fn drain_remaps(ctx: &mut ResolveContext<'_>) {
    for (source, dest) in ctx.remap.drain(..) {
        let magnitude = control_magnitude(ctx.input, source);
        let i = dest.index();
        match dest.kind() {
            ControlKind::Button | ControlKind::Touch => {
                ctx.output.buttons[i] |= magnitude > 0.0;
            }
            ControlKind::AxisDir => {
                let candidate = axis_dir_byte(dest, magnitude);
                if axis_magnitude(candidate) > axis_magnitude(ctx.output.axis_dirs[i]) {
                    ctx.output.axis_dirs[i] = candidate;
                }
            }
            ControlKind::Trigger => {
                let candidate = (magnitude * 255.0) as u8;
                if candidate > ctx.output.triggers[i] {
                    ctx.output.triggers[i] = candidate;
                }
            }
            ControlKind::GyroDir => {
                let candidate = (magnitude * 128.0) as i32;
                let sign = if matches!(dest, ControlId::GyroXNeg | ControlId::GyroZNeg) {
                    -1
                } else {
                    1
                };
                if candidate > ctx.output.gyro_dirs[i].abs() {
                    ctx.output.gyro_dirs[i] = sign * candidate;
                }
            }
            ControlKind::Swipe => {
                let candidate = (magnitude * 255.0) as u8;
                if candidate > ctx.output.swipe_dirs[i] {
                    ctx.output.swipe_dirs[i] = candidate;
                    ctx.output.swipe_bools[i] = candidate > 0;
                }
            }
        }
    }
}

/// Axis byte for a direction control at a given magnitude.
#[inline]
fn axis_dir_byte(control: ControlId, magnitude: f64) -> u8 {
    let offset = (magnitude.clamp(0.0, 1.0) * 127.0) as u8;
    if axis_dir_negative(control) {
        AXIS_NEUTRAL - offset
    } else {
        AXIS_NEUTRAL + offset.min(127)
    }
}

/// Exponential cursor speed: `(1.002 + s/10000)^(m*127) - 1`, time-scaled to
/// the report interval and multiplied by the acceleration ramp.
fn move_pixels(ctx: &ResolveContext<'_>, sensitivity: u32, magnitude: f64) -> f64 {
    let mut speed = sensitivity as f64;
    if let Some(override_pct) = ctx.mouse.sensitivity_override {
        speed = speed * override_pct as f64 / 100.0;
    }
    let base = 1.002 + speed / 10_000.0;
    let rate = base.powf(magnitude * 127.0) - 1.0;
    let ramp = if ctx.profile.mouse_accel {
        1.0 + ctx.mouse.accel_ms / ACCEL_RAMP_MS
    } else {
        1.0
    };
    rate * ramp * (ctx.elapsed_ms / FRAME_REFERENCE_MS)
}

/// Applies and reverts press-edge extras (rumble pulse, forced lightbar,
/// temporary mouse-speed override) symmetrically per control.
fn apply_extras(
    ctx: &mut ResolveContext<'_>,
    shift_active: bool,
    feedback: &dyn FeedbackSink,
    lightbar: &dyn LightbarSink,
) {
    for control in ControlId::ALL {
        let Some(extras) = ctx.profile.extras_for(control) else {
            continue;
        };
        if extras.is_empty() {
            continue;
        }
        // Extras fire for any non-passthrough binding on the control.
        if matches!(
            ctx.profile.action_for(control, shift_active),
            BindingAction::PassThrough
        ) {
            continue;
        }
        let active = control_active(ctx.input, control);
        let held = &mut ctx.extras_active[control.index()];
        if active && !*held {
            *held = true;
            engage_extras(ctx.device, extras, ctx.mouse, feedback, lightbar);
        } else if !active && *held {
            *held = false;
            revert_extras(ctx.device, extras, ctx.mouse, feedback, lightbar);
        }
    }
}

fn engage_extras(
    device: usize,
    extras: &BindingExtras,
    mouse: &mut MouseMotion,
    feedback: &dyn FeedbackSink,
    lightbar: &dyn LightbarSink,
) {
    if let Some((heavy, light)) = extras.rumble {
        feedback.rumble(device, heavy, light);
    }
    if let Some(color) = extras.lightbar {
        lightbar.set_override(device, Some(color), extras.lightbar_flash);
    }
    if let Some(pct) = extras.mouse_sensitivity {
        mouse.sensitivity_override = Some(pct);
    }
}

fn revert_extras(
    device: usize,
    extras: &BindingExtras,
    mouse: &mut MouseMotion,
    feedback: &dyn FeedbackSink,
    lightbar: &dyn LightbarSink,
) {
    if extras.rumble.is_some() {
        feedback.rumble(device, 0, 0);
    }
    if extras.lightbar.is_some() {
        lightbar.set_override(device, None, false);
    }
    if extras.mouse_sensitivity.is_some() {
        mouse.sensitivity_override = None;
    }
}
