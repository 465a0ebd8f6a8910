//! Per-report orchestration.
//!
//! One call per device report: normalize, transform, resolve, commit, and
//! hand the merged state to the virtual bus. The active profile is a
//! read-only snapshot behind a lock-free pointer, so a profile swap never
//! pauses report threads.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use scc::{AtomicShared, Guard, Shared, Tag};
use tracing::info;

use crate::bindings::Profile;
use crate::controls::{AXIS_NEUTRAL, ControlId, ControllerFrame, OutputFrame};
use crate::device::{DeviceRegistry, FeedbackSink, LightbarSink};
use crate::macros::MacroEngine;
use crate::resolver::{ResolveContext, resolve};
use crate::slots::{OutputBus, OutputSlotManager};
use crate::special::SpecialHost;
use crate::synthetic::{Coalescer, InputSink};
use crate::transform::{transform_gyro, transform_stick, transform_trigger};
use crate::wheel::CalibrationPhase;

/// The remapping engine: owns all per-device runtime state and the shared
/// synthesis machinery, driven by external report threads.
pub struct Engine {
    profile: AtomicShared<Profile>,
    registry: DeviceRegistry,
    coalescer: Coalescer,
    macros: MacroEngine,
    slots: OutputSlotManager,
    input_sink: Arc<dyn InputSink>,
    bus: Arc<dyn OutputBus>,
    feedback: Arc<dyn FeedbackSink>,
    lightbar: Arc<dyn LightbarSink>,
}

impl Engine {
    pub fn new(
        profile: Profile,
        input_sink: Arc<dyn InputSink>,
        bus: Arc<dyn OutputBus>,
        feedback: Arc<dyn FeedbackSink>,
        lightbar: Arc<dyn LightbarSink>,
    ) -> Self {
        let macros = MacroEngine::new(input_sink.clone(), feedback.clone(), lightbar.clone());
        let slots = OutputSlotManager::new(bus.clone());
        Self {
            profile: AtomicShared::from(Shared::new(profile)),
            registry: DeviceRegistry::new(),
            coalescer: Coalescer::new(),
            macros,
            slots,
            input_sink,
            bus,
            feedback,
            lightbar,
        }
    }

    pub fn macros(&self) -> &MacroEngine {
        &self.macros
    }

    pub fn slots(&self) -> &OutputSlotManager {
        &self.slots
    }

    /// Installs a new profile snapshot without pausing report threads.
    pub fn swap_profile(&self, profile: Profile) {
        info!(profile = %profile.name, "profile swapped");
        let _ = self
            .profile
            .swap((Some(Shared::new(profile)), Tag::None), Ordering::Release);
    }

    /// Name of the currently installed profile.
    pub fn profile_name(&self) -> String {
        let guard = Guard::new();
        self.profile
            .load(Ordering::Acquire, &guard)
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    /// Queues the slot's virtual output device connect.
    pub fn connect_device(&self, slot: usize) {
        self.slots.attach(slot);
    }

    /// Device gone: releases everything it holds, resets its runtime and
    /// queues the output disconnect.
    pub fn disconnect_device(&self, slot: usize, immediate: bool) {
        let mut runtime = self
            .registry
            .slot(slot)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        runtime.reset_for_disconnect();
        // Zeroed counts plus one commit force-release held keys/buttons.
        self.coalescer
            .commit(&mut runtime.synthetic, &*self.input_sink);
        drop(runtime);
        self.slots.detach(slot, immediate);
        info!(slot, "device disconnected");
    }

    /// Processes one raw report and returns the merged output state.
    pub fn process_report(
        &self,
        slot: usize,
        frame: &ControllerFrame,
        host: &dyn SpecialHost,
        elapsed_ms: f64,
    ) -> OutputFrame {
        self.process_report_at(slot, frame, host, elapsed_ms, Instant::now())
    }

    /// `process_report` with an explicit clock, for deterministic tests.
    pub fn process_report_at(
        &self,
        slot: usize,
        frame: &ControllerFrame,
        host: &dyn SpecialHost,
        elapsed_ms: f64,
        now: Instant,
    ) -> OutputFrame {
        let guard = Guard::new();
        let Some(profile) = self.profile.load(Ordering::Acquire, &guard).as_ref() else {
            return OutputFrame::default();
        };

        let mut runtime = self
            .registry
            .slot(slot)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if runtime.profile_name != profile.name {
            runtime.special.rebuild(profile);
            runtime.extras_active = [false; ControlId::COUNT];
            runtime.profile_name = profile.name.clone();
        }

        let transformed = transform_frame(frame, profile);
        let runtime = &mut *runtime;
        runtime.previous.populate(&runtime.previous_frame, None);
        runtime.input.populate(&transformed, None);
        runtime.output.clear();

        let mut ctx = ResolveContext {
            device: slot,
            profile,
            input: &runtime.input,
            previous: &runtime.previous,
            output: &mut runtime.output,
            synthetic: &mut runtime.synthetic,
            remap: &mut runtime.remap,
            mouse: &mut runtime.mouse,
            extras_active: &mut runtime.extras_active,
            elapsed_ms,
        };
        resolve(&mut ctx, &self.macros, &*self.feedback, &*self.lightbar);

        runtime
            .special
            .update(slot, profile, &runtime.input, now, host, &self.macros);

        if runtime.wheel.phase() == CalibrationPhase::Recording {
            // South confirms the next anchor; the lightbar mirrors progress.
            runtime
                .wheel
                .calibrate_step(frame.gyro_x, frame.gyro_z, frame.south, now);
            let (color, flash) = runtime.wheel.calibration_feedback(frame.gyro_x, frame.gyro_z);
            self.lightbar.set_override(slot, Some(color), flash);
        }

        self.coalescer
            .commit_at(&mut runtime.synthetic, &*self.input_sink, now);

        let mut out = OutputFrame::default();
        runtime.output.populate_state(&mut out);
        out.macro_buttons = self.macros.pad_buttons();
        merge_macro_buttons(&mut out);

        if profile.wheel.enabled {
            out.lx = runtime
                .wheel
                .to_axis(frame.gyro_x, frame.gyro_z, &profile.wheel);
            out.ly = AXIS_NEUTRAL;
        }

        runtime.previous_frame = *frame;

        if self.slots.is_connected(slot) {
            self.bus.submit(slot, &out);
        }
        out
    }

    pub fn start_wheel_calibration(&self, slot: usize) {
        let mut runtime = self
            .registry
            .slot(slot)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let seed = runtime.previous_frame;
        runtime.wheel.start_calibration(seed.gyro_x, seed.gyro_z);
        info!(slot, "wheel calibration started");
    }

    /// Commits calibration; `false` means the anchors were incomplete and
    /// the wheel reverted to uncalibrated.
    pub fn finish_wheel_calibration(&self, slot: usize) -> bool {
        let mut runtime = self
            .registry
            .slot(slot)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let accepted = runtime.wheel.finish_calibration();
        self.lightbar.set_override(slot, None, false);
        info!(slot, accepted, "wheel calibration finished");
        accepted
    }

    pub fn cancel_wheel_calibration(&self, slot: usize) {
        let mut runtime = self
            .registry
            .slot(slot)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        runtime.wheel.cancel_calibration();
        self.lightbar.set_override(slot, None, false);
    }
}

/// Applies the per-axis transform pipeline to one raw report.
fn transform_frame(frame: &ControllerFrame, profile: &Profile) -> ControllerFrame {
    let mut out = *frame;
    (out.lx, out.ly) = transform_stick(frame.lx, frame.ly, &profile.left_stick);
    (out.rx, out.ry) = transform_stick(frame.rx, frame.ry, &profile.right_stick);
    out.l2 = transform_trigger(frame.l2, &profile.l2);
    out.r2 = transform_trigger(frame.r2, &profile.r2);
    out.gyro_x = transform_gyro(frame.gyro_x, &profile.gyro);
    out.gyro_z = transform_gyro(frame.gyro_z, &profile.gyro);
    out
}

/// Folds macro-driven gamepad buttons onto the canonical button fields, in
/// control declaration order.
fn merge_macro_buttons(out: &mut OutputFrame) {
    let m = &out.macro_buttons;
    out.south |= m[0];
    out.east |= m[1];
    out.west |= m[2];
    out.north |= m[3];
    out.dpad_up |= m[4];
    out.dpad_down |= m[5];
    out.dpad_left |= m[6];
    out.dpad_right |= m[7];
    out.l1 |= m[8];
    out.r1 |= m[9];
    out.l3 |= m[10];
    out.r3 |= m[11];
    out.start |= m[12];
    out.select |= m[13];
    out.guide |= m[14];
    out.mute |= m[15];
}
