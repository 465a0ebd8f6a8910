//! Per-device runtime state and the slot registry.
//!
//! Everything a report thread mutates for its own controller lives in one
//! [`DeviceRuntime`] owned by the registry arena and locked per slot, so no
//! module-level per-device arrays exist. Cross-device state stays confined
//! to the synthetic coalescer and the macro engine.

use std::sync::Mutex;

use crate::controls::{ControlId, ControllerFrame};
use crate::fieldmap::FieldMapping;
use crate::resolver::{MouseMotion, RemapQueue};
use crate::special::SpecialRuntime;
use crate::synthetic::DeviceSynthetic;
use crate::wheel::WheelState;

/// Rumble output to the physical controller.
pub trait FeedbackSink: Send + Sync {
    fn rumble(&self, device: usize, heavy: u8, light: u8);
}

/// Lightbar override output to the physical controller. `None` releases the
/// override back to the ambient animation.
pub trait LightbarSink: Send + Sync {
    fn set_override(&self, device: usize, color: Option<[u8; 3]>, flash: bool);
}

/// Connected controller slots supported by the service.
pub const DEVICE_SLOTS: usize = 4;

/// All mutable per-device pipeline state.
pub struct DeviceRuntime {
    pub slot: usize,
    /// Post-transform view of the current frame.
    pub input: FieldMapping,
    /// Post-remap view, rebuilt every frame.
    pub output: FieldMapping,
    /// Prior frame's raw view, for edge detection.
    pub previous: FieldMapping,
    /// Raw report from the prior frame.
    pub previous_frame: ControllerFrame,
    pub synthetic: DeviceSynthetic,
    pub remap: RemapQueue,
    pub mouse: MouseMotion,
    pub extras_active: [bool; ControlId::COUNT],
    pub special: SpecialRuntime,
    pub wheel: WheelState,
    /// Profile the special/extras state was built against.
    pub profile_name: String,
}

impl DeviceRuntime {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            input: FieldMapping::default(),
            output: FieldMapping::default(),
            previous: FieldMapping::default(),
            previous_frame: ControllerFrame::default(),
            synthetic: DeviceSynthetic::default(),
            remap: RemapQueue::new(),
            mouse: MouseMotion::default(),
            extras_active: [false; ControlId::COUNT],
            special: SpecialRuntime::default(),
            wheel: WheelState::default(),
            profile_name: String::new(),
        }
    }

    /// Disconnect cleanup: neutral mappings, zeroed synthetic counts (the
    /// next coalescer commit releases whatever this device still holds) and
    /// cleared transient per-frame state. Wheel calibration survives.
    pub fn reset_for_disconnect(&mut self) {
        self.input.clear();
        self.output.clear();
        self.previous.clear();
        self.previous_frame = ControllerFrame::default();
        self.synthetic.clear_current();
        self.remap.clear();
        self.mouse = MouseMotion::default();
        self.extras_active = [false; ControlId::COUNT];
    }
}

/// Arena of the four device slots, one lock per slot. A report thread only
/// ever locks its own slot, so the locks are uncontended in steady state.
pub struct DeviceRegistry {
    slots: [Mutex<DeviceRuntime>; DEVICE_SLOTS],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|slot| Mutex::new(DeviceRuntime::new(slot))),
        }
    }

    /// The slot's runtime cell. Out-of-range indices cannot occur given the
    /// fixed slot count; callers index with validated slot ids.
    pub fn slot(&self, index: usize) -> &Mutex<DeviceRuntime> {
        &self.slots[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_transients_keeps_wheel() {
        let registry = DeviceRegistry::new();
        let mut runtime = registry.slot(2).lock().unwrap();
        assert_eq!(runtime.slot, 2);

        runtime.synthetic.press_key(0x41, false);
        runtime.remap.push((ControlId::South, ControlId::R2));
        runtime.extras_active[3] = true;
        runtime.wheel.start_calibration(0, 1000);

        runtime.reset_for_disconnect();
        let presses = runtime.synthetic.keys.get(&0x41).copied().unwrap();
        assert_eq!(presses.current.vk, 0);
        assert!(runtime.remap.is_empty());
        assert!(!runtime.extras_active[3]);
        // Calibration flow state is not transient.
        assert_eq!(
            runtime.wheel.phase(),
            crate::wheel::CalibrationPhase::Recording
        );
    }
}
