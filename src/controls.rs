//! Control enumeration and raw report types.
//!
//! Every physical control a profile can bind is one member of [`ControlId`].
//! The control-to-kind table is a compile-time invariant shared process-wide;
//! out-of-range indices cannot occur because the enum is closed.

use serde::{Deserialize, Serialize};

/// Identifies one bindable control on a physical controller.
///
/// 38 members: 16 digital buttons, 8 stick axis directions, 2 triggers,
/// 4 touch zones, 4 gyro tilt directions and 4 touch swipe directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(usize)]
pub enum ControlId {
    South,
    East,
    West,
    North,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    L1,
    R1,
    L3,
    R3,
    Start,
    Select,
    Guide,
    Mute,
    LxNeg,
    LxPos,
    LyNeg,
    LyPos,
    RxNeg,
    RxPos,
    RyNeg,
    RyPos,
    L2,
    R2,
    TouchLeft,
    TouchRight,
    TouchMulti,
    TouchUpper,
    GyroXPos,
    GyroXNeg,
    GyroZPos,
    GyroZNeg,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
}

/// Broad category of a control, deciding which field-mapping array holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Button,
    AxisDir,
    Trigger,
    Touch,
    GyroDir,
    Swipe,
}

impl ControlId {
    /// Number of enumeration members.
    pub const COUNT: usize = 38;

    /// All members in declaration order.
    pub const ALL: [ControlId; Self::COUNT] = [
        ControlId::South,
        ControlId::East,
        ControlId::West,
        ControlId::North,
        ControlId::DpadUp,
        ControlId::DpadDown,
        ControlId::DpadLeft,
        ControlId::DpadRight,
        ControlId::L1,
        ControlId::R1,
        ControlId::L3,
        ControlId::R3,
        ControlId::Start,
        ControlId::Select,
        ControlId::Guide,
        ControlId::Mute,
        ControlId::LxNeg,
        ControlId::LxPos,
        ControlId::LyNeg,
        ControlId::LyPos,
        ControlId::RxNeg,
        ControlId::RxPos,
        ControlId::RyNeg,
        ControlId::RyPos,
        ControlId::L2,
        ControlId::R2,
        ControlId::TouchLeft,
        ControlId::TouchRight,
        ControlId::TouchMulti,
        ControlId::TouchUpper,
        ControlId::GyroXPos,
        ControlId::GyroXNeg,
        ControlId::GyroZPos,
        ControlId::GyroZNeg,
        ControlId::SwipeLeft,
        ControlId::SwipeRight,
        ControlId::SwipeUp,
        ControlId::SwipeDown,
    ];

    /// Array slot for this control.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Static control-to-kind lookup (immutable data invariant).
    #[inline(always)]
    pub const fn kind(self) -> ControlKind {
        CONTROL_KINDS[self as usize]
    }
}

/// Control kind per [`ControlId`] slot, in declaration order.
pub const CONTROL_KINDS: [ControlKind; ControlId::COUNT] = [
    ControlKind::Button, // South
    ControlKind::Button, // East
    ControlKind::Button, // West
    ControlKind::Button, // North
    ControlKind::Button, // DpadUp
    ControlKind::Button, // DpadDown
    ControlKind::Button, // DpadLeft
    ControlKind::Button, // DpadRight
    ControlKind::Button, // L1
    ControlKind::Button, // R1
    ControlKind::Button, // L3
    ControlKind::Button, // R3
    ControlKind::Button, // Start
    ControlKind::Button, // Select
    ControlKind::Button, // Guide
    ControlKind::Button, // Mute
    ControlKind::AxisDir, // LxNeg
    ControlKind::AxisDir, // LxPos
    ControlKind::AxisDir, // LyNeg
    ControlKind::AxisDir, // LyPos
    ControlKind::AxisDir, // RxNeg
    ControlKind::AxisDir, // RxPos
    ControlKind::AxisDir, // RyNeg
    ControlKind::AxisDir, // RyPos
    ControlKind::Trigger, // L2
    ControlKind::Trigger, // R2
    ControlKind::Touch,  // TouchLeft
    ControlKind::Touch,  // TouchRight
    ControlKind::Touch,  // TouchMulti
    ControlKind::Touch,  // TouchUpper
    ControlKind::GyroDir, // GyroXPos
    ControlKind::GyroDir, // GyroXNeg
    ControlKind::GyroDir, // GyroZPos
    ControlKind::GyroDir, // GyroZNeg
    ControlKind::Swipe,  // SwipeLeft
    ControlKind::Swipe,  // SwipeRight
    ControlKind::Swipe,  // SwipeUp
    ControlKind::Swipe,  // SwipeDown
];

/// Neutral byte value for centered stick axes.
pub const AXIS_NEUTRAL: u8 = 128;

/// Touch surface finger state from one report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TouchState {
    pub left_zone: bool,
    pub right_zone: bool,
    pub multi_touch: bool,
    pub upper_zone: bool,
    pub button: bool,
    pub swipe_left: u8,
    pub swipe_right: u8,
    pub swipe_up: u8,
    pub swipe_down: u8,
}

/// One raw report from a physical controller.
///
/// Produced once per report by the device collaborator and immutable during
/// processing. Stick axes and triggers are bytes with 128 as stick neutral,
/// motion axes are signed integers in sensor units.
#[derive(Debug, Clone, Copy)]
pub struct ControllerFrame {
    pub south: bool,
    pub east: bool,
    pub west: bool,
    pub north: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub l1: bool,
    pub r1: bool,
    pub l3: bool,
    pub r3: bool,
    pub start: bool,
    pub select: bool,
    pub guide: bool,
    pub mute: bool,
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
    pub l2: u8,
    pub r2: u8,
    pub gyro_x: i32,
    pub gyro_z: i32,
    pub touch: TouchState,
}

impl Default for ControllerFrame {
    fn default() -> Self {
        Self {
            south: false,
            east: false,
            west: false,
            north: false,
            dpad_up: false,
            dpad_down: false,
            dpad_left: false,
            dpad_right: false,
            l1: false,
            r1: false,
            l3: false,
            r3: false,
            start: false,
            select: false,
            guide: false,
            mute: false,
            lx: AXIS_NEUTRAL,
            ly: AXIS_NEUTRAL,
            rx: AXIS_NEUTRAL,
            ry: AXIS_NEUTRAL,
            l2: 0,
            r2: 0,
            gyro_x: 0,
            gyro_z: 0,
            touch: TouchState::default(),
        }
    }
}

impl ControllerFrame {
    /// Left stick direction angle in radians and magnitude in [0, 1].
    #[inline]
    pub fn left_stick_polar(&self) -> (f64, f64) {
        stick_polar(self.lx, self.ly)
    }

    /// Right stick direction angle in radians and magnitude in [0, 1].
    #[inline]
    pub fn right_stick_polar(&self) -> (f64, f64) {
        stick_polar(self.rx, self.ry)
    }
}

/// Derives (angle, magnitude) from two axis bytes around the 128 neutral.
#[inline]
pub fn stick_polar(x: u8, y: u8) -> (f64, f64) {
    let dx = x as f64 - AXIS_NEUTRAL as f64;
    let dy = y as f64 - AXIS_NEUTRAL as f64;
    let angle = dy.atan2(dx);
    let magnitude = (dx * dx + dy * dy).sqrt() / 127.0;
    (angle, magnitude.min(1.0))
}

/// Final 8-button/4-axis/2-trigger state handed to the virtual bus once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFrame {
    pub south: bool,
    pub east: bool,
    pub west: bool,
    pub north: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub l1: bool,
    pub r1: bool,
    pub l3: bool,
    pub r3: bool,
    pub start: bool,
    pub select: bool,
    pub guide: bool,
    pub mute: bool,
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
    pub l2: u8,
    pub r2: u8,
    /// Macro-driven gamepad buttons merged on top of the remapped state.
    pub macro_buttons: [bool; 25],
}

impl Default for OutputFrame {
    fn default() -> Self {
        Self {
            south: false,
            east: false,
            west: false,
            north: false,
            dpad_up: false,
            dpad_down: false,
            dpad_left: false,
            dpad_right: false,
            l1: false,
            r1: false,
            l3: false,
            r3: false,
            start: false,
            select: false,
            guide: false,
            mute: false,
            lx: AXIS_NEUTRAL,
            ly: AXIS_NEUTRAL,
            rx: AXIS_NEUTRAL,
            ry: AXIS_NEUTRAL,
            l2: 0,
            r2: 0,
            macro_buttons: [false; 25],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_table_is_total() {
        for id in ControlId::ALL {
            // Every member maps to exactly one kind; indexing is dense.
            let _ = id.kind();
            assert!(id.index() < ControlId::COUNT);
        }
        assert_eq!(ControlId::ALL.len(), ControlId::COUNT);
    }

    #[test]
    fn test_control_kind_groups() {
        assert_eq!(ControlId::South.kind(), ControlKind::Button);
        assert_eq!(ControlId::LxNeg.kind(), ControlKind::AxisDir);
        assert_eq!(ControlId::RyPos.kind(), ControlKind::AxisDir);
        assert_eq!(ControlId::L2.kind(), ControlKind::Trigger);
        assert_eq!(ControlId::TouchUpper.kind(), ControlKind::Touch);
        assert_eq!(ControlId::GyroZNeg.kind(), ControlKind::GyroDir);
        assert_eq!(ControlId::SwipeDown.kind(), ControlKind::Swipe);
    }

    #[test]
    fn test_stick_polar_full_right() {
        let (angle, magnitude) = stick_polar(255, 128);
        assert!(angle.abs() < 1e-9);
        assert!((magnitude - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stick_polar_neutral() {
        let (_, magnitude) = stick_polar(128, 128);
        assert_eq!(magnitude, 0.0);
    }
}
