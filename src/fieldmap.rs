//! Normalized per-frame view over heterogeneous control values.
//!
//! [`FieldMapping`] flattens one raw report into same-shaped arrays indexed by
//! [`ControlId`], so the resolver can address buttons, axis directions,
//! triggers, touch zones, gyro tilts and swipes uniformly. Three instances
//! live per device per frame: input (post-transform), output (post-remap) and
//! previous (prior frame's raw values, for edge detection).

use crate::controls::{AXIS_NEUTRAL, ControlId, ControllerFrame, OutputFrame, TouchState};

/// Control-indexed snapshot of one frame.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub buttons: [bool; ControlId::COUNT],
    pub axis_dirs: [u8; ControlId::COUNT],
    pub triggers: [u8; ControlId::COUNT],
    pub gyro_dirs: [i32; ControlId::COUNT],
    pub swipe_dirs: [u8; ControlId::COUNT],
    pub swipe_bools: [bool; ControlId::COUNT],
    pub touch_button: bool,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            buttons: [false; ControlId::COUNT],
            axis_dirs: [AXIS_NEUTRAL; ControlId::COUNT],
            triggers: [0; ControlId::COUNT],
            gyro_dirs: [0; ControlId::COUNT],
            swipe_dirs: [0; ControlId::COUNT],
            swipe_bools: [false; ControlId::COUNT],
            touch_button: false,
        }
    }
}

impl FieldMapping {
    /// Resets every slot to its neutral value.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Fills the arrays from one raw report.
    ///
    /// Axis bytes are duplicated into both direction slots of their axis; the
    /// consumer resolves the sign. Gyro values are split into signed buckets
    /// (the positive bucket clamps negatives to zero and vice versa). When
    /// `previous_touch` is given, touch and swipe slots read the prior frame
    /// instead of the current one (multi-action and tap disambiguation).
    pub fn populate(&mut self, frame: &ControllerFrame, previous_touch: Option<&TouchState>) {
        let b = &mut self.buttons;
        b[ControlId::South.index()] = frame.south;
        b[ControlId::East.index()] = frame.east;
        b[ControlId::West.index()] = frame.west;
        b[ControlId::North.index()] = frame.north;
        b[ControlId::DpadUp.index()] = frame.dpad_up;
        b[ControlId::DpadDown.index()] = frame.dpad_down;
        b[ControlId::DpadLeft.index()] = frame.dpad_left;
        b[ControlId::DpadRight.index()] = frame.dpad_right;
        b[ControlId::L1.index()] = frame.l1;
        b[ControlId::R1.index()] = frame.r1;
        b[ControlId::L3.index()] = frame.l3;
        b[ControlId::R3.index()] = frame.r3;
        b[ControlId::Start.index()] = frame.start;
        b[ControlId::Select.index()] = frame.select;
        b[ControlId::Guide.index()] = frame.guide;
        b[ControlId::Mute.index()] = frame.mute;

        let a = &mut self.axis_dirs;
        a[ControlId::LxNeg.index()] = frame.lx;
        a[ControlId::LxPos.index()] = frame.lx;
        a[ControlId::LyNeg.index()] = frame.ly;
        a[ControlId::LyPos.index()] = frame.ly;
        a[ControlId::RxNeg.index()] = frame.rx;
        a[ControlId::RxPos.index()] = frame.rx;
        a[ControlId::RyNeg.index()] = frame.ry;
        a[ControlId::RyPos.index()] = frame.ry;

        self.triggers[ControlId::L2.index()] = frame.l2;
        self.triggers[ControlId::R2.index()] = frame.r2;

        let g = &mut self.gyro_dirs;
        g[ControlId::GyroXPos.index()] = frame.gyro_x.max(0);
        g[ControlId::GyroXNeg.index()] = frame.gyro_x.min(0);
        g[ControlId::GyroZPos.index()] = frame.gyro_z.max(0);
        g[ControlId::GyroZNeg.index()] = frame.gyro_z.min(0);

        let touch = previous_touch.unwrap_or(&frame.touch);
        b[ControlId::TouchLeft.index()] = touch.left_zone;
        b[ControlId::TouchRight.index()] = touch.right_zone;
        b[ControlId::TouchMulti.index()] = touch.multi_touch;
        b[ControlId::TouchUpper.index()] = touch.upper_zone;
        self.touch_button = touch.button;

        let s = &mut self.swipe_dirs;
        s[ControlId::SwipeLeft.index()] = touch.swipe_left;
        s[ControlId::SwipeRight.index()] = touch.swipe_right;
        s[ControlId::SwipeUp.index()] = touch.swipe_up;
        s[ControlId::SwipeDown.index()] = touch.swipe_down;

        let sb = &mut self.swipe_bools;
        sb[ControlId::SwipeLeft.index()] = touch.swipe_left > 0;
        sb[ControlId::SwipeRight.index()] = touch.swipe_right > 0;
        sb[ControlId::SwipeUp.index()] = touch.swipe_up > 0;
        sb[ControlId::SwipeDown.index()] = touch.swipe_down > 0;
    }

    /// Writes the canonical buttons/axes/triggers back onto a frame-shaped
    /// output object. Inverse of [`populate`](Self::populate) for the slots a
    /// virtual controller exposes.
    pub fn populate_state(&self, out: &mut OutputFrame) {
        out.south = self.buttons[ControlId::South.index()];
        out.east = self.buttons[ControlId::East.index()];
        out.west = self.buttons[ControlId::West.index()];
        out.north = self.buttons[ControlId::North.index()];
        out.dpad_up = self.buttons[ControlId::DpadUp.index()];
        out.dpad_down = self.buttons[ControlId::DpadDown.index()];
        out.dpad_left = self.buttons[ControlId::DpadLeft.index()];
        out.dpad_right = self.buttons[ControlId::DpadRight.index()];
        out.l1 = self.buttons[ControlId::L1.index()];
        out.r1 = self.buttons[ControlId::R1.index()];
        out.l3 = self.buttons[ControlId::L3.index()];
        out.r3 = self.buttons[ControlId::R3.index()];
        out.start = self.buttons[ControlId::Start.index()];
        out.select = self.buttons[ControlId::Select.index()];
        out.guide = self.buttons[ControlId::Guide.index()];
        out.mute = self.buttons[ControlId::Mute.index()];

        out.lx = self.merged_axis(ControlId::LxNeg, ControlId::LxPos);
        out.ly = self.merged_axis(ControlId::LyNeg, ControlId::LyPos);
        out.rx = self.merged_axis(ControlId::RxNeg, ControlId::RxPos);
        out.ry = self.merged_axis(ControlId::RyNeg, ControlId::RyPos);

        out.l2 = self.triggers[ControlId::L2.index()];
        out.r2 = self.triggers[ControlId::R2.index()];
    }

    /// Picks the larger-magnitude contribution of an axis direction pair.
    ///
    /// After `populate` both slots carry the same byte; after remap merging
    /// they may differ, and the deviation from neutral decides.
    #[inline]
    pub fn merged_axis(&self, neg: ControlId, pos: ControlId) -> u8 {
        let a = self.axis_dirs[neg.index()];
        let b = self.axis_dirs[pos.index()];
        if axis_magnitude(a) >= axis_magnitude(b) { a } else { b }
    }
}

/// Deviation of an axis byte from the 128 neutral.
#[inline(always)]
pub fn axis_magnitude(value: u8) -> u8 {
    value.abs_diff(AXIS_NEUTRAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_frame() -> ControllerFrame {
        ControllerFrame {
            south: true,
            dpad_left: true,
            r1: true,
            mute: true,
            lx: 255,
            ly: 3,
            rx: 130,
            ry: 128,
            l2: 200,
            r2: 1,
            gyro_x: -40,
            gyro_z: 17,
            touch: TouchState {
                left_zone: true,
                button: true,
                swipe_up: 90,
                ..TouchState::default()
            },
            ..ControllerFrame::default()
        }
    }

    #[test]
    fn test_round_trip_reproduces_frame() {
        let frame = busy_frame();
        let mut mapping = FieldMapping::default();
        mapping.populate(&frame, None);

        let mut out = OutputFrame::default();
        mapping.populate_state(&mut out);

        assert_eq!(out.south, frame.south);
        assert_eq!(out.dpad_left, frame.dpad_left);
        assert_eq!(out.r1, frame.r1);
        assert_eq!(out.mute, frame.mute);
        assert_eq!(out.lx, frame.lx);
        assert_eq!(out.ly, frame.ly);
        assert_eq!(out.rx, frame.rx);
        assert_eq!(out.ry, frame.ry);
        assert_eq!(out.l2, frame.l2);
        assert_eq!(out.r2, frame.r2);
        assert_eq!(mapping.touch_button, frame.touch.button);
    }

    #[test]
    fn test_gyro_signed_buckets() {
        let frame = busy_frame();
        let mut mapping = FieldMapping::default();
        mapping.populate(&frame, None);

        assert_eq!(mapping.gyro_dirs[ControlId::GyroXPos.index()], 0);
        assert_eq!(mapping.gyro_dirs[ControlId::GyroXNeg.index()], -40);
        assert_eq!(mapping.gyro_dirs[ControlId::GyroZPos.index()], 17);
        assert_eq!(mapping.gyro_dirs[ControlId::GyroZNeg.index()], 0);
    }

    #[test]
    fn test_prior_frame_touch_option() {
        let frame = busy_frame();
        let previous = TouchState {
            right_zone: true,
            swipe_down: 55,
            ..TouchState::default()
        };

        let mut mapping = FieldMapping::default();
        mapping.populate(&frame, Some(&previous));

        assert!(!mapping.buttons[ControlId::TouchLeft.index()]);
        assert!(mapping.buttons[ControlId::TouchRight.index()]);
        assert_eq!(mapping.swipe_dirs[ControlId::SwipeDown.index()], 55);
        assert!(mapping.swipe_bools[ControlId::SwipeDown.index()]);
        assert!(!mapping.touch_button);
    }

    #[test]
    fn test_merged_axis_prefers_larger_magnitude() {
        let mut mapping = FieldMapping::default();
        mapping.axis_dirs[ControlId::LxNeg.index()] = 100; // 28 from neutral
        mapping.axis_dirs[ControlId::LxPos.index()] = 200; // 72 from neutral
        assert_eq!(mapping.merged_axis(ControlId::LxNeg, ControlId::LxPos), 200);
    }
}
