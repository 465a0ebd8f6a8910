//! Profile model: per-control bindings, shift layer, axis settings.
//!
//! Profiles are loaded from TOML into a config form, then resolved once into
//! the read-only [`Profile`] snapshot the report threads consume (Bezier
//! tables built, bindings spread into a dense control-indexed array). Report
//! threads never parse or validate anything.

use std::collections::HashMap;
use std::path::Path;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controls::ControlId;
use crate::curve::BezierParams;
use crate::synthetic::ClickSlot;
use crate::transform::{
    CurveMode, GyroSettings, SquareStickSettings, StickSettings, TriggerSettings,
};

/// Mouse actions a control can bind to, besides analog movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MouseBinding {
    LeftButton,
    RightButton,
    MiddleButton,
    FourthButton,
    FifthButton,
    WheelUp,
    WheelDown,
}

impl MouseBinding {
    #[inline]
    pub const fn slot(self) -> ClickSlot {
        match self {
            MouseBinding::LeftButton => ClickSlot::Left,
            MouseBinding::RightButton => ClickSlot::Right,
            MouseBinding::MiddleButton => ClickSlot::Middle,
            MouseBinding::FourthButton => ClickSlot::X1,
            MouseBinding::FifthButton => ClickSlot::X2,
            MouseBinding::WheelUp => ClickSlot::WheelUp,
            MouseBinding::WheelDown => ClickSlot::WheelDown,
        }
    }
}

/// Cursor movement directions for analog mouse bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
}

/// What one control does when active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BindingAction {
    /// Identity remap: the control's own value flows to the output unchanged.
    #[default]
    PassThrough,
    /// Remap onto another physical control.
    Control { target: ControlId },
    /// Synthesize a keyboard key.
    Key {
        code: u16,
        #[serde(default)]
        toggle: bool,
        #[serde(default)]
        scancode: bool,
    },
    /// Play a macro code list.
    Macro {
        codes: Vec<i64>,
        #[serde(default)]
        synchronized: bool,
        #[serde(default)]
        repeat_held: bool,
        #[serde(default)]
        keep_state: bool,
    },
    /// Synthesize a mouse button or wheel direction.
    MouseButton {
        button: MouseBinding,
        #[serde(default)]
        toggle: bool,
    },
    /// Analog cursor movement driven by the control's magnitude.
    MouseMove {
        direction: MoveDirection,
        /// Speed curve exponent base, percent. 100 is the neutral feel.
        #[serde(default = "default_move_sensitivity")]
        sensitivity: u32,
    },
}

fn default_move_sensitivity() -> u32 {
    100
}

/// Press-edge side effects applied alongside a binding and reverted on
/// release: rumble pulse, forced lightbar, temporary mouse-speed override.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BindingExtras {
    #[serde(default)]
    pub rumble: Option<(u8, u8)>,
    #[serde(default)]
    pub lightbar: Option<[u8; 3]>,
    #[serde(default)]
    pub lightbar_flash: bool,
    #[serde(default)]
    pub mouse_sensitivity: Option<u32>,
}

impl BindingExtras {
    pub fn is_empty(&self) -> bool {
        self.rumble.is_none() && self.lightbar.is_none() && self.mouse_sensitivity.is_none()
    }
}

/// Regular-layer and shift-layer actions for one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ControlBinding {
    #[serde(default)]
    pub action: BindingAction,
    #[serde(default)]
    pub shift_action: Option<BindingAction>,
    #[serde(default)]
    pub extras: Option<BindingExtras>,
}

/// Higher-level behaviors bindable to control combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SpecialBehavior {
    ProfileSwap { profile: String },
    LaunchProgram { path: String },
    Disconnect,
    BatteryCheck,
    WheelCalibrate,
    Macro {
        codes: Vec<i64>,
        #[serde(default)]
        synchronized: bool,
        #[serde(default)]
        keep_state: bool,
    },
    /// Tap / hold / double-tap disambiguation, one payload per outcome.
    MultiTap {
        tap: Box<SpecialBehavior>,
        #[serde(default)]
        hold: Option<Box<SpecialBehavior>>,
        #[serde(default)]
        double_tap: Option<Box<SpecialBehavior>>,
    },
}

/// One configured special action: trigger combination, optional explicit
/// untrigger combination (empty means release ends it) and the behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialActionDef {
    pub trigger: Vec<ControlId>,
    #[serde(default)]
    pub untrigger: Vec<ControlId>,
    pub behavior: SpecialBehavior,
}

/// Stick shaping settings in profile form. Fractions of full scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickConfig {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub maxzone: f64,
    pub maxoutput: f64,
    pub sensitivity: f64,
    pub rotation: f64,
    pub curve_blend: f64,
    pub square_stick: bool,
    pub square_roundness: f64,
    pub curve: CurveMode,
    pub bezier: Option<BezierParams>,
}

impl Default for StickConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            maxzone: 1.0,
            maxoutput: 1.0,
            sensitivity: 1.0,
            rotation: 0.0,
            curve_blend: 0.0,
            square_stick: false,
            square_roundness: 5.0,
            curve: CurveMode::Linear,
            bezier: None,
        }
    }
}

impl StickConfig {
    fn clamp(&mut self) {
        self.deadzone = self.deadzone.clamp(0.0, 0.95);
        self.antideadzone = self.antideadzone.clamp(0.0, 1.0);
        self.maxzone = self.maxzone.clamp(self.deadzone, 1.0);
        self.maxoutput = self.maxoutput.clamp(0.0, 1.0);
        self.sensitivity = self.sensitivity.clamp(0.1, 10.0);
        self.curve_blend = self.curve_blend.clamp(0.0, 1.0);
        self.square_roundness = self.square_roundness.clamp(1.0, 20.0);
    }

    fn resolve(&self) -> StickSettings {
        StickSettings {
            deadzone: self.deadzone,
            antideadzone: self.antideadzone,
            maxzone: self.maxzone,
            maxoutput: self.maxoutput,
            sensitivity: self.sensitivity,
            rotation: self.rotation,
            curve_blend: self.curve_blend,
            square_stick: self.square_stick.then_some(SquareStickSettings {
                roundness: self.square_roundness,
            }),
            output_curve: self.curve.resolve(self.bezier),
        }
    }
}

/// Trigger shaping settings in profile form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub maxzone: f64,
    pub maxoutput: f64,
    pub sensitivity: f64,
    pub curve: CurveMode,
    pub bezier: Option<BezierParams>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            maxzone: 1.0,
            maxoutput: 1.0,
            sensitivity: 1.0,
            curve: CurveMode::Linear,
            bezier: None,
        }
    }
}

impl TriggerConfig {
    fn clamp(&mut self) {
        self.deadzone = self.deadzone.clamp(0.0, 0.95);
        self.antideadzone = self.antideadzone.clamp(0.0, 1.0);
        self.maxzone = self.maxzone.clamp(self.deadzone, 1.0);
        self.maxoutput = self.maxoutput.clamp(0.0, 1.0);
        self.sensitivity = self.sensitivity.clamp(0.1, 10.0);
    }

    fn resolve(&self) -> TriggerSettings {
        TriggerSettings {
            deadzone: self.deadzone,
            antideadzone: self.antideadzone,
            maxzone: self.maxzone,
            maxoutput: self.maxoutput,
            sensitivity: self.sensitivity,
            output_curve: self.curve.resolve(self.bezier),
        }
    }
}

/// Gyro shaping settings in profile form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub sensitivity: f64,
    pub curve: CurveMode,
    pub bezier: Option<BezierParams>,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            sensitivity: 1.0,
            curve: CurveMode::Linear,
            bezier: None,
        }
    }
}

impl GyroConfig {
    fn clamp(&mut self) {
        self.deadzone = self.deadzone.clamp(0.0, 0.95);
        self.antideadzone = self.antideadzone.clamp(0.0, 1.0);
        self.sensitivity = self.sensitivity.clamp(0.1, 10.0);
    }

    fn resolve(&self) -> GyroSettings {
        GyroSettings {
            deadzone: self.deadzone,
            antideadzone: self.antideadzone,
            sensitivity: self.sensitivity,
            output_curve: self.curve.resolve(self.bezier),
        }
    }
}

/// Steering-wheel emulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Drive the output left-stick X axis from the wheel angle.
    pub enabled: bool,
    /// Full lock-to-lock range in degrees. Over 360 enables multi-turn.
    pub range_degrees: f64,
    /// Degree band around center subtracted from the reading.
    pub deadzone_degrees: f64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            range_degrees: 360.0,
            deadzone_degrees: 0.0,
        }
    }
}

impl WheelConfig {
    fn clamp(&mut self) {
        self.range_degrees = self.range_degrees.clamp(90.0, 1440.0);
        self.deadzone_degrees = self.deadzone_degrees.clamp(0.0, 45.0);
    }
}

/// On-disk profile form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub name: String,
    pub shift_trigger: Option<ControlId>,
    /// Ramp cursor speed up over consecutive active frames.
    pub mouse_accel: bool,
    pub bindings: HashMap<ControlId, ControlBinding>,
    pub left_stick: StickConfig,
    pub right_stick: StickConfig,
    pub l2: TriggerConfig,
    pub r2: TriggerConfig,
    pub gyro: GyroConfig,
    pub wheel: WheelConfig,
    pub special_actions: Vec<SpecialActionDef>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            shift_trigger: None,
            mouse_accel: false,
            bindings: HashMap::new(),
            left_stick: StickConfig::default(),
            right_stick: StickConfig::default(),
            l2: TriggerConfig::default(),
            r2: TriggerConfig::default(),
            gyro: GyroConfig::default(),
            wheel: WheelConfig::default(),
            special_actions: Vec::new(),
        }
    }
}

impl ProfileConfig {
    /// Load config from file, or create default if not exists.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            let default_config = Self::default();
            default_config.save_to_file(&path)?;
            return Ok(default_config);
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: ProfileConfig = toml::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Clamps every numeric field to its valid range.
    pub fn validate(&mut self) {
        self.left_stick.clamp();
        self.right_stick.clamp();
        self.l2.clamp();
        self.r2.clamp();
        self.gyro.clamp();
        self.wheel.clamp();
    }

    /// Resolves the config into the report-thread snapshot.
    pub fn resolve(&self) -> Profile {
        let mut bindings: [ControlBinding; ControlId::COUNT] =
            std::array::from_fn(|_| ControlBinding::default());
        for (&control, binding) in &self.bindings {
            bindings[control.index()] = binding.clone();
        }
        debug!(profile = %self.name, bound = self.bindings.len(), "profile resolved");
        Profile {
            name: self.name.clone(),
            shift_trigger: self.shift_trigger,
            mouse_accel: self.mouse_accel,
            bindings,
            left_stick: self.left_stick.resolve(),
            right_stick: self.right_stick.resolve(),
            l2: self.l2.resolve(),
            r2: self.r2.resolve(),
            gyro: self.gyro.resolve(),
            wheel: self.wheel,
            special_actions: self.special_actions.clone(),
        }
    }
}

/// Resolved, read-only profile snapshot consumed by the report threads.
///
/// Curves are precomputed and bindings live in a dense control-indexed array;
/// nothing here allocates or fails per frame.
#[derive(Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub shift_trigger: Option<ControlId>,
    pub mouse_accel: bool,
    pub bindings: [ControlBinding; ControlId::COUNT],
    pub left_stick: StickSettings,
    pub right_stick: StickSettings,
    pub l2: TriggerSettings,
    pub r2: TriggerSettings,
    pub gyro: GyroSettings,
    pub wheel: WheelConfig,
    pub special_actions: Vec<SpecialActionDef>,
}

impl Default for Profile {
    fn default() -> Self {
        ProfileConfig::default().resolve()
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("shift_trigger", &self.shift_trigger)
            .field("special_actions", &self.special_actions.len())
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Active-layer action for a control: the shift action if configured and
    /// the shift trigger is held, else the regular action.
    #[inline]
    pub fn action_for(&self, control: ControlId, shift_active: bool) -> &BindingAction {
        let binding = &self.bindings[control.index()];
        if shift_active
            && let Some(shift) = &binding.shift_action
        {
            return shift;
        }
        &binding.action
    }

    #[inline]
    pub fn extras_for(&self, control: ControlId) -> Option<&BindingExtras> {
        self.bindings[control.index()].extras.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_toml() {
        let mut config = ProfileConfig {
            name: "test".to_string(),
            shift_trigger: Some(ControlId::L1),
            ..ProfileConfig::default()
        };
        config.bindings.insert(
            ControlId::South,
            ControlBinding {
                action: BindingAction::Key {
                    code: 0x41,
                    toggle: false,
                    scancode: true,
                },
                shift_action: Some(BindingAction::MouseButton {
                    button: MouseBinding::LeftButton,
                    toggle: false,
                }),
                extras: None,
            },
        );
        config.special_actions.push(SpecialActionDef {
            trigger: vec![ControlId::Guide, ControlId::R1],
            untrigger: vec![],
            behavior: SpecialBehavior::ProfileSwap {
                profile: "racing".to_string(),
            },
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let back: ProfileConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_clamps_out_of_range() {
        let mut config = ProfileConfig::default();
        config.left_stick.deadzone = 3.0;
        config.left_stick.maxzone = 0.1;
        config.l2.sensitivity = 0.0;
        config.wheel.range_degrees = 10_000.0;
        config.validate();

        assert!(config.left_stick.deadzone <= 0.95);
        assert!(config.left_stick.maxzone >= config.left_stick.deadzone);
        assert!(config.l2.sensitivity >= 0.1);
        assert!(config.wheel.range_degrees <= 1440.0);
    }

    #[test]
    fn test_shift_layer_selection() {
        let mut config = ProfileConfig::default();
        config.shift_trigger = Some(ControlId::L1);
        config.bindings.insert(
            ControlId::East,
            ControlBinding {
                action: BindingAction::Key {
                    code: 1,
                    toggle: false,
                    scancode: false,
                },
                shift_action: Some(BindingAction::Key {
                    code: 2,
                    toggle: false,
                    scancode: false,
                }),
                extras: None,
            },
        );
        let profile = config.resolve();

        match profile.action_for(ControlId::East, false) {
            BindingAction::Key { code, .. } => assert_eq!(*code, 1),
            other => panic!("unexpected action {other:?}"),
        }
        match profile.action_for(ControlId::East, true) {
            BindingAction::Key { code, .. } => assert_eq!(*code, 2),
            other => panic!("unexpected action {other:?}"),
        }
        // Shift held without a shift action falls back to regular.
        assert_eq!(
            profile.action_for(ControlId::West, true),
            &BindingAction::PassThrough
        );
    }

    #[test]
    fn test_unbound_controls_pass_through() {
        let profile = ProfileConfig::default().resolve();
        for control in ControlId::ALL {
            assert_eq!(
                profile.action_for(control, false),
                &BindingAction::PassThrough
            );
        }
    }
}
