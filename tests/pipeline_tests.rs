//! End-to-end tests driving the engine with recorded collaborator fakes.
//!
//! Each test feeds raw frames through `Engine::process_report_at` and checks
//! the synthetic events, bus frames and feedback the pipeline emits.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use quadpad::bindings::{BindingAction, ControlBinding, ProfileConfig};
use quadpad::controls::{AXIS_NEUTRAL, ControlId, ControllerFrame, OutputFrame};
use quadpad::device::{FeedbackSink, LightbarSink};
use quadpad::engine::Engine;
use quadpad::slots::OutputBus;
use quadpad::special::SpecialHost;
use quadpad::synthetic::{InputSink, MouseButton, WheelDirection};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    KeyDown(u16),
    KeyUp(u16),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    Wheel(WheelDirection),
    Move(i32, i32),
    Lightbar(usize, Option<[u8; 3]>, bool),
}

#[derive(Default)]
struct Env {
    events: Mutex<Vec<Event>>,
}

impl Env {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
    fn key_events(&self, code: u16) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::KeyDown(c) | Event::KeyUp(c) if *c == code))
            .collect()
    }
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl InputSink for Env {
    fn key_down(&self, code: u16, _scancode: bool) {
        self.push(Event::KeyDown(code));
    }
    fn key_up(&self, code: u16, _scancode: bool) {
        self.push(Event::KeyUp(code));
    }
    fn mouse_down(&self, button: MouseButton) {
        self.push(Event::MouseDown(button));
    }
    fn mouse_up(&self, button: MouseButton) {
        self.push(Event::MouseUp(button));
    }
    fn wheel(&self, direction: WheelDirection) {
        self.push(Event::Wheel(direction));
    }
    fn mouse_move(&self, dx: i32, dy: i32) {
        self.push(Event::Move(dx, dy));
    }
}

impl OutputBus for Env {
    fn connect(&self, _slot: usize) -> anyhow::Result<()> {
        Ok(())
    }
    fn disconnect(&self, _slot: usize) -> anyhow::Result<()> {
        Ok(())
    }
    fn submit(&self, _slot: usize, _frame: &OutputFrame) {}
}

impl FeedbackSink for Env {
    fn rumble(&self, _device: usize, _heavy: u8, _light: u8) {}
}

impl LightbarSink for Env {
    fn set_override(&self, device: usize, color: Option<[u8; 3]>, flash: bool) {
        self.push(Event::Lightbar(device, color, flash));
    }
}

impl SpecialHost for Env {
    fn swap_profile(&self, _device: usize, _profile: &str) {}
    fn launch_program(&self, _path: &str) {}
    fn disconnect(&self, _device: usize) {}
    fn battery_check(&self, _device: usize) {}
    fn start_wheel_calibration(&self, _device: usize) {}
}

fn engine_with(config: ProfileConfig) -> (Engine, Arc<Env>) {
    let env = Arc::new(Env::default());
    let engine = Engine::new(
        config.resolve(),
        env.clone(),
        env.clone(),
        env.clone(),
        env.clone(),
    );
    (engine, env)
}

fn bind(config: &mut ProfileConfig, control: ControlId, action: BindingAction) {
    config.bindings.insert(
        control,
        ControlBinding {
            action,
            shift_action: None,
            extras: None,
        },
    );
}

#[test]
fn test_key_held_three_frames_one_edge_pair() {
    let mut config = ProfileConfig::default();
    bind(
        &mut config,
        ControlId::South,
        BindingAction::Key {
            code: 0x41,
            toggle: false,
            scancode: false,
        },
    );
    let (engine, env) = engine_with(config);
    let t0 = Instant::now();

    let pressed = ControllerFrame {
        south: true,
        ..ControllerFrame::default()
    };
    for i in 0..3 {
        engine.process_report_at(0, &pressed, &*env, 8.0, t0 + Duration::from_millis(8 * i));
    }
    engine.process_report_at(
        0,
        &ControllerFrame::default(),
        &*env,
        8.0,
        t0 + Duration::from_millis(24),
    );

    // One down at the press frame, one up at the release frame, zero
    // repeats before 500 ms.
    assert_eq!(
        env.key_events(0x41),
        vec![Event::KeyDown(0x41), Event::KeyUp(0x41)]
    );
}

#[test]
fn test_passthrough_frame_reaches_output() {
    let (engine, env) = engine_with(ProfileConfig::default());
    let frame = ControllerFrame {
        north: true,
        dpad_left: true,
        lx: 255,
        ly: AXIS_NEUTRAL,
        l2: 99,
        ..ControllerFrame::default()
    };
    let out = engine.process_report(0, &frame, &*env, 8.0);

    assert!(out.north);
    assert!(out.dpad_left);
    // Deadzone 0, curve identity: full right stays full right.
    assert_eq!(out.lx, 255);
    assert_eq!(out.ly, AXIS_NEUTRAL);
    assert_eq!(out.l2, 99);
}

#[test]
fn test_synchronized_macro_refires_in_order() {
    let codes = vec![0x42, 330, 0x42];
    let mut config = ProfileConfig::default();
    bind(
        &mut config,
        ControlId::West,
        BindingAction::Macro {
            codes,
            synchronized: true,
            repeat_held: false,
            keep_state: false,
        },
    );
    let (engine, env) = engine_with(config);
    let t0 = Instant::now();

    let pressed = ControllerFrame {
        west: true,
        ..ControllerFrame::default()
    };
    let idle = ControllerFrame::default();

    // Press, wait for the first run to start, release and press again
    // before it finishes: the second run must queue behind the first.
    engine.process_report_at(0, &pressed, &*env, 8.0, t0);
    let deadline = Instant::now() + Duration::from_secs(5);
    while env.key_events(0x42).is_empty() {
        assert!(Instant::now() < deadline, "macro never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    engine.process_report_at(0, &idle, &*env, 8.0, t0 + Duration::from_millis(8));
    engine.process_report_at(0, &pressed, &*env, 8.0, t0 + Duration::from_millis(16));

    let deadline = Instant::now() + Duration::from_secs(5);
    while env.key_events(0x42).len() < 4 {
        assert!(Instant::now() < deadline, "macros never finished");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(
        env.key_events(0x42),
        vec![
            Event::KeyDown(0x42),
            Event::KeyUp(0x42),
            Event::KeyDown(0x42),
            Event::KeyUp(0x42),
        ]
    );
}

#[test]
fn test_two_devices_share_one_key() {
    let mut config = ProfileConfig::default();
    bind(
        &mut config,
        ControlId::South,
        BindingAction::Key {
            code: 0x57,
            toggle: false,
            scancode: false,
        },
    );
    let (engine, env) = engine_with(config);
    let t0 = Instant::now();

    let pressed = ControllerFrame {
        south: true,
        ..ControllerFrame::default()
    };
    let idle = ControllerFrame::default();

    engine.process_report_at(0, &pressed, &*env, 8.0, t0);
    engine.process_report_at(1, &pressed, &*env, 8.0, t0);
    // Device 0 releases; device 1 still holds the key.
    engine.process_report_at(0, &idle, &*env, 8.0, t0);
    assert_eq!(env.key_events(0x57), vec![Event::KeyDown(0x57)]);

    engine.process_report_at(1, &idle, &*env, 8.0, t0);
    assert_eq!(
        env.key_events(0x57),
        vec![Event::KeyDown(0x57), Event::KeyUp(0x57)]
    );
}

#[test]
fn test_disconnect_releases_held_key() {
    let mut config = ProfileConfig::default();
    bind(
        &mut config,
        ControlId::R1,
        BindingAction::Key {
            code: 0x20,
            toggle: false,
            scancode: false,
        },
    );
    let (engine, env) = engine_with(config);

    let pressed = ControllerFrame {
        r1: true,
        ..ControllerFrame::default()
    };
    engine.process_report(0, &pressed, &*env, 8.0);
    assert_eq!(env.key_events(0x20), vec![Event::KeyDown(0x20)]);

    engine.disconnect_device(0, true);
    assert_eq!(
        env.key_events(0x20),
        vec![Event::KeyDown(0x20), Event::KeyUp(0x20)]
    );
}

#[test]
fn test_wheel_calibration_center_anchor_feedback() {
    let (engine, env) = engine_with(ProfileConfig::default());
    let t0 = Instant::now();

    engine.start_wheel_calibration(0);
    let resting = ControllerFrame {
        gyro_x: 0,
        gyro_z: 1000,
        ..ControllerFrame::default()
    };
    let confirm = ControllerFrame {
        south: true,
        ..resting
    };

    // Stable for over a second, then confirm: tier goes from red (no
    // anchors) to yellow (center recorded).
    engine.process_report_at(0, &resting, &*env, 8.0, t0);
    engine.process_report_at(0, &resting, &*env, 8.0, t0 + Duration::from_millis(10));
    engine.process_report_at(0, &confirm, &*env, 8.0, t0 + Duration::from_millis(1200));
    engine.process_report_at(0, &resting, &*env, 8.0, t0 + Duration::from_millis(1210));

    let tiers: Vec<_> = env
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Lightbar(0, Some(color), _) => Some(color),
            _ => None,
        })
        .collect();
    assert_eq!(tiers.first(), Some(&[255, 0, 0]));
    assert_eq!(tiers.last(), Some(&[255, 255, 0]));

    // Only the center anchor is set: completion must reject.
    assert!(!engine.finish_wheel_calibration(0));
}

#[test]
fn test_mouse_binding_and_movement() {
    let mut config = ProfileConfig::default();
    bind(
        &mut config,
        ControlId::L1,
        BindingAction::MouseButton {
            button: quadpad::bindings::MouseBinding::RightButton,
            toggle: false,
        },
    );
    bind(
        &mut config,
        ControlId::RxPos,
        BindingAction::MouseMove {
            direction: quadpad::bindings::MoveDirection::Right,
            sensitivity: 200,
        },
    );
    let (engine, env) = engine_with(config);

    let frame = ControllerFrame {
        l1: true,
        rx: 255,
        ..ControllerFrame::default()
    };
    engine.process_report(0, &frame, &*env, 8.0);
    engine.process_report(0, &ControllerFrame::default(), &*env, 8.0);

    let events = env.events();
    assert!(events.contains(&Event::MouseDown(MouseButton::Right)));
    assert!(events.contains(&Event::MouseUp(MouseButton::Right)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::Move(dx, 0) if *dx > 0)),
        "full deflection moves the cursor right"
    );
}
