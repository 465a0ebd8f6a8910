//! Profile persistence tests: TOML files on disk through the public API.

use std::path::PathBuf;

use quadpad::bindings::{
    BindingAction, BindingExtras, ControlBinding, MouseBinding, ProfileConfig,
};
use quadpad::controls::ControlId;

/// Unique temp path per test so parallel runs never collide.
fn get_test_file_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("quadpad_test_{}_{}.toml", std::process::id(), name))
}

fn cleanup_test_file(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
}

/// Saving a profile and loading it back preserves every configured field.
#[test]
fn test_profile_round_trip() {
    let path = get_test_file_path("round_trip");
    cleanup_test_file(&path);

    let mut config = ProfileConfig::default();
    config.name = "desktop".to_string();
    config.shift_trigger = Some(ControlId::L2);
    config.mouse_accel = true;
    config.left_stick.deadzone = 0.12;
    config.left_stick.square_stick = true;
    config.wheel.enabled = true;
    config.wheel.range_degrees = 540.0;
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
            extras: Some(BindingExtras {
                rumble: Some((200, 50)),
                lightbar: Some([0, 255, 0]),
                lightbar_flash: false,
                mouse_sensitivity: None,
            }),
        },
    );
    config.bindings.insert(
        ControlId::East,
        ControlBinding {
            action: BindingAction::Macro {
                codes: vec![0x42, 350, 0x42, 1_000_000 + 255_000 + 128],
                synchronized: true,
                repeat_held: false,
                keep_state: false,
            },
            shift_action: None,
            extras: None,
        },
    );

    config.save_to_file(&path).unwrap();
    let loaded = ProfileConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded.name, "desktop");
    assert_eq!(loaded.shift_trigger, Some(ControlId::L2));
    assert!(loaded.mouse_accel);
    assert_eq!(loaded.left_stick.deadzone, 0.12);
    assert!(loaded.left_stick.square_stick);
    assert!(loaded.wheel.enabled);
    assert_eq!(loaded.wheel.range_degrees, 540.0);
    assert_eq!(loaded.bindings.len(), 2);
    assert_eq!(
        loaded.bindings[&ControlId::South],
        config.bindings[&ControlId::South]
    );
    assert_eq!(
        loaded.bindings[&ControlId::East],
        config.bindings[&ControlId::East]
    );

    cleanup_test_file(&path);
}

/// A missing file yields the defaults and writes them back to disk.
#[test]
fn test_load_or_create_writes_defaults() {
    let path = get_test_file_path("create_defaults");
    cleanup_test_file(&path);

    let created = ProfileConfig::load_or_create(&path).unwrap();
    assert_eq!(created.name, "default");
    assert!(created.bindings.is_empty());
    assert!(path.exists());

    // Second call reads the file it just wrote.
    let reread = ProfileConfig::load_or_create(&path).unwrap();
    assert_eq!(reread.name, "default");

    cleanup_test_file(&path);
}

/// Hand-edited files with out-of-range tuning values are clamped on load
/// instead of rejected.
#[test]
fn test_load_clamps_out_of_range_values() {
    let path = get_test_file_path("clamped");
    cleanup_test_file(&path);

    let content = r#"
name = "hand-edited"

[left_stick]
deadzone = 2.5
maxzone = 0.1
sensitivity = 99.0

[wheel]
enabled = true
range_degrees = 10000.0
deadzone_degrees = 90.0

[bindings.south]
action = { kind = "key", code = 65 }
"#;
    std::fs::write(&path, content).unwrap();

    let loaded = ProfileConfig::load_from_file(&path).unwrap();
    assert!(loaded.left_stick.deadzone <= 0.95);
    assert!(loaded.left_stick.maxzone >= loaded.left_stick.deadzone);
    assert!(loaded.left_stick.sensitivity <= 10.0);
    assert!(loaded.wheel.range_degrees <= 1440.0);
    assert!(loaded.wheel.deadzone_degrees <= 45.0);
    assert_eq!(
        loaded.bindings[&ControlId::South].action,
        BindingAction::Key {
            code: 65,
            toggle: false,
            scancode: false,
        }
    );

    cleanup_test_file(&path);
}

/// Malformed TOML surfaces an error rather than silently defaulting.
#[test]
fn test_load_rejects_malformed_file() {
    let path = get_test_file_path("malformed");
    std::fs::write(&path, "name = [not toml").unwrap();
    assert!(ProfileConfig::load_from_file(&path).is_err());
    cleanup_test_file(&path);
}
