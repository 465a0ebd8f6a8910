//! Core modules of the quadpad controller-remapping engine.
//!
//! Converts raw per-frame gamepad reports into a remapped virtual controller
//! state and synthetic keyboard/mouse events, for up to four devices at
//! report rate. Device acquisition, the virtual bus, OS input injection and
//! lightbar rendering are collaborators behind traits.

pub mod bindings;
pub mod controls;
pub mod curve;
pub mod device;
pub mod engine;
pub mod fieldmap;
pub mod macros;
pub mod resolver;
pub mod slots;
pub mod special;
pub mod synthetic;
pub mod transform;
pub mod util;
pub mod wheel;

pub use bindings::{BindingAction, ControlBinding, Profile, ProfileConfig};
pub use controls::{ControlId, ControllerFrame, OutputFrame};
pub use device::{FeedbackSink, LightbarSink};
pub use engine::Engine;
pub use slots::OutputBus;
pub use special::SpecialHost;
pub use synthetic::InputSink;
