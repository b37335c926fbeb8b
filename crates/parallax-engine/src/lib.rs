//! Parallax engine crate.
//!
//! The render-side collaborator surface: scene graph model and snapshot codec,
//! renderer backends (wgpu and headless), GPU device acquisition, frame timing
//! and logging setup.

pub mod device;
pub mod logging;
pub mod paint;
pub mod render;
pub mod scene;
pub mod time;

pub use paint::Color;
pub use render::{RenderBackend, Renderer, RendererCall, RendererConfig, RendererMethod};
pub use scene::{Camera, CameraPose, CameraSnapshot, Node, Scene, SceneError, SceneSnapshot};
