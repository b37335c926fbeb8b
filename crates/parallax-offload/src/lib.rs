//! Parallax offload crate.
//!
//! Moves rendering onto a dedicated render unit: the control-side [`Bridge`],
//! the render-side executor, the wire protocol between them, the shared camera
//! channel and disposable compute units.

pub mod bridge;
pub mod camera_channel;
pub mod channel;
pub mod compute;
pub mod config;
pub mod correlation;
pub mod error;
pub mod executor;
pub mod protocol;

use std::any::Any;

pub use bridge::{Bridge, ObjectHandle, RendererOps};
pub use camera_channel::{camera_channel, CameraReader, CameraWriter};
pub use channel::Incoming;
pub use compute::{ComputeDispatcher, ComputeRegistry};
pub use config::{BridgeConfig, ComputeConfig, DevicePolicy};
pub use error::{BridgeError, ProtocolError};
pub use protocol::{AddOptions, CorrelationId, Envelope, RenderEvent, TransformUpdate};

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
