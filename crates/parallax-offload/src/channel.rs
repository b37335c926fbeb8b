//! What actually travels between the two sides.

use crate::camera_channel::CameraReader;
use crate::protocol::{ControlMessage, Envelope, RenderEvent};

/// Ownership transferred along with the initialization message.
///
/// Moving the surface here is what makes it unusable on the control side.
pub struct Transfer<S> {
    pub surface: S,
    pub camera: Option<CameraReader>,
}

/// Control side → render side.
pub enum Packet<S> {
    Message {
        envelope: Envelope<ControlMessage>,
        transfer: Option<Transfer<S>>,
    },
    /// A pre-encoded frame, decoded by the render side.
    Encoded(String),
    /// Tear the unit down.
    Terminate,
}

impl<S> Packet<S> {
    pub fn message(envelope: Envelope<ControlMessage>) -> Self {
        Packet::Message {
            envelope,
            transfer: None,
        }
    }
}

/// Render side → control side.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Event(Envelope<RenderEvent>),
    /// The render-side unit died; carries its description.
    Fault(String),
}
