//! Wire protocol between the control side and the render side.
//!
//! Every exchange is an [`Envelope`]: `{ "type": kind, "id"?: uuid, "data"?: payload }`.
//! `id` is present only on exchanges that expect an acknowledgement or result.

mod control;
mod envelope;
mod event;
mod object;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use control::{
    CameraUpdate, ComputeRequest, ControlMessage, LoadScene, MaterialUpdate, RemoveObject,
    RenderRequest, TransformUpdate,
};
pub use envelope::{peek_id, Envelope};
pub use event::{ConsoleLevel, RenderEvent};
pub use object::{AddOptions, ObjectPayload};

/// Token linking a request to its response. Never reused while pending.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A message family that can travel inside an [`Envelope`].
pub trait Message: Serialize + DeserializeOwned {
    /// Every `type` tag of the family.
    const KINDS: &'static [&'static str];

    /// Tags that are only meaningful with a correlation id.
    const CORRELATED: &'static [&'static str] = &[];

    fn kind(&self) -> &'static str;
}
