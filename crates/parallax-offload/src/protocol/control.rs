use glam::{Quat, Vec3};
use parallax_engine::render::{RendererCall, RendererConfig};
use parallax_engine::scene::{CameraPose, CameraSnapshot, SceneSnapshot};
use parallax_engine::Color;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Message, ObjectPayload};

/// Control side → render side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Renderer configuration. The surface itself travels next to the message.
    InitRd(RendererConfig),
    LoadScene(LoadScene),
    /// Camera pose, used only when no shared camera channel exists.
    UpdateCamera(CameraUpdate),
    UpdateTransform(TransformUpdate),
    /// One-shot render of a separate scene, outside the loop.
    Render(RenderRequest),
    AddObject(ObjectPayload),
    RemoveObject(RemoveObject),
    UpdateMaterial(MaterialUpdate),
    ThreejsFunc(RendererCall),
    StopLoop,
    Compute(ComputeRequest),
}

impl Message for ControlMessage {
    const KINDS: &'static [&'static str] = &[
        "init_rd",
        "load_scene",
        "update_camera",
        "update_transform",
        "render",
        "add_object",
        "remove_object",
        "update_material",
        "threejs_func",
        "stop_loop",
        "compute",
    ];

    const CORRELATED: &'static [&'static str] = &["add_object", "threejs_func", "compute"];

    fn kind(&self) -> &'static str {
        match self {
            ControlMessage::InitRd(_) => "init_rd",
            ControlMessage::LoadScene(_) => "load_scene",
            ControlMessage::UpdateCamera(_) => "update_camera",
            ControlMessage::UpdateTransform(_) => "update_transform",
            ControlMessage::Render(_) => "render",
            ControlMessage::AddObject(_) => "add_object",
            ControlMessage::RemoveObject(_) => "remove_object",
            ControlMessage::UpdateMaterial(_) => "update_material",
            ControlMessage::ThreejsFunc(_) => "threejs_func",
            ControlMessage::StopLoop => "stop_loop",
            ControlMessage::Compute(_) => "compute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadScene {
    pub scene: SceneSnapshot,
    pub camera: CameraSnapshot,
    #[serde(default)]
    pub background: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraUpdate {
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    /// `[x, y, z, w]`
    #[serde(default)]
    pub quaternion: Option<[f32; 4]>,
}

impl From<CameraPose> for CameraUpdate {
    fn from(pose: CameraPose) -> Self {
        Self {
            position: Some(pose.position.to_array()),
            quaternion: Some(pose.orientation.to_array()),
        }
    }
}

impl CameraUpdate {
    /// Applies present fields over `pose`.
    pub fn apply_to(&self, pose: &mut CameraPose) {
        if let Some(p) = self.position {
            pose.position = Vec3::from_array(p);
        }
        if let Some(q) = self.quaternion {
            pose.orientation = Quat::from_array(q);
        }
    }
}

/// Partial transform update; absent fields stay unchanged on the render side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f32; 3]>,
    /// XYZ Euler angles in radians.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f32; 3]>,
}

impl TransformUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = Some(position.to_array());
        self
    }

    pub fn rotation(mut self, euler_xyz: Vec3) -> Self {
        self.rotation = Some(euler_xyz.to_array());
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale.to_array());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.scale.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub scene: SceneSnapshot,
    pub camera: CameraSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveObject {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUpdate {
    pub name: String,
    pub props: Map<String, Value>,
}

/// A request for a registered computation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}
