//! Serialized scene and camera snapshots.
//!
//! A snapshot is sent once at load time; afterwards the restored scene is owned
//! by the render side. Geometry and materials are stored once per uuid and
//! referenced from the node tree.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paint::Color;

use super::{
    Camera, Geometry, Instances, Material, Node, NodeKind, Projection, Scene, SceneError,
    Transform,
};

pub const SNAPSHOT_VERSION: u32 = 1;

/// `user_data` key holding auxiliary flat instance matrices.
pub const INSTANCE_MATRICES_KEY: &str = "instanceMatrices";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Group,
    Mesh,
    InstancedMesh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Column-major local matrix.
    pub matrix: [f32; 16],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_matrix: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_color: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub user_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
    pub geometries: Vec<Geometry>,
    pub materials: Vec<Material>,
    pub objects: Vec<NodeSnapshot>,
}

impl SceneSnapshot {
    pub fn capture(scene: &Scene) -> Self {
        let mut out = Self {
            version: SNAPSHOT_VERSION,
            background: scene.background,
            geometries: Vec::new(),
            materials: Vec::new(),
            objects: Vec::new(),
        };
        for node in scene.nodes() {
            let captured = out.capture_node(node);
            out.objects.push(captured);
        }
        out
    }

    fn capture_node(&mut self, node: &Node) -> NodeSnapshot {
        let mut snap = NodeSnapshot {
            name: node.name.clone(),
            node_type: NodeType::Group,
            matrix: node.transform.to_cols_array(),
            geometry: None,
            material: None,
            count: None,
            instance_matrix: None,
            instance_color: None,
            children: Vec::new(),
            user_data: node.user_data.clone(),
        };

        match &node.kind {
            NodeKind::Group => {}
            NodeKind::Mesh(mesh) => {
                snap.node_type = NodeType::Mesh;
                snap.geometry = Some(self.intern_geometry(&mesh.geometry));
                snap.material = Some(self.intern_material(&mesh.material));
            }
            NodeKind::InstancedMesh(mesh) => {
                snap.node_type = NodeType::InstancedMesh;
                snap.geometry = Some(self.intern_geometry(&mesh.geometry));
                snap.material = Some(self.intern_material(&mesh.material));
                snap.count = Some(mesh.instances.count());
                snap.instance_matrix = Some(mesh.instances.matrices_flat());
                snap.instance_color = mesh.instances.colors_flat();
            }
        }

        snap.children = node.children.iter().map(|c| self.capture_node(c)).collect();
        snap
    }

    fn intern_geometry(&mut self, geometry: &Geometry) -> String {
        if !self.geometries.iter().any(|g| g.uuid == geometry.uuid) {
            self.geometries.push(geometry.clone());
        }
        geometry.uuid.clone()
    }

    fn intern_material(&mut self, material: &Material) -> String {
        if !self.materials.iter().any(|m| m.uuid == material.uuid) {
            self.materials.push(material.clone());
        }
        material.uuid.clone()
    }

    /// Rebuilds a live scene. Nodes referencing the same geometry uuid share it.
    pub fn restore(&self) -> Result<Scene, SceneError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SceneError::UnsupportedVersion(self.version));
        }

        let mut geometries = HashMap::with_capacity(self.geometries.len());
        for geometry in &self.geometries {
            geometry.validate()?;
            geometries.insert(geometry.uuid.as_str(), Arc::new(geometry.clone()));
        }
        let materials: HashMap<&str, &Material> = self
            .materials
            .iter()
            .map(|m| (m.uuid.as_str(), m))
            .collect();

        let resolver = Resolver {
            geometries,
            materials,
        };

        let mut scene = Scene::new();
        scene.background = self.background;
        for object in &self.objects {
            scene.add(resolver.restore_node(object)?);
        }
        Ok(scene)
    }
}

struct Resolver<'a> {
    geometries: HashMap<&'a str, Arc<Geometry>>,
    materials: HashMap<&'a str, &'a Material>,
}

impl Resolver<'_> {
    fn restore_node(&self, snap: &NodeSnapshot) -> Result<Node, SceneError> {
        let transform = Transform::from_cols_array(&snap.matrix)?;

        let mut node = match snap.node_type {
            NodeType::Group => Node::group(snap.name.clone()),
            NodeType::Mesh => {
                let (geometry, material) = self.resolve_pair(snap)?;
                Node::mesh(snap.name.clone(), geometry, material)
            }
            NodeType::InstancedMesh => {
                let (geometry, material) = self.resolve_pair(snap)?;
                let count = snap
                    .count
                    .ok_or_else(|| SceneError::MissingInstanceCount(snap.name.clone()))?;
                let instances = Instances::from_flat(
                    count,
                    snap.instance_matrix.as_deref(),
                    snap.instance_color.as_deref(),
                )?;
                Node::instanced(snap.name.clone(), geometry, material, instances)
            }
        };

        node.transform = transform;
        node.user_data = snap.user_data.clone();
        for child in &snap.children {
            node.children.push(self.restore_node(child)?);
        }
        Ok(node)
    }

    fn resolve_pair(&self, snap: &NodeSnapshot) -> Result<(Arc<Geometry>, Material), SceneError> {
        let (Some(geometry), Some(material)) = (&snap.geometry, &snap.material) else {
            return Err(SceneError::IncompleteMesh(snap.name.clone()));
        };
        let geometry = self
            .geometries
            .get(geometry.as_str())
            .cloned()
            .ok_or_else(|| SceneError::UnknownGeometry(geometry.clone()))?;
        let material = self
            .materials
            .get(material.as_str())
            .map(|m| (*m).clone())
            .ok_or_else(|| SceneError::UnknownMaterial(material.clone()))?;
        Ok((geometry, material))
    }
}

/// Writes auxiliary instance matrices stored in `user_data` over the instance
/// buffers of instanced nodes, marking them dirty.
///
/// Returns the number of nodes updated. Entries that are not flat numeric arrays
/// are skipped; arrays of the wrong length are an error.
pub fn reapply_instance_user_data(scene: &mut Scene) -> Result<usize, SceneError> {
    let mut updated = 0;
    let mut failure = None;

    scene.traverse_mut(&mut |node| {
        if failure.is_some() {
            return;
        }
        let Some(flat) = node
            .user_data
            .get(INSTANCE_MATRICES_KEY)
            .and_then(flat_f32_array)
        else {
            return;
        };
        let Some(instances) = node.instances_mut() else {
            return;
        };
        match instances.set_matrices_flat(&flat) {
            Ok(()) => updated += 1,
            Err(e) => failure = Some(e),
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(updated),
    }
}

fn flat_f32_array(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Serialized camera: projection plus local matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub name: String,
    pub projection: Projection,
    pub matrix: [f32; 16],
}

impl CameraSnapshot {
    pub fn capture(camera: &Camera) -> Self {
        let transform = Transform {
            position: camera.position,
            rotation: camera.orientation,
            scale: glam::Vec3::ONE,
        };
        Self {
            name: camera.name.clone(),
            projection: camera.projection,
            matrix: transform.to_cols_array(),
        }
    }

    /// Rebuilds the camera with projection and world matrices updated.
    pub fn restore(&self) -> Result<Camera, SceneError> {
        let transform = Transform::from_cols_array(&self.matrix)?;
        let mut camera = Camera::new(self.projection);
        camera.name = self.name.clone();
        camera.position = transform.position;
        camera.orientation = transform.rotation;
        camera.update_projection_matrix();
        camera.update_matrix_world();
        Ok(camera)
    }
}
