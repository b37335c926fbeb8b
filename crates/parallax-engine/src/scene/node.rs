use std::sync::Arc;

use glam::Mat4;
use serde_json::{Map, Value};

use super::{Geometry, Instances, Material, Transform};

/// A single drawable mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Material,
}

/// A mesh drawn once per instance with per-instance transforms (and colors).
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedMesh {
    pub geometry: Arc<Geometry>,
    pub material: Material,
    pub instances: Instances,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    InstancedMesh(InstancedMesh),
}

/// Scene graph node.
///
/// Names are the addressing scheme used by remote mutations. They are not
/// required to be unique; lookups resolve the first match in depth-first order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub user_data: Map<String, Value>,
}

impl Node {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            kind,
            children: Vec::new(),
            user_data: Map::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, geometry: Arc<Geometry>, material: Material) -> Self {
        Self::with_kind(name, NodeKind::Mesh(Mesh { geometry, material }))
    }

    pub fn instanced(
        name: impl Into<String>,
        geometry: Arc<Geometry>,
        material: Material,
        instances: Instances,
    ) -> Self {
        Self::with_kind(
            name,
            NodeKind::InstancedMesh(InstancedMesh {
                geometry,
                material,
                instances,
            }),
        )
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Human-readable kind tag, used for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Group => "Group",
            NodeKind::Mesh(_) => "Mesh",
            NodeKind::InstancedMesh(_) => "InstancedMesh",
        }
    }

    #[inline]
    pub fn is_instanced(&self) -> bool {
        matches!(self.kind, NodeKind::InstancedMesh(_))
    }

    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        match &self.kind {
            NodeKind::Group => None,
            NodeKind::Mesh(m) => Some(&m.geometry),
            NodeKind::InstancedMesh(m) => Some(&m.geometry),
        }
    }

    pub fn material(&self) -> Option<&Material> {
        match &self.kind {
            NodeKind::Group => None,
            NodeKind::Mesh(m) => Some(&m.material),
            NodeKind::InstancedMesh(m) => Some(&m.material),
        }
    }

    pub fn material_mut(&mut self) -> Option<&mut Material> {
        match &mut self.kind {
            NodeKind::Group => None,
            NodeKind::Mesh(m) => Some(&mut m.material),
            NodeKind::InstancedMesh(m) => Some(&mut m.material),
        }
    }

    pub fn instances(&self) -> Option<&Instances> {
        match &self.kind {
            NodeKind::InstancedMesh(m) => Some(&m.instances),
            _ => None,
        }
    }

    pub fn instances_mut(&mut self) -> Option<&mut Instances> {
        match &mut self.kind {
            NodeKind::InstancedMesh(m) => Some(&mut m.instances),
            _ => None,
        }
    }

    #[inline]
    pub fn local_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }
}
