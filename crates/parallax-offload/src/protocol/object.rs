use std::sync::Arc;

use parallax_engine::scene::{
    Geometry, Instances, Material, Node, NodeKind, SceneError, Transform,
};
use serde::{Deserialize, Serialize};

/// Options for adding an object.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Name under which the object is inserted. Falls back to the node's own
    /// name, then to a fresh uuid.
    pub name: Option<String>,
}

impl AddOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Serialized form of a single mesh or instanced mesh for `add_object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPayload {
    pub name: String,
    /// Informational type tag; construction is driven by `is_instanced_mesh`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_instanced_mesh: bool,
    pub geometry: Geometry,
    pub material: Material,
    /// Column-major local matrix.
    pub matrix: [f32; 16],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_matrices: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_colors: Option<Vec<f32>>,
}

impl ObjectPayload {
    /// Serializes a mesh node. Groups have nothing to draw and are refused.
    pub fn from_node(node: &Node, options: AddOptions) -> Result<Self, SceneError> {
        let name = options
            .name
            .or_else(|| (!node.name.is_empty()).then(|| node.name.clone()))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (geometry, material, instances) = match &node.kind {
            NodeKind::Group => return Err(SceneError::IncompleteMesh(name)),
            NodeKind::Mesh(mesh) => (&mesh.geometry, &mesh.material, None),
            NodeKind::InstancedMesh(mesh) => {
                (&mesh.geometry, &mesh.material, Some(&mesh.instances))
            }
        };

        Ok(Self {
            name,
            type_name: node.type_name().to_string(),
            is_instanced_mesh: instances.is_some(),
            geometry: Geometry::clone(geometry),
            material: material.clone(),
            matrix: node.transform.to_cols_array(),
            count: instances.map(Instances::count),
            instance_matrices: instances.map(Instances::matrices_flat),
            instance_colors: instances.and_then(Instances::colors_flat),
        })
    }

    /// Rebuilds a live node.
    ///
    /// Instance colors switch the material to vertex colors. Instance buffers
    /// come back dirty so the renderer re-uploads them.
    pub fn into_node(self) -> Result<Node, SceneError> {
        self.geometry.validate()?;
        let transform = Transform::from_cols_array(&self.matrix)?;

        let mut material = self.material;
        if self.instance_colors.is_some() {
            material.vertex_colors = true;
        }
        let geometry = Arc::new(self.geometry);

        let mut node = if self.is_instanced_mesh {
            let count = self
                .count
                .ok_or_else(|| SceneError::MissingInstanceCount(self.name.clone()))?;
            let mut instances = Instances::from_flat(
                count,
                self.instance_matrices.as_deref(),
                self.instance_colors.as_deref(),
            )?;
            instances.mark_dirty();
            Node::instanced(self.name, geometry, material, instances)
        } else {
            Node::mesh(self.name, geometry, material)
        };
        node.transform = transform;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};
    use parallax_engine::Color;

    use super::*;

    fn swarm() -> Node {
        let mut instances = Instances::identity(2);
        instances.set_matrix(1, Mat4::from_translation(Vec3::X * 3.0));
        instances.set_colors_flat(&[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        Node::instanced(
            "swarm",
            Arc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
            Material::new(Color::WHITE),
            instances,
        )
        .with_transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
    }

    #[test]
    fn instanced_payload_rebuilds_instances_and_colors() {
        let payload = ObjectPayload::from_node(&swarm(), AddOptions::default()).unwrap();
        assert!(payload.is_instanced_mesh);
        assert_eq!(payload.count, Some(2));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["isInstancedMesh"], true);
        assert_eq!(json["type"], "InstancedMesh");

        let node: Node = serde_json::from_value::<ObjectPayload>(json)
            .unwrap()
            .into_node()
            .unwrap();
        let instances = node.instances().unwrap();
        assert!(instances.is_dirty());
        assert_eq!(instances.matrices()[1].w_axis.x, 3.0);
        assert!(node.material().unwrap().vertex_colors);
        assert_eq!(node.transform.position.y, 2.0);
    }

    #[test]
    fn flag_wins_over_type_tag() {
        let mut payload = ObjectPayload::from_node(&swarm(), AddOptions::named("plain")).unwrap();
        payload.is_instanced_mesh = false;
        let node = payload.into_node().unwrap();
        assert_eq!(node.name, "plain");
        assert!(!node.is_instanced());
    }

    #[test]
    fn instanced_without_count_fails() {
        let mut payload = ObjectPayload::from_node(&swarm(), AddOptions::default()).unwrap();
        payload.count = None;
        assert!(matches!(payload.into_node(), Err(SceneError::MissingInstanceCount(_))));
    }

    #[test]
    fn groups_and_unnamed_nodes() {
        assert!(ObjectPayload::from_node(&Node::group("g"), AddOptions::default()).is_err());

        let mesh = Node::mesh(
            "",
            Arc::new(Geometry::cuboid(1.0, 1.0, 1.0)),
            Material::default(),
        );
        let payload = ObjectPayload::from_node(&mesh, AddOptions::default()).unwrap();
        assert!(uuid::Uuid::parse_str(&payload.name).is_ok());
    }
}
