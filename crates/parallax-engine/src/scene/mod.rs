//! Scene graph model.
//!
//! This is the data the render side owns once a snapshot has been loaded:
//! - `Scene` / `Node`: named hierarchy of groups, meshes and instanced meshes
//! - `Camera`: projection + pose
//! - `snapshot`: serialized form exchanged once at load time and per added object

mod camera;
mod error;
mod geometry;
mod instances;
mod material;
mod node;
pub mod snapshot;
mod transform;

use glam::Mat4;

use crate::paint::Color;

pub use camera::{Camera, CameraPose, Projection};
pub use error::SceneError;
pub use geometry::Geometry;
pub use instances::{Instances, MAX_INSTANCES};
pub use material::Material;
pub use node::{InstancedMesh, Mesh, Node, NodeKind};
pub use snapshot::{CameraSnapshot, NodeSnapshot, SceneSnapshot};
pub use transform::Transform;

/// Root container of the scene graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub background: Option<Color>,
    nodes: Vec<Node>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    /// Appends a root node. Existing nodes with the same name keep precedence in lookups.
    pub fn add(&mut self, node: Node) {
        self.nodes.push(node);
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// First node named `name` in depth-first order.
    pub fn find(&self, name: &str) -> Option<&Node> {
        find_in(&self.nodes, name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Node> {
        find_in_mut(&mut self.nodes, name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Detaches and returns the first node named `name` (with its subtree).
    pub fn remove(&mut self, name: &str) -> Option<Node> {
        remove_in(&mut self.nodes, name)
    }

    /// Visits every node in depth-first order.
    pub fn traverse(&self, f: &mut dyn FnMut(&Node)) {
        fn walk(nodes: &[Node], f: &mut dyn FnMut(&Node)) {
            for node in nodes {
                f(node);
                walk(&node.children, f);
            }
        }
        walk(&self.nodes, f);
    }

    pub fn traverse_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        fn walk(nodes: &mut [Node], f: &mut dyn FnMut(&mut Node)) {
            for node in nodes {
                f(node);
                walk(&mut node.children, f);
            }
        }
        walk(&mut self.nodes, f);
    }

    /// Visits every node together with its world matrix.
    pub fn traverse_world(&self, f: &mut dyn FnMut(&Node, Mat4)) {
        fn walk(nodes: &[Node], parent: Mat4, f: &mut dyn FnMut(&Node, Mat4)) {
            for node in nodes {
                let world = parent * node.local_matrix();
                f(node, world);
                walk(&node.children, world, f);
            }
        }
        walk(&self.nodes, Mat4::IDENTITY, f);
    }

    /// Total number of nodes, including nested children.
    pub fn object_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |_| count += 1);
        count
    }

    /// All node names in depth-first order.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.traverse(&mut |n| names.push(n.name.clone()));
        names
    }
}

fn find_in<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.name == name {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, name) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [Node], name: &str) -> Option<&'a mut Node> {
    for node in nodes.iter_mut() {
        if node.name == name {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, name) {
            return Some(found);
        }
    }
    None
}

fn remove_in(nodes: &mut Vec<Node>, name: &str) -> Option<Node> {
    for i in 0..nodes.len() {
        if nodes[i].name == name {
            return Some(nodes.remove(i));
        }
        if let Some(found) = remove_in(&mut nodes[i].children, name) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;

    fn sample() -> Scene {
        let geo = Arc::new(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut scene = Scene::new();
        scene.add(
            Node::group("rig")
                .with_transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
                .with_child(Node::mesh("arm", geo.clone(), Material::default())),
        );
        scene.add(Node::mesh("floor", geo, Material::default()));
        scene
    }

    #[test]
    fn find_reaches_nested_children() {
        let scene = sample();
        assert_eq!(scene.find("arm").map(|n| n.type_name()), Some("Mesh"));
        assert!(scene.find("missing").is_none());
        assert_eq!(scene.object_count(), 3);
        assert_eq!(scene.names(), ["rig", "arm", "floor"]);
    }

    #[test]
    fn remove_detaches_subtree() {
        let mut scene = sample();
        let rig = scene.remove("rig").unwrap();
        assert_eq!(rig.children.len(), 1);
        assert_eq!(scene.object_count(), 1);
        assert!(scene.remove("arm").is_none());
    }

    #[test]
    fn duplicate_names_resolve_to_first_inserted() {
        let mut scene = sample();
        scene.add(Node::group("floor").with_transform(Transform::from_position(Vec3::X)));
        assert_eq!(scene.find("floor").map(|n| n.type_name()), Some("Mesh"));
        scene.remove("floor");
        assert_eq!(scene.find("floor").map(|n| n.type_name()), Some("Group"));
    }

    #[test]
    fn world_matrices_compose_parent_transforms() {
        let scene = sample();
        let mut arm_world = None;
        scene.traverse_world(&mut |node, world| {
            if node.name == "arm" {
                arm_world = Some(world);
            }
        });
        let translation = arm_world.unwrap().w_axis.truncate();
        assert_eq!(translation, Vec3::new(0.0, 2.0, 0.0));
    }
}
