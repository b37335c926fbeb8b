use serde::{Deserialize, Serialize};

use super::SceneError;

/// Triangle geometry with flat vertex attributes.
///
/// Identity is the `uuid`; snapshots share one geometry between every node that
/// references the same uuid, and GPU renderers cache uploads by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub uuid: String,

    /// `xyz` triples.
    #[serde(default)]
    pub positions: Vec<f32>,

    /// `xyz` triples, either empty or one per vertex.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normals: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    /// Creates a geometry with a fresh uuid.
    pub fn new(positions: Vec<f32>) -> Self {
        Self::with_uuid(uuid::Uuid::new_v4().to_string(), positions)
    }

    pub fn with_uuid(uuid: impl Into<String>, positions: Vec<f32>) -> Self {
        Self {
            uuid: uuid.into(),
            positions,
            normals: Vec::new(),
            indices: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of vertices drawn (indices if present, otherwise vertices).
    #[inline]
    pub fn draw_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.vertex_count(), |i| i.len())
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        let invalid = |reason: String| SceneError::InvalidGeometry {
            uuid: self.uuid.clone(),
            reason,
        };

        if self.positions.len() % 3 != 0 {
            return Err(invalid(format!(
                "position buffer length {} is not a multiple of 3",
                self.positions.len()
            )));
        }
        if !self.normals.is_empty() && self.normals.len() != self.positions.len() {
            return Err(invalid(format!(
                "normal buffer length {} does not match position buffer length {}",
                self.normals.len(),
                self.positions.len()
            )));
        }
        if let Some(indices) = &self.indices {
            let vertices = self.vertex_count() as u32;
            if let Some(&bad) = indices.iter().find(|&&i| i >= vertices) {
                return Err(invalid(format!(
                    "index {bad} out of range for {vertices} vertices"
                )));
            }
        }
        Ok(())
    }

    /// Axis-aligned box centred on the origin, with per-face normals.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (x, y, z) = (width * 0.5, height * 0.5, depth * 0.5);

        // (normal, four corners in counter-clockwise order seen from outside)
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([1.0, 0.0, 0.0], [[x, -y, z], [x, -y, -z], [x, y, -z], [x, y, z]]),
            ([-1.0, 0.0, 0.0], [[-x, -y, -z], [-x, -y, z], [-x, y, z], [-x, y, -z]]),
            ([0.0, 1.0, 0.0], [[-x, y, z], [x, y, z], [x, y, -z], [-x, y, -z]]),
            ([0.0, -1.0, 0.0], [[-x, -y, -z], [x, -y, -z], [x, -y, z], [-x, -y, z]]),
            ([0.0, 0.0, 1.0], [[-x, -y, z], [x, -y, z], [x, y, z], [-x, y, z]]),
            ([0.0, 0.0, -1.0], [[x, -y, -z], [-x, -y, -z], [-x, y, -z], [x, y, -z]]),
        ];

        let mut positions = Vec::with_capacity(6 * 4 * 3);
        let mut normals = Vec::with_capacity(6 * 4 * 3);
        let mut indices = Vec::with_capacity(6 * 6);
        for (face, (normal, corners)) in faces.iter().enumerate() {
            for corner in corners {
                positions.extend_from_slice(corner);
                normals.extend_from_slice(normal);
            }
            let base = (face * 4) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(positions)
            .with_normals(normals)
            .with_indices(indices)
    }
}
