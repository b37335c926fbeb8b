use glam::{Mat4, Vec3};

use super::SceneError;

const MATRIX_FLOATS: usize = 16;
const COLOR_FLOATS: usize = 3;

/// Largest instance count a mesh may carry.
pub const MAX_INSTANCES: usize = 1 << 20;

/// Per-instance data of an instanced mesh.
///
/// `dirty` marks buffers that changed since the renderer last uploaded them.
#[derive(Debug, Clone, PartialEq)]
pub struct Instances {
    matrices: Vec<Mat4>,
    colors: Option<Vec<Vec3>>,
    dirty: bool,
}

impl Instances {
    /// `count` identity instances without colors.
    pub fn identity(count: usize) -> Self {
        Self {
            matrices: vec![Mat4::IDENTITY; count],
            colors: None,
            dirty: true,
        }
    }

    /// Builds instances from flat column-major matrices and optional flat RGB colors.
    ///
    /// Absent matrices default to identity. Present buffers must match `count` exactly.
    /// Counts above [`MAX_INSTANCES`] are rejected before anything is allocated.
    pub fn from_flat(
        count: usize,
        matrices: Option<&[f32]>,
        colors: Option<&[f32]>,
    ) -> Result<Self, SceneError> {
        if count > MAX_INSTANCES {
            return Err(SceneError::TooManyInstances {
                count,
                max: MAX_INSTANCES,
            });
        }
        let mut instances = Self::identity(count);
        if let Some(flat) = matrices {
            instances.set_matrices_flat(flat)?;
        }
        if let Some(flat) = colors {
            instances.set_colors_flat(flat)?;
        }
        Ok(instances)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.matrices.len()
    }

    #[inline]
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    #[inline]
    pub fn colors(&self) -> Option<&[Vec3]> {
        self.colors.as_deref()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn set_matrix(&mut self, index: usize, matrix: Mat4) {
        if let Some(slot) = self.matrices.get_mut(index) {
            *slot = matrix;
            self.dirty = true;
        }
    }

    pub fn set_matrices_flat(&mut self, flat: &[f32]) -> Result<(), SceneError> {
        check_len("matrix", self.count() * MATRIX_FLOATS, flat.len())?;
        for (slot, cols) in self.matrices.iter_mut().zip(flat.chunks_exact(MATRIX_FLOATS)) {
            *slot = Mat4::from_cols_slice(cols);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn set_colors_flat(&mut self, flat: &[f32]) -> Result<(), SceneError> {
        check_len("color", self.count() * COLOR_FLOATS, flat.len())?;
        self.colors = Some(flat.chunks_exact(COLOR_FLOATS).map(Vec3::from_slice).collect());
        self.dirty = true;
        Ok(())
    }

    pub fn matrices_flat(&self) -> Vec<f32> {
        self.matrices
            .iter()
            .flat_map(|m| m.to_cols_array())
            .collect()
    }

    pub fn colors_flat(&self) -> Option<Vec<f32>> {
        self.colors
            .as_ref()
            .map(|c| c.iter().flat_map(|v| v.to_array()).collect())
    }
}

fn check_len(buffer: &'static str, expected: usize, actual: usize) -> Result<(), SceneError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SceneError::InstanceBufferLength {
            buffer,
            expected,
            actual,
        })
    }
}
