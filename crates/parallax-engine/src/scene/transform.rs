use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::SceneError;

/// Local transform of a scene node (TRS).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Decomposes an affine matrix into position/rotation/scale.
    pub fn from_matrix(m: &Mat4) -> Self {
        let (scale, rotation, position) = m.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Decomposes a flat column-major matrix, as carried on the wire.
    pub fn from_cols_array(cols: &[f32; 16]) -> Result<Self, SceneError> {
        if cols.iter().any(|v| !v.is_finite()) {
            return Err(SceneError::NonFiniteMatrix);
        }
        Ok(Self::from_matrix(&Mat4::from_cols_array(cols)))
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    #[inline]
    pub fn to_cols_array(&self) -> [f32; 16] {
        self.matrix().to_cols_array()
    }

    /// Sets the rotation from XYZ-ordered Euler angles in radians.
    pub fn set_euler_xyz(&mut self, angles: [f32; 3]) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, angles[0], angles[1], angles[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    // q and -q describe the same rotation.
    fn same_rotation(a: Quat, b: Quat) -> bool {
        a.abs_diff_eq(b, 1e-5) || a.abs_diff_eq(-b, 1e-5)
    }

    #[test]
    fn flat_matrix_decomposes_into_trs() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 2.0, 2.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, -3.0, 4.5),
        );
        let t = Transform::from_cols_array(&m.to_cols_array()).unwrap();
        assert!(approx(t.position, Vec3::new(1.0, -3.0, 4.5)));
        assert!(approx(t.scale, Vec3::splat(2.0)));
        assert!(same_rotation(
            t.rotation,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)
        ));
    }

    #[test]
    fn non_finite_matrix_is_rejected() {
        let mut cols = Mat4::IDENTITY.to_cols_array();
        cols[12] = f32::NAN;
        assert_eq!(Transform::from_cols_array(&cols), Err(SceneError::NonFiniteMatrix));
    }

    #[test]
    fn euler_single_axis_matches_quat() {
        let mut t = Transform::IDENTITY;
        t.set_euler_xyz([0.0, 0.0, 0.5]);
        assert!(same_rotation(t.rotation, Quat::from_rotation_z(0.5)));
    }
}
