use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Camera projection parameters.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Projection {
    Perspective {
        /// Vertical field of view in degrees.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 50.0,
            aspect: 1.0,
            near: 0.1,
            far: 2000.0,
        }
    }
}

/// Camera position + orientation: the per-frame state carried by the shared camera slots.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl CameraPose {
    /// Number of `f32` slots: `x y z` position followed by `x y z w` orientation.
    pub const SLOTS: usize = 7;

    pub fn to_slots(&self) -> [f32; Self::SLOTS] {
        let p = self.position;
        let q = self.orientation;
        [p.x, p.y, p.z, q.x, q.y, q.z, q.w]
    }

    pub fn from_slots(s: [f32; Self::SLOTS]) -> Self {
        Self {
            position: Vec3::new(s[0], s[1], s[2]),
            orientation: Quat::from_xyzw(s[3], s[4], s[5], s[6]),
        }
    }
}

/// Scene camera.
///
/// Matrices are cached and only refreshed by `update_matrix_world` and
/// `update_projection_matrix`, mirroring how the render loop updates them once
/// per frame after applying the latest pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: String,
    pub projection: Projection,
    pub position: Vec3,
    pub orientation: Quat,
    world_matrix: Mat4,
    projection_matrix: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Projection::default())
    }
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        let mut camera = Self {
            name: String::from("camera"),
            projection,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera.update_matrix_world();
        camera
    }

    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        })
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self.update_matrix_world();
        self
    }

    /// Orients the camera so that it looks at `target` with +Y up.
    pub fn looking_at(mut self, target: Vec3) -> Self {
        let view = Mat4::look_at_rh(self.position, target, Vec3::Y);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.orientation = rotation.normalize();
        self.update_matrix_world();
        self
    }

    #[inline]
    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            orientation: self.orientation,
        }
    }

    /// Overwrites position and orientation. Call `update_matrix_world` afterwards.
    #[inline]
    pub fn apply_pose(&mut self, pose: CameraPose) {
        self.position = pose.position;
        self.orientation = pose.orientation;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = &mut self.projection {
            *a = aspect;
        }
        self.update_projection_matrix();
    }

    pub fn update_matrix_world(&mut self) {
        self.world_matrix = Mat4::from_rotation_translation(self.orientation, self.position);
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y.to_radians(), aspect.max(f32::EPSILON), near, far),
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        };
    }

    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    #[inline]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix.inverse()
    }

    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix()
    }
}
