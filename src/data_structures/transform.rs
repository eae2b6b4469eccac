//! Node-local transformation data.
//!
//! Scene nodes carry a translation/rotation/scale triple rather than a matrix so
//! that callers (exploded views, animation) can move one component without
//! decomposing.

use std::ops::Mul;

use cgmath::{EuclideanSpace, One, Zero};

/// Translation, rotation (as quaternion) and non-uniform scale of a node
/// relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::zero(),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Build from glTF's decomposed `(translation, rotation xyzw, scale)`.
    pub fn from_decomposed(decomposed: ([f32; 3], [f32; 4], [f32; 3])) -> Self {
        let (t, r, s) = decomposed;
        Self {
            position: t.into(),
            // glTF stores xyzw, cgmath wants the scalar first
            rotation: cgmath::Quaternion::new(r[3], r[0], r[1], r[2]),
            scale: s.into(),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Map a point from this node's local space into its parent's space.
    pub fn transform_point(&self, point: cgmath::Point3<f32>) -> cgmath::Point3<f32> {
        let scaled = cgmath::Vector3::new(
            point.x * self.scale.x,
            point.y * self.scale.y,
            point.z * self.scale.z,
        );
        cgmath::Point3::from_vec(self.rotation * scaled + self.position)
    }
}

/// Parent * child, i.e. the child's transform expressed in the parent's parent space.
impl Mul<Transform> for Transform {
    type Output = Self;

    fn mul(self, rhs: Transform) -> Self::Output {
        let rotation = self.rotation * rhs.rotation;
        let scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let position = self.position + (self.rotation * scaled_rhs_pos);

        Transform {
            position,
            rotation,
            scale,
        }
    }
}
