use bevy::prelude::*;

/// Camera-space ray directions through the four corners of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumCorners {
    pub top_left: Vec3,
    pub top_right: Vec3,
    pub bottom_right: Vec3,
    pub bottom_left: Vec3,
}

impl FrustumCorners {
    /// Row index of each corner inside [`FrustumCorners::to_matrix`].
    pub const TOP_LEFT: usize = 0;
    pub const TOP_RIGHT: usize = 1;
    pub const BOTTOM_RIGHT: usize = 2;
    pub const BOTTOM_LEFT: usize = 3;

    /// Packs the corners as the rows of a matrix, `w` left at zero.
    /// The matrix is only a transport container for the shader.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_cols(
            self.top_left.extend(0.),
            self.top_right.extend(0.),
            self.bottom_right.extend(0.),
            self.bottom_left.extend(0.),
        )
        .transpose()
    }

    #[inline]
    pub fn as_array(&self) -> [Vec3; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }
}

/// Corner rays of a perspective camera looking down its local -Z.
///
/// `fov_degrees` is the vertical field of view. Non-finite inputs are not
/// guarded here, see [`super::camera::CameraState::sanitized`].
pub fn compute_frustum(fov_degrees: f32, aspect: f32) -> FrustumCorners {
    let half_fov = (fov_degrees * 0.5).to_radians().tan();

    let go_up = Vec3::Y * half_fov;
    let go_right = Vec3::X * half_fov * aspect;
    let back = -Vec3::Z;

    FrustumCorners {
        top_left: back - go_right + go_up,
        top_right: back + go_right + go_up,
        bottom_right: back + go_right - go_up,
        bottom_left: back - go_right - go_up,
    }
}
