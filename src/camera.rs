//! Camera parameters needed to reconstruct positions from depth.

use crate::fre;
use nalgebra::{Isometry3, Matrix4, Point2, Point3, Vector2, Vector3, Vector4};

/// The viewpoint a frame is lit from. Lighting is computed in the camera's
/// view space, where the camera sits at the origin looking down the negative
/// z-axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    view_transform: Isometry3<fre>,
    projection: Matrix4<fre>,
    inverse_projection: Matrix4<fre>,
    near_distance: fre,
    far_distance: fre,
}

impl Camera {
    /// Creates a perspective camera with the given vertical field of view (in
    /// radians), aspect ratio (width over height) and near and far plane
    /// distances.
    ///
    /// # Panics
    /// - If the near distance is not positive.
    /// - If the far distance does not exceed the near distance.
    pub fn perspective(
        view_transform: Isometry3<fre>,
        vertical_field_of_view: fre,
        aspect_ratio: fre,
        near_distance: fre,
        far_distance: fre,
    ) -> Self {
        assert!(near_distance > 0.0);
        assert!(far_distance > near_distance);

        let projection = perspective_projection(
            vertical_field_of_view,
            aspect_ratio,
            near_distance,
            far_distance,
        );
        let inverse_projection = projection.try_inverse().unwrap_or_else(Matrix4::identity);

        Self {
            view_transform,
            projection,
            inverse_projection,
            near_distance,
            far_distance,
        }
    }

    /// Creates a view transform for a camera at `eye` looking at `target`.
    pub fn look_at(eye: &Point3<fre>, target: &Point3<fre>, up: &Vector3<fre>) -> Isometry3<fre> {
        Isometry3::look_at_rh(eye, target, up)
    }

    /// Transform from world space to view space.
    pub fn view_transform(&self) -> &Isometry3<fre> {
        &self.view_transform
    }

    pub fn projection(&self) -> &Matrix4<fre> {
        &self.projection
    }

    pub fn inverse_projection(&self) -> &Matrix4<fre> {
        &self.inverse_projection
    }

    /// Transform from view space back to world space.
    pub fn inverse_view_matrix(&self) -> Matrix4<fre> {
        self.view_transform.inverse().to_homogeneous()
    }

    pub fn near_distance(&self) -> fre {
        self.near_distance
    }

    pub fn far_distance(&self) -> fre {
        self.far_distance
    }

    /// Transforms a world-space point into view space.
    pub fn world_to_view_point(&self, point: &Point3<fre>) -> Point3<fre> {
        self.view_transform.transform_point(point)
    }

    /// Transforms a world-space direction into view space.
    pub fn world_to_view_direction(&self, direction: &Vector3<fre>) -> Vector3<fre> {
        self.view_transform.transform_vector(direction)
    }

    /// Projects a view-space point to texture coordinates (origin top left)
    /// and depth.
    pub fn project_to_texture_coords(&self, view_position: &Point3<fre>) -> (Point2<fre>, fre) {
        project_to_texture_coords(&self.projection, view_position)
    }

    /// Reconstructs the view-space position of the surface stored at the given
    /// texture coordinates with the given depth.
    pub fn reconstruct_view_position(&self, texture_coords: &Point2<fre>, depth: fre) -> Point3<fre> {
        reconstruct_view_position(&self.inverse_projection, texture_coords, depth)
    }
}

/// Creates a right-handed perspective projection mapping view-space depths
/// between the near and far distance to the `[0, 1]` depth range.
pub fn perspective_projection(
    vertical_field_of_view: fre,
    aspect_ratio: fre,
    near_distance: fre,
    far_distance: fre,
) -> Matrix4<fre> {
    let focal_length = 1.0 / fre::tan(0.5 * vertical_field_of_view);
    let depth_scale = far_distance / (near_distance - far_distance);

    #[rustfmt::skip]
    let projection = Matrix4::new(
        focal_length / aspect_ratio, 0.0,          0.0,         0.0,
        0.0,                         focal_length, 0.0,         0.0,
        0.0,                         0.0,          depth_scale, near_distance * depth_scale,
        0.0,                         0.0,          -1.0,        0.0,
    );
    projection
}

/// Projects a view-space point to texture coordinates (origin top left) and
/// depth using the given projection.
pub fn project_to_texture_coords(
    projection: &Matrix4<fre>,
    view_position: &Point3<fre>,
) -> (Point2<fre>, fre) {
    let clip_position = projection * view_position.to_homogeneous();
    let w = if clip_position.w.abs() > fre::EPSILON {
        clip_position.w
    } else {
        fre::EPSILON
    };
    let ndc = clip_position.xyz() / w;
    (
        Point2::new(0.5 * ndc.x + 0.5, 0.5 - 0.5 * ndc.y),
        ndc.z,
    )
}

/// Reconstructs a view-space position from texture coordinates (origin top
/// left), depth and the inverse projection.
pub fn reconstruct_view_position(
    inverse_projection: &Matrix4<fre>,
    texture_coords: &Point2<fre>,
    depth: fre,
) -> Point3<fre> {
    let ndc = Vector4::new(
        texture_coords.x * 2.0 - 1.0,
        1.0 - texture_coords.y * 2.0,
        depth,
        1.0,
    );
    let view = inverse_projection * ndc;
    Point3::from(view.xyz() / view.w)
}

/// Returns the texture coordinates of the center of the given pixel.
pub fn pixel_center_texture_coords(pixel: (u32, u32), screen_size: Vector2<fre>) -> Point2<fre> {
    Point2::new(
        (pixel.0 as fre + 0.5) / screen_size.x,
        (pixel.1 as fre + 0.5) / screen_size.y,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_camera() -> Camera {
        Camera::perspective(Isometry3::identity(), 1.2, 1.5, 0.1, 100.0)
    }

    #[test]
    fn should_map_near_and_far_planes_to_unit_depth_range() {
        let camera = test_camera();
        let (_, near_depth) = camera.project_to_texture_coords(&Point3::new(0.0, 0.0, -0.1));
        let (_, far_depth) = camera.project_to_texture_coords(&Point3::new(0.0, 0.0, -100.0));
        assert_abs_diff_eq!(near_depth, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(far_depth, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn should_reconstruct_projected_view_position() {
        let camera = test_camera();
        let position = Point3::new(1.5, -0.7, -12.0);
        let (texture_coords, depth) = camera.project_to_texture_coords(&position);
        let reconstructed = camera.reconstruct_view_position(&texture_coords, depth);
        assert_abs_diff_eq!(reconstructed, position, epsilon = 1e-3);
    }

    #[test]
    fn should_put_texture_origin_at_top_left() {
        let camera = test_camera();
        let (texture_coords, _) = camera.project_to_texture_coords(&Point3::new(-1.0, 1.0, -1.0));
        assert!(texture_coords.x < 0.5);
        assert!(texture_coords.y < 0.5);
    }

    #[test]
    fn should_transform_world_points_into_view_space() {
        let view = Camera::look_at(
            &Point3::new(0.0, 0.0, 5.0),
            &Point3::origin(),
            &Vector3::y(),
        );
        let camera = Camera::perspective(view, 1.0, 1.0, 0.1, 50.0);
        assert_abs_diff_eq!(
            camera.world_to_view_point(&Point3::origin()),
            Point3::new(0.0, 0.0, -5.0),
            epsilon = 1e-5
        );
    }
}
