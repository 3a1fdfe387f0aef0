//! Bounding volumes of local lights and their screen-space extent.

use crate::{camera::Camera, fre, light::LightRef, num::Float};
use nalgebra::{self as na, Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector2, Vector3};

/// Triangle mesh bounding the region a local light can affect.
///
/// Front faces point outward, so a pipeline culling front faces draws the far
/// side of the volume, which stays visible when the camera is inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct LightVolumeMesh<F: Float> {
    positions: Vec<Point3<F>>,
    indices: Vec<u32>,
    bounding_scale: Vector3<F>,
}

/// Rectangle of pixels, with the origin in the top left corner of the
/// screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Screen-space extent of a light volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenBounds {
    /// The volume covers no pixels.
    Culled,
    /// The volume is contained in the given rectangle.
    Region(ScissorRect),
}

impl<F: Float> LightVolumeMesh<F> {
    /// Creates a mesh approximating a sphere with radius 1.0 centered at the
    /// origin. `n_rings` is the number of horizontal circular cross-sections
    /// that vertices will be generated around.
    ///
    /// # Panics
    /// If `n_rings` is zero.
    pub fn create_sphere(n_rings: u32) -> Self {
        assert!(n_rings > 0, "Tried to create sphere light volume with no rings");

        let n_circumference_vertices = 2 * n_rings + 2;

        let mut positions =
            Vec::with_capacity((n_circumference_vertices * n_rings + 2) as usize);
        let mut indices = Vec::with_capacity((6 * n_circumference_vertices * n_rings) as usize);

        let delta_phi = F::TWO_PI / na::convert::<f64, F>(f64::from(n_circumference_vertices));
        let delta_theta = F::pi() / na::convert::<f64, F>(f64::from(n_rings + 1));

        // Poles
        positions.push(Point3::new(F::ZERO, F::ONE, F::ZERO));
        positions.push(Point3::new(F::ZERO, -F::ONE, F::ZERO));

        let mut theta = delta_theta;
        for _ in 0..n_rings {
            let sin_theta = F::sin(theta);
            let y = F::cos(theta);

            let mut phi = F::ZERO;
            for _ in 0..n_circumference_vertices {
                positions.push(Point3::new(
                    F::cos(phi) * sin_theta,
                    y,
                    F::sin(phi) * sin_theta,
                ));
                phi += delta_phi;
            }
            theta += delta_theta;
        }

        let ring_start = |ring: u32| 2 + ring * n_circumference_vertices;
        let wrap = |ring: u32, offset: u32| ring_start(ring) + offset % n_circumference_vertices;

        // Top cap
        for offset in 0..n_circumference_vertices {
            indices.extend_from_slice(&[wrap(0, offset), 0, wrap(0, offset + 1)]);
        }

        for ring in 1..n_rings {
            for offset in 0..n_circumference_vertices {
                let current = wrap(ring, offset);
                let next = wrap(ring, offset + 1);
                let above = wrap(ring - 1, offset);
                let above_next = wrap(ring - 1, offset + 1);
                indices.extend_from_slice(&[current, above, next, above, above_next, next]);
            }
        }

        // Bottom cap
        for offset in 0..n_circumference_vertices {
            indices.extend_from_slice(&[1, wrap(n_rings - 1, offset), wrap(n_rings - 1, offset + 1)]);
        }

        let mut mesh = Self {
            positions,
            indices,
            bounding_scale: Vector3::repeat(F::ONE),
        };
        let inscribed_radius = mesh.inscribed_radius();
        mesh.bounding_scale = Vector3::repeat(F::ONE / inscribed_radius);
        mesh
    }

    /// Creates a mesh approximating a cone with its apex at the origin and
    /// its axis along the positive z-axis, with length 1.0 and a base radius
    /// of 1.0. `n_circumference_vertices` is the number of vertices around
    /// the base.
    ///
    /// # Panics
    /// If `n_circumference_vertices` is smaller than 3.
    pub fn create_cone(n_circumference_vertices: u32) -> Self {
        assert!(
            n_circumference_vertices >= 3,
            "Tried to create cone light volume with fewer than three vertices around circumference"
        );

        let mut positions = Vec::with_capacity(n_circumference_vertices as usize + 2);
        let mut indices = Vec::with_capacity(6 * n_circumference_vertices as usize);

        let angle_between_vertices =
            F::TWO_PI / na::convert::<f64, F>(f64::from(n_circumference_vertices));

        // Apex and base center
        positions.push(Point3::origin());
        positions.push(Point3::new(F::ZERO, F::ZERO, F::ONE));

        let mut polar_angle = F::ZERO;
        for _ in 0..n_circumference_vertices {
            positions.push(Point3::new(F::cos(polar_angle), F::sin(polar_angle), F::ONE));
            polar_angle += angle_between_vertices;
        }

        let rim = |offset: u32| 2 + offset % n_circumference_vertices;

        for offset in 0..n_circumference_vertices {
            // Side triangle
            indices.extend_from_slice(&[0, rim(offset + 1), rim(offset)]);
            // Base triangle
            indices.extend_from_slice(&[1, rim(offset), rim(offset + 1)]);
        }

        // The rim polygon must enclose the unit circle
        let radial_scale = F::ONE / F::cos(F::pi() / na::convert::<f64, F>(f64::from(n_circumference_vertices)));

        Self {
            positions,
            indices,
            bounding_scale: Vector3::new(radial_scale, radial_scale, F::ONE),
        }
    }

    pub fn positions(&self) -> &[Point3<F>] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn n_indices(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Scale that must be applied to the mesh for it to enclose the ideal
    /// shape it approximates.
    pub fn bounding_scale(&self) -> &Vector3<F> {
        &self.bounding_scale
    }

    /// Corners of the axis-aligned box enclosing the scaled mesh.
    pub fn bounding_box_corners(&self) -> [Point3<F>; 8] {
        let first = self.positions.first().map_or_else(Vector3::zeros, |p| p.coords);
        let (mut lower, mut upper) = (first, first);
        for position in &self.positions {
            lower = lower.inf(&position.coords);
            upper = upper.sup(&position.coords);
        }
        let lower = lower.component_mul(&self.bounding_scale);
        let upper = upper.component_mul(&self.bounding_scale);

        [
            Point3::new(lower.x, lower.y, lower.z),
            Point3::new(upper.x, lower.y, lower.z),
            Point3::new(lower.x, upper.y, lower.z),
            Point3::new(upper.x, upper.y, lower.z),
            Point3::new(lower.x, lower.y, upper.z),
            Point3::new(upper.x, lower.y, upper.z),
            Point3::new(lower.x, upper.y, upper.z),
            Point3::new(upper.x, upper.y, upper.z),
        ]
    }

    /// Smallest distance from the origin to the plane of any triangle.
    fn inscribed_radius(&self) -> F {
        self.indices
            .chunks_exact(3)
            .filter_map(|triangle| {
                let a = &self.positions[triangle[0] as usize];
                let b = &self.positions[triangle[1] as usize];
                let c = &self.positions[triangle[2] as usize];
                let normal = (b - a).cross(&(c - a));
                let norm = normal.norm();
                (norm > F::default_epsilon()).then(|| <F as na::ComplexField>::abs(normal.dot(&a.coords)) / norm)
            })
            .fold(F::ONE, F::min)
    }
}

/// Computes the transform from the model space of the light's volume mesh to
/// world space, for a light with the given effective distance. Returns
/// [`None`] for directional lights.
pub fn light_volume_to_world_transform(
    light: LightRef<'_>,
    effective_distance: fre,
    sphere: &LightVolumeMesh<fre>,
    cone: &LightVolumeMesh<fre>,
) -> Option<Matrix4<fre>> {
    match light {
        LightRef::Directional(_) => None,
        LightRef::Point(light) => {
            let scale = sphere.bounding_scale() * effective_distance;
            Some(
                Translation3::from(light.position.coords).to_homogeneous()
                    * Matrix4::new_nonuniform_scaling(&scale),
            )
        }
        LightRef::Spot(light) => {
            let rotation = UnitQuaternion::rotation_between_axis(&Vector3::z_axis(), &light.direction)
                .unwrap_or_else(|| {
                    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::PI)
                });
            let base_radius = effective_distance * fre::tan(light.clamped_outer_cutoff());
            let scale = cone.bounding_scale().component_mul(&Vector3::new(
                base_radius,
                base_radius,
                effective_distance,
            ));
            Some(
                Isometry3::from_parts(Translation3::from(light.position.coords), rotation)
                    .to_homogeneous()
                    * Matrix4::new_nonuniform_scaling(&scale),
            )
        }
    }
}

/// Determines which pixels a light volume can cover, given the corners of
/// its model-space bounding box and its model-to-world transform.
///
/// If the bounding box crosses the near plane the whole screen is returned,
/// and if it lies entirely in front of the camera's near plane the volume is
/// culled.
pub fn screen_bounds(
    bounding_box_corners: &[Point3<fre>; 8],
    model_to_world: &Matrix4<fre>,
    camera: &Camera,
    screen_size: (u32, u32),
) -> ScreenBounds {
    let full_screen = ScreenBounds::Region(ScissorRect {
        x: 0,
        y: 0,
        width: screen_size.0,
        height: screen_size.1,
    });

    let corners = *bounding_box_corners;
    let view_corners = corners.map(|corner| {
        camera.world_to_view_point(&model_to_world.transform_point(&corner))
    });

    let near_plane_z = -camera.near_distance();
    let n_behind_near_plane = view_corners
        .iter()
        .filter(|corner| corner.z > near_plane_z)
        .count();

    if n_behind_near_plane == view_corners.len() {
        return ScreenBounds::Culled;
    }
    if n_behind_near_plane > 0 {
        return full_screen;
    }

    let mut lower = Vector2::repeat(fre::INFINITY);
    let mut upper = Vector2::repeat(fre::NEG_INFINITY);
    for corner in &view_corners {
        let (texture_coords, _) = camera.project_to_texture_coords(corner);
        lower = lower.inf(&texture_coords.coords);
        upper = upper.sup(&texture_coords.coords);
    }

    let (width, height) = (screen_size.0 as fre, screen_size.1 as fre);
    let min_x = (lower.x * width).floor().clamp(0.0, width) as u32;
    let max_x = (upper.x * width).ceil().clamp(0.0, width) as u32;
    let min_y = (lower.y * height).floor().clamp(0.0, height) as u32;
    let max_y = (upper.y * height).ceil().clamp(0.0, height) as u32;

    if max_x <= min_x || max_y <= min_y {
        ScreenBounds::Culled
    } else {
        ScreenBounds::Region(ScissorRect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

impl ScissorRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, pixel: (u32, u32)) -> bool {
        pixel.0 >= self.x
            && pixel.0 < self.x + self.width
            && pixel.1 >= self.y
            && pixel.1 < self.y + self.height
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::light::{Attenuation, LightEmission, LightIntensity, PointLight, SpotLight};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn emission() -> LightEmission {
        LightEmission::new(Vector3::new(1.0, 1.0, 1.0), LightIntensity::uniform(1.0))
    }

    fn camera() -> Camera {
        Camera::perspective(Isometry3::identity(), 1.2, 1.0, 0.1, 100.0)
    }

    /// Whether the point lies inside the convex mesh transformed by the given
    /// matrix, using the outward-facing triangle planes.
    fn is_inside_convex_mesh(
        mesh: &LightVolumeMesh<fre>,
        transform: &Matrix4<fre>,
        point: &Point3<fre>,
    ) -> bool {
        let positions: Vec<_> = mesh
            .positions()
            .iter()
            .map(|position| transform.transform_point(position))
            .collect();
        mesh.indices().chunks_exact(3).all(|triangle| {
            let a = positions[triangle[0] as usize];
            let b = positions[triangle[1] as usize];
            let c = positions[triangle[2] as usize];
            let normal = (b - a).cross(&(c - a));
            normal.norm() < 1e-9 || normal.dot(&(point - a)) <= 1e-4
        })
    }

    #[test]
    fn should_create_closed_sphere_with_all_vertices_on_unit_sphere() {
        let mesh = LightVolumeMesh::<f64>::create_sphere(4);
        for position in mesh.positions() {
            assert_abs_diff_eq!(position.coords.norm(), 1.0, epsilon = 1e-9);
        }
        assert_eq!(mesh.indices().len() % 3, 0);
        assert!(mesh.indices().iter().all(|&idx| (idx as usize) < mesh.positions().len()));
        // Every edge of a closed mesh is shared by exactly two triangles
        let mut edges = std::collections::HashMap::new();
        for triangle in mesh.indices().chunks_exact(3) {
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                let edge = (triangle[a].min(triangle[b]), triangle[a].max(triangle[b]));
                *edges.entry(edge).or_insert(0) += 1;
            }
        }
        assert!(edges.values().all(|&count| count == 2));
    }

    #[test]
    fn should_point_sphere_front_faces_outward() {
        let mesh = LightVolumeMesh::<f64>::create_sphere(3);
        for triangle in mesh.indices().chunks_exact(3) {
            let a = mesh.positions()[triangle[0] as usize];
            let b = mesh.positions()[triangle[1] as usize];
            let c = mesh.positions()[triangle[2] as usize];
            let normal = (b - a).cross(&(c - a));
            assert!(normal.dot(&a.coords) > 0.0);
        }
    }

    #[test]
    fn should_scale_sphere_to_enclose_unit_sphere() {
        let mesh = LightVolumeMesh::<fre>::create_sphere(2);
        assert!(mesh.bounding_scale().x > 1.0);
        let transform = Matrix4::new_nonuniform_scaling(mesh.bounding_scale());
        for direction in [
            Vector3::x(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(-0.3, 0.8, 0.2).normalize(),
        ] {
            assert!(is_inside_convex_mesh(
                &mesh,
                &transform,
                &Point3::from(direction * 0.999)
            ));
        }
    }

    #[test]
    fn should_point_cone_front_faces_outward() {
        let mesh = LightVolumeMesh::<f64>::create_cone(8);
        let centroid = Point3::new(0.0, 0.0, 0.75);
        for triangle in mesh.indices().chunks_exact(3) {
            let a = mesh.positions()[triangle[0] as usize];
            let b = mesh.positions()[triangle[1] as usize];
            let c = mesh.positions()[triangle[2] as usize];
            let normal = (b - a).cross(&(c - a));
            assert!(normal.dot(&(a - centroid)) > 0.0);
        }
    }

    proptest! {
        #[test]
        fn should_enclose_all_points_within_point_light_distance(
            x in -1.0_f32..1.0, y in -1.0_f32..1.0, z in -1.0_f32..1.0,
            distance in 0.5_f32..20.0,
        ) {
            let offset = Vector3::new(x, y, z);
            prop_assume!(offset.norm() <= 1.0);
            let sphere = LightVolumeMesh::create_sphere(4);
            let cone = LightVolumeMesh::create_cone(12);
            let light = PointLight::new(emission(), Point3::new(2.0, -1.0, 3.0), Attenuation::default());
            let transform = light_volume_to_world_transform(LightRef::Point(&light), distance, &sphere, &cone).unwrap();
            prop_assert!(is_inside_convex_mesh(&sphere, &transform, &(light.position + offset * distance * 0.999)));
        }

        #[test]
        fn should_enclose_all_points_within_spot_light_cone(
            angle_fraction in 0.0_f32..1.0,
            azimuth in 0.0_f32..6.28,
            distance_fraction in 0.01_f32..1.0,
        ) {
            let sphere = LightVolumeMesh::create_sphere(4);
            let cone = LightVolumeMesh::create_cone(12);
            let direction = Vector3::new(0.3, -1.0, 0.2).normalize();
            let light = SpotLight::new(
                emission(), Point3::new(1.0, 4.0, -2.0), na::Unit::new_normalize(direction),
                Attenuation::default(), 0.2, 0.6, 1.0,
            );
            let distance = 10.0;
            let transform = light_volume_to_world_transform(LightRef::Spot(&light), distance, &sphere, &cone).unwrap();

            let rotation = UnitQuaternion::rotation_between(&Vector3::z(), &direction).unwrap();
            let angle = angle_fraction * light.outer_cutoff;
            let local = Vector3::new(angle.sin() * azimuth.cos(), angle.sin() * azimuth.sin(), angle.cos());
            let point = light.position + rotation * local * distance * distance_fraction * 0.999;
            prop_assert!(is_inside_convex_mesh(&cone, &transform, &point));
        }
    }

    #[test]
    fn should_give_full_screen_when_camera_is_inside_volume() {
        let sphere = LightVolumeMesh::create_sphere(3);
        let cone = LightVolumeMesh::create_cone(8);
        let light = PointLight::new(emission(), Point3::new(0.0, 0.0, -1.0), Attenuation::default());
        let transform = light_volume_to_world_transform(LightRef::Point(&light), 5.0, &sphere, &cone).unwrap();
        assert_eq!(
            screen_bounds(&sphere.bounding_box_corners(), &transform, &camera(), (64, 32)),
            ScreenBounds::Region(ScissorRect { x: 0, y: 0, width: 64, height: 32 })
        );
    }

    #[test]
    fn should_cull_volume_behind_camera() {
        let sphere = LightVolumeMesh::create_sphere(3);
        let cone = LightVolumeMesh::create_cone(8);
        let light = PointLight::new(emission(), Point3::new(0.0, 0.0, 10.0), Attenuation::default());
        let transform = light_volume_to_world_transform(LightRef::Point(&light), 1.0, &sphere, &cone).unwrap();
        assert_eq!(
            screen_bounds(&sphere.bounding_box_corners(), &transform, &camera(), (64, 64)),
            ScreenBounds::Culled
        );
    }

    #[test]
    fn should_cull_volume_outside_view() {
        let sphere = LightVolumeMesh::create_sphere(3);
        let cone = LightVolumeMesh::create_cone(8);
        let light = PointLight::new(emission(), Point3::new(100.0, 0.0, -10.0), Attenuation::default());
        let transform = light_volume_to_world_transform(LightRef::Point(&light), 1.0, &sphere, &cone).unwrap();
        assert_eq!(
            screen_bounds(&sphere.bounding_box_corners(), &transform, &camera(), (64, 64)),
            ScreenBounds::Culled
        );
    }

    #[test]
    fn should_bound_small_light_in_front_of_camera_tightly() {
        let sphere = LightVolumeMesh::create_sphere(3);
        let cone = LightVolumeMesh::create_cone(8);
        let light = PointLight::new(emission(), Point3::new(0.0, 0.0, -10.0), Attenuation::default());
        let transform = light_volume_to_world_transform(LightRef::Point(&light), 1.0, &sphere, &cone).unwrap();
        let ScreenBounds::Region(rect) =
            screen_bounds(&sphere.bounding_box_corners(), &transform, &camera(), (100, 100))
        else {
            panic!("light should be visible");
        };
        assert!(rect.contains((50, 50)));
        assert!(!rect.contains((0, 0)));
        assert!(rect.width < 50 && rect.height < 50);
    }
}
