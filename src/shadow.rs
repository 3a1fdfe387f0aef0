//! Shadow map sampling for the shadow-aware light passes.

use crate::{
    camera::project_to_texture_coords,
    config::ShadowFilter,
    fre,
    light::{LightKind, ShadowMapId},
};
use nalgebra::{Matrix4, Point3, Vector3};
use std::collections::HashMap;

/// Radius, in texels, of the percentage-closer filter kernel for 2D shadow
/// maps.
pub const PCF_KERNEL_RADIUS: i32 = 1;

/// Directions in which a point light's cube map is sampled around the
/// central direction when percentage-closer filtering is used.
pub const POINT_PCF_OFFSET_DIRECTIONS: [[fre; 3]; 9] = [
    [0.0, 0.0, 0.0],
    [1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
];

/// Length of the point light PCF offset directions relative to the distance
/// between the light and the shaded point.
pub const POINT_PCF_SPREAD: fre = 0.01;

/// Provides the shadow maps rendered for shadow-producing lights.
///
/// Maps for directional lights must be 2D array views with one layer per
/// cascade, maps for point lights cube views and maps for spot lights 2D
/// views, all with a depth format.
pub trait ShadowMapProvider {
    fn shadow_map(&self, id: ShadowMapId) -> Option<&wgpu::TextureView>;
}

/// Parameters of the slope-scaled depth offset subtracted from shadow map
/// comparison depths to avoid self-shadowing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowOffset {
    pub min_offset: fre,
    pub max_slope_offset: fre,
}

/// CPU-side depth map, stored row by row from the top left texel.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    depths: Vec<fre>,
}

impl ShadowMapProvider for HashMap<ShadowMapId, wgpu::TextureView> {
    fn shadow_map(&self, id: ShadowMapId) -> Option<&wgpu::TextureView> {
        self.get(&id)
    }
}

impl ShadowOffset {
    /// Offset parameters for the given kind of light.
    pub fn for_light_kind(kind: LightKind) -> Self {
        match kind {
            LightKind::Directional => Self {
                min_offset: 1e-3,
                max_slope_offset: 1e-3,
            },
            LightKind::Point | LightKind::Spot => Self {
                min_offset: 1e-5,
                max_slope_offset: 1e-4,
            },
        }
    }

    /// Computes the depth offset for a surface whose normal makes the given
    /// cosine with the direction towards the light.
    pub fn compute(&self, n_dot_l: fre) -> fre {
        self.min_offset + self.max_slope_offset * fre::sqrt(1.0 - n_dot_l.clamp(0.0, 1.0))
    }
}

/// Returns the index of the cascade covering the given view-space depth
/// (distance along the camera's viewing direction). Depths beyond the last
/// split distance use the last cascade.
pub fn select_cascade(view_depth: fre, split_distances: &[fre]) -> usize {
    split_distances
        .iter()
        .position(|&split_distance| view_depth <= split_distance)
        .unwrap_or_else(|| split_distances.len().saturating_sub(1))
}

impl DepthMap {
    /// Creates a depth map where every texel holds the given depth.
    pub fn filled(width: u32, height: u32, depth: fre) -> Self {
        Self {
            width,
            height,
            depths: vec![depth; (width * height) as usize],
        }
    }

    pub fn set(&mut self, x: u32, y: u32, depth: fre) {
        self.depths[(y * self.width + x) as usize] = depth;
    }

    fn depth_clamped(&self, x: i64, y: i64) -> fre {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.depths[(y * self.width + x) as usize]
    }

    /// Compares the reference depth against the texel nearest to the given
    /// texture coordinates, offset by whole texels. Returns one if the
    /// reference is not farther than the stored depth.
    fn compare(&self, texture_coords: (fre, fre), texel_offset: (i32, i32), reference_depth: fre) -> fre {
        let x = (texture_coords.0 * self.width as fre).floor() as i64 + i64::from(texel_offset.0);
        let y = (texture_coords.1 * self.height as fre).floor() as i64 + i64::from(texel_offset.1);
        if reference_depth <= self.depth_clamped(x, y) {
            1.0
        } else {
            0.0
        }
    }

    /// Computes the fraction of the light reaching a point with the given
    /// shadow map texture coordinates and reference depth.
    pub fn visibility(&self, texture_coords: (fre, fre), reference_depth: fre, filter: ShadowFilter) -> fre {
        match filter {
            ShadowFilter::Raw => self.compare(texture_coords, (0, 0), reference_depth),
            ShadowFilter::Pcf => {
                let mut lit = 0.0;
                let mut count = 0.0;
                for dy in -PCF_KERNEL_RADIUS..=PCF_KERNEL_RADIUS {
                    for dx in -PCF_KERNEL_RADIUS..=PCF_KERNEL_RADIUS {
                        lit += self.compare(texture_coords, (dx, dy), reference_depth);
                        count += 1.0;
                    }
                }
                lit / count
            }
        }
    }
}

/// Computes the shadow visibility of a view-space position for a light whose
/// shadow map is rendered through the given view-to-light-clip transform, as
/// for spot lights and the cascades of directional lights.
///
/// Positions outside the shadow map's frustum are fully lit.
pub fn projected_shadow_visibility(
    kind: LightKind,
    view_to_light_clip: &Matrix4<fre>,
    shadow_map: &DepthMap,
    view_position: &Point3<fre>,
    normal: &Vector3<fre>,
    light_direction: &Vector3<fre>,
    filter: ShadowFilter,
) -> fre {
    let (texture_coords, depth) = project_to_texture_coords(view_to_light_clip, view_position);
    if !(0.0..=1.0).contains(&texture_coords.x)
        || !(0.0..=1.0).contains(&texture_coords.y)
        || !(0.0..=1.0).contains(&depth)
    {
        return 1.0;
    }
    let offset = ShadowOffset::for_light_kind(kind).compute(normal.dot(light_direction));
    shadow_map.visibility((texture_coords.x, texture_coords.y), depth - offset, filter)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn should_select_first_cascade_containing_depth() {
        let splits = [5.0, 20.0, 60.0, 200.0];
        assert_eq!(select_cascade(1.0, &splits), 0);
        assert_eq!(select_cascade(5.0, &splits), 0);
        assert_eq!(select_cascade(5.1, &splits), 1);
        assert_eq!(select_cascade(150.0, &splits), 3);
    }

    #[test]
    fn should_use_last_cascade_beyond_all_splits() {
        assert_eq!(select_cascade(1000.0, &[5.0, 20.0]), 1);
        assert_eq!(select_cascade(1000.0, &[]), 0);
    }

    #[test]
    fn should_increase_offset_for_grazing_angles() {
        let offset = ShadowOffset::for_light_kind(LightKind::Directional);
        assert_abs_diff_eq!(offset.compute(1.0), 1e-3);
        assert_abs_diff_eq!(offset.compute(0.0), 2e-3);
        assert_abs_diff_eq!(offset.compute(-1.0), 2e-3);
        assert!(offset.compute(0.5) > offset.compute(0.9));
    }

    #[test]
    fn should_light_point_in_front_of_occluder() {
        let map = DepthMap::filled(4, 4, 0.5);
        assert_eq!(map.visibility((0.5, 0.5), 0.4, ShadowFilter::Raw), 1.0);
        assert_eq!(map.visibility((0.5, 0.5), 0.6, ShadowFilter::Raw), 0.0);
    }

    #[test]
    fn should_give_fractional_visibility_at_shadow_edge_with_pcf() {
        let mut map = DepthMap::filled(8, 8, 1.0);
        for y in 0..8 {
            for x in 0..4 {
                map.set(x, y, 0.2);
            }
        }
        // Texel column 4 borders the occluded half
        let coords = (4.5 / 8.0, 4.5 / 8.0);
        assert_eq!(map.visibility(coords, 0.5, ShadowFilter::Raw), 1.0);
        assert_abs_diff_eq!(map.visibility(coords, 0.5, ShadowFilter::Pcf), 6.0 / 9.0);
    }

    #[test]
    fn should_treat_points_outside_shadow_frustum_as_lit() {
        let map = DepthMap::filled(2, 2, 0.0);
        let visibility = projected_shadow_visibility(
            LightKind::Spot,
            &Matrix4::identity(),
            &map,
            &Point3::new(3.0, 0.0, 0.5),
            &Vector3::z(),
            &Vector3::z(),
            ShadowFilter::Pcf,
        );
        assert_eq!(visibility, 1.0);
    }

    #[test]
    fn should_shadow_point_behind_occluder_in_light_frustum() {
        let map = DepthMap::filled(4, 4, 0.3);
        let visibility = projected_shadow_visibility(
            LightKind::Directional,
            &Matrix4::identity(),
            &map,
            &Point3::new(0.0, 0.0, 0.8),
            &Vector3::z(),
            &Vector3::z(),
            ShadowFilter::Raw,
        );
        assert_eq!(visibility, 0.0);
    }
}
