//! Reference evaluation of the light pass shading on the CPU.
//!
//! The functions here mirror the light pass shaders and are used to verify
//! rendered frames.

use crate::{
    camera::{Camera, pixel_center_texture_coords},
    fre,
    gbuffer::{GBufferImage, GBufferTexel},
    light::{LightKind, LightUniform},
};
use nalgebra::{Point3, Vector2, Vector3};
use std::ops::{Add, AddAssign};

pub const MIN_COSINE_CUTOFF_DIFFERENCE: fre = 1e-4;

/// Diffuse and specular light reaching the camera from one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightContribution {
    pub diffuse: Vector3<fre>,
    pub specular: Vector3<fre>,
}

/// CPU counterpart of the light accumulation buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightAccumulation {
    width: u32,
    height: u32,
    contributions: Vec<LightContribution>,
}

impl LightContribution {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.diffuse == Vector3::zeros() && self.specular == Vector3::zeros()
    }

    /// Largest channel value of the combined diffuse and specular light.
    pub fn max_channel(&self) -> fre {
        self.diffuse.max().max(self.specular.max())
    }
}

impl Add for LightContribution {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            diffuse: self.diffuse + rhs.diffuse,
            specular: self.specular + rhs.specular,
        }
    }
}

impl AddAssign for LightContribution {
    fn add_assign(&mut self, rhs: Self) {
        self.diffuse += rhs.diffuse;
        self.specular += rhs.specular;
    }
}

impl LightAccumulation {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            contributions: vec![LightContribution::zero(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contributions(&self) -> &[LightContribution] {
        &self.contributions
    }

    pub fn get(&self, x: u32, y: u32) -> &LightContribution {
        &self.contributions[(y * self.width + x) as usize]
    }

    /// Accumulates one light. `contribution` is evaluated for every pixel and
    /// returns [`None`] for pixels the light's draw does not cover. The first
    /// light of a frame clears the buffer and replaces the covered pixels,
    /// later lights add to them.
    pub fn render_light(
        &mut self,
        first: bool,
        mut contribution: impl FnMut(u32, u32) -> Option<LightContribution>,
    ) {
        if first {
            self.contributions.fill(LightContribution::zero());
        }
        let width = self.width;
        for (idx, accumulated) in self.contributions.iter_mut().enumerate() {
            let (x, y) = (idx as u32 % width, idx as u32 / width);
            if let Some(contribution) = contribution(x, y) {
                if first {
                    *accumulated = contribution;
                } else {
                    *accumulated += contribution;
                }
            }
        }
    }
}

/// Computes the spot light falloff for a direction whose angle from the cone
/// axis has the given cosine. The falloff is one inside the inner cutoff,
/// zero outside the outer cutoff and decreases smoothly in between.
pub fn spot_falloff(cos_angle: fre, cos_inner_cutoff: fre, cos_outer_cutoff: fre, exponent: fre) -> fre {
    let t = ((cos_angle - cos_outer_cutoff)
        / (cos_inner_cutoff - cos_outer_cutoff).max(MIN_COSINE_CUTOFF_DIFFERENCE))
    .clamp(0.0, 1.0);
    if t <= 0.0 { 0.0 } else { fre::powf(t, exponent) }
}

/// Normalizes the vector, or returns zero if it has no length.
pub fn safe_normalize(vector: &Vector3<fre>) -> Vector3<fre> {
    let norm = vector.norm();
    if norm > 1e-8 {
        vector / norm
    } else {
        Vector3::zeros()
    }
}

/// Evaluates the contribution of a light to the pixel holding `texel` with
/// the given view-space position. `visibility` is the shadow factor, one for
/// unshadowed lights.
pub fn shade_texel(
    kind: LightKind,
    light: &LightUniform,
    texel: &GBufferTexel,
    view_position: &Point3<fre>,
    visibility: fre,
) -> LightContribution {
    let (light_direction, attenuation) = match kind {
        LightKind::Directional => (safe_normalize(&-light.view_direction), 1.0),
        LightKind::Point | LightKind::Spot => {
            let to_light = light.view_position - view_position.coords;
            let distance = to_light.norm();
            if distance > light.max_distance {
                return LightContribution::zero();
            }
            let light_direction = safe_normalize(&to_light);
            let mut attenuation = 1.0
                / (light.attenuation.x
                    + light.attenuation.y * distance
                    + light.attenuation.z * distance * distance)
                    .max(1e-6);
            if kind == LightKind::Spot {
                let cos_angle = -light_direction.dot(&safe_normalize(&light.view_direction));
                attenuation *= spot_falloff(
                    cos_angle,
                    light.cos_inner_cutoff,
                    light.cos_outer_cutoff,
                    light.falloff_exponent,
                );
            }
            (light_direction, attenuation)
        }
    };

    let normal = safe_normalize(&texel.normal);
    let view_direction = safe_normalize(&-view_position.coords);

    let n_dot_l = normal.dot(&light_direction).max(0.0);
    if n_dot_l <= 0.0 {
        return LightContribution::zero();
    }

    let half_vector = safe_normalize(&(light_direction + view_direction));
    let n_dot_h = normal.dot(&half_vector).max(0.0);
    let shininess = texel.shininess.max(1.0);

    let scale = attenuation * visibility;
    LightContribution {
        diffuse: (light.colour * (light.diffuse_intensity * n_dot_l * scale))
            .component_mul(&texel.albedo),
        specular: (light.colour * (light.specular_intensity * fre::powf(n_dot_h, shininess) * scale))
            .component_mul(&texel.specular),
    }
}

/// Evaluates a light for every covered pixel of the geometry buffer image.
/// Pixels without geometry receive [`None`].
pub fn shade_image(
    kind: LightKind,
    light: &LightUniform,
    gbuffer: &GBufferImage,
    camera: &Camera,
    mut visibility: impl FnMut(&GBufferTexel, &Point3<fre>) -> fre,
) -> Vec<Option<LightContribution>> {
    let screen_size = Vector2::new(gbuffer.width() as fre, gbuffer.height() as fre);
    gbuffer
        .pixels()
        .map(|(pixel, texel)| {
            texel.is_covered().then(|| {
                let texture_coords = pixel_center_texture_coords(pixel, screen_size);
                let view_position = camera.reconstruct_view_position(&texture_coords, texel.depth);
                let visibility = visibility(texel, &view_position);
                shade_texel(kind, light, texel, &view_position, visibility)
            })
        })
        .collect()
}
