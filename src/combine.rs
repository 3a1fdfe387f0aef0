//! Composition of accumulated light, ambient light, environment maps and
//! fog into the final colour.

use crate::{
    config::{FogConfig, FogType, FresnelConfig, LightingConfig},
    fre,
    gbuffer::GBufferTexel,
    light::shading::{LightContribution, safe_normalize},
};
use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};

/// Smallest distance between the start and end of linear fog.
pub const MIN_LINEAR_FOG_RANGE: fre = 1e-4;

/// Uniform holding the parameters of the combine pass.
///
/// The size of this struct has to be a multiple of 16 bytes as required for
/// uniforms.
#[repr(C)]
#[derive(Copy, Clone, Debug, Zeroable, Pod)]
pub struct CombineUniform {
    fog_colour: Vector3<fre>,
    fog_density: fre,
    background_colour: Vector3<fre>,
    fog_start_distance: fre,
    fog_end_distance: fre,
    fresnel_bias: fre,
    fresnel_scale: fre,
    fresnel_power: fre,
    environment_map_count: u32,
    _padding: [u32; 3],
}

assert_uniform_valid!(CombineUniform);

impl CombineUniform {
    pub fn new(config: &LightingConfig) -> Self {
        Self {
            fog_colour: config.fog.colour,
            fog_density: config.fog.density,
            background_colour: config.background_colour,
            fog_start_distance: config.fog.start_distance,
            fog_end_distance: config.fog.end_distance,
            fresnel_bias: config.fresnel.bias,
            fresnel_scale: config.fresnel.scale,
            fresnel_power: config.fresnel.power,
            environment_map_count: config.environment_map_count,
            _padding: [0; 3],
        }
    }
}

/// Computes the factor blending refracted towards reflected light for the
/// given incident direction (from the camera towards the surface) and
/// surface normal. The result always lies in `[0, 1]`.
pub fn fresnel_factor(incident: &Vector3<fre>, normal: &Vector3<fre>, config: &FresnelConfig) -> fre {
    let base = (1.0 + incident.dot(normal)).max(0.0);
    let factor = config.bias + config.scale * fre::powf(base, config.power);
    if factor.is_nan() {
        0.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}

/// Computes the fraction of the surface colour remaining after fog at the
/// given view-space distance. One means no fog.
pub fn fog_factor(config: &FogConfig, distance: fre) -> fre {
    match config.fog_type {
        FogType::Disabled => 1.0,
        FogType::Linear => ((config.end_distance - distance)
            / (config.end_distance - config.start_distance).max(MIN_LINEAR_FOG_RANGE))
        .clamp(0.0, 1.0),
        FogType::Exponential => fre::exp(-config.density * distance),
        FogType::SquaredExponential => {
            let scaled_distance = config.density * distance;
            fre::exp(-scaled_distance * scaled_distance)
        }
    }
}

/// Blends the colour towards the fog colour according to the view-space
/// distance.
pub fn apply_fog(config: &FogConfig, colour: &Vector3<fre>, distance: fre) -> Vector3<fre> {
    let factor = fog_factor(config, distance);
    config.colour.lerp(colour, factor)
}

/// Returns the environment map slot to sample for the given encoded index,
/// clamping indices beyond the available slots to the last one. Returns
/// [`None`] if the index is zero or there are no slots.
pub fn environment_map_slot(environment_map_index: u8, environment_map_count: u32) -> Option<u32> {
    if environment_map_index == 0 || environment_map_count == 0 {
        None
    } else {
        Some((u32::from(environment_map_index) - 1).min(environment_map_count - 1))
    }
}

/// Reflects the incident direction about the normal.
pub fn reflect(incident: &Vector3<fre>, normal: &Vector3<fre>) -> Vector3<fre> {
    incident - normal * (2.0 * normal.dot(incident))
}

/// Refracts the incident direction through a surface with the given ratio of
/// refractive indices. Returns zero on total internal reflection.
pub fn refract(incident: &Vector3<fre>, normal: &Vector3<fre>, ratio: fre) -> Vector3<fre> {
    let cos_incident = normal.dot(incident);
    let k = 1.0 - ratio * ratio * (1.0 - cos_incident * cos_incident);
    if k < 0.0 {
        Vector3::zeros()
    } else {
        incident * ratio - normal * (ratio * cos_incident + fre::sqrt(k))
    }
}

/// Computes the final colour of one pixel.
///
/// `light` is the accumulated light of the pixel and `ambient_occlusion` the
/// blurred screen-space occlusion (one when ambient occlusion is disabled).
/// `environment` samples environment map `slot` in the given view-space
/// direction.
pub fn combine_pixel(
    config: &LightingConfig,
    texel: &GBufferTexel,
    view_position: &Point3<fre>,
    light: &LightContribution,
    ambient_occlusion: fre,
    environment: &dyn Fn(u32, &Vector3<fre>) -> Vector3<fre>,
) -> Vector3<fre> {
    if !texel.is_covered() {
        return config.background_colour;
    }

    let occlusion = texel.occlusion * ambient_occlusion;
    let albedo = texel.albedo;
    let ambient = (config.scene_ambient_colour + texel.ambient.component_mul(&albedo))
        .map(|channel| channel.clamp(0.0, 1.0));

    let flags = texel.flags;
    let slot = if flags.uses_environment_map() {
        environment_map_slot(flags.environment_map_index, config.environment_map_count)
    } else {
        None
    };

    let (diffuse_term, ambient_term) = match slot {
        Some(slot) => {
            let normal = safe_normalize(&texel.normal);
            let incident = safe_normalize(&view_position.coords);
            let reflected = || environment(slot, &reflect(&incident, &normal));
            let refracted = || {
                let direction = refract(&incident, &normal, texel.refraction_ratio);
                if direction == Vector3::zeros() {
                    environment(slot, &reflect(&incident, &normal))
                } else {
                    environment(slot, &direction)
                }
            };
            match (flags.reflection, flags.refraction) {
                (true, true) => {
                    let fresnel = fresnel_factor(&incident, &normal, &config.fresnel);
                    let blended = refracted().lerp(&reflected(), fresnel);
                    (Vector3::zeros(), blended.component_mul(&albedo) * occlusion)
                }
                (true, false) => (reflected().component_mul(&albedo) * occlusion, Vector3::zeros()),
                _ => (Vector3::zeros(), refracted().component_mul(&albedo) * occlusion),
            }
        }
        None => (light.diffuse, ambient.component_mul(&albedo) * occlusion),
    };

    let colour = diffuse_term + light.specular + texel.emissive + ambient_term;
    apply_fog(&config.fog, &colour, view_position.coords.norm())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        camera::{Camera, pixel_center_texture_coords},
        config::AmbientOcclusionConfig,
        gbuffer::{GBufferImage, MaterialFlags},
        ssao::{SsaoKernel, compute_occlusion},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Vector2};
    use proptest::prelude::*;

    fn black_environment(_: u32, _: &Vector3<fre>) -> Vector3<fre> {
        Vector3::zeros()
    }

    fn lit_texel() -> GBufferTexel {
        GBufferTexel {
            ambient: Vector3::new(0.4, 0.4, 0.4),
            occlusion: 0.8,
            ..GBufferTexel::diffuse(0.5, Vector3::z(), Vector3::new(0.5, 0.25, 1.0))
        }
    }

    fn light() -> LightContribution {
        LightContribution {
            diffuse: Vector3::new(0.3, 0.2, 0.1),
            specular: Vector3::new(0.05, 0.05, 0.05),
        }
    }

    proptest! {
        #[test]
        fn should_keep_fresnel_factor_within_unit_interval(
            ix in -10.0_f32..10.0, iy in -10.0_f32..10.0, iz in -10.0_f32..10.0,
            nx in -10.0_f32..10.0, ny in -10.0_f32..10.0, nz in -10.0_f32..10.0,
            bias in -5.0_f32..5.0, scale in -5.0_f32..5.0, power in 0.0_f32..8.0,
        ) {
            let config = FresnelConfig { bias, scale, power };
            let factor = fresnel_factor(&Vector3::new(ix, iy, iz), &Vector3::new(nx, ny, nz), &config);
            prop_assert!((0.0..=1.0).contains(&factor));
        }
    }

    #[test]
    fn should_give_same_colour_with_disabled_and_unoccluding_ambient_occlusion() {
        let disabled = LightingConfig {
            ambient_occlusion: AmbientOcclusionConfig {
                enabled: false,
                ..AmbientOcclusionConfig::default()
            },
            scene_ambient_colour: Vector3::new(0.1, 0.1, 0.1),
            ..LightingConfig::default()
        };
        let enabled = LightingConfig {
            ambient_occlusion: AmbientOcclusionConfig::default(),
            ..disabled.clone()
        };

        // No kernel sample is occluded on a flat wall facing the camera
        let camera = Camera::perspective(Isometry3::identity(), 1.0, 1.0, 0.1, 100.0);
        let depth = camera.project_to_texture_coords(&Point3::new(0.0, 0.0, -3.0)).1;
        let texel = GBufferTexel {
            depth,
            ..lit_texel()
        };
        let gbuffer = GBufferImage::filled(8, 8, texel.clone());
        let kernel = SsaoKernel::from_config(&enabled.ambient_occlusion).unwrap();
        let occlusion =
            compute_occlusion(&gbuffer, &camera, &kernel, &enabled.ambient_occlusion).box_blurred();

        let position = camera.reconstruct_view_position(
            &pixel_center_texture_coords((3, 4), Vector2::new(8.0, 8.0)),
            depth,
        );
        let without = combine_pixel(&disabled, &texel, &position, &light(), 1.0, &black_environment);
        let with = combine_pixel(
            &enabled,
            &texel,
            &position,
            &light(),
            occlusion.get(3, 4),
            &black_environment,
        );
        assert_abs_diff_eq!(without, with, epsilon = 1e-6);
    }

    #[test]
    fn should_sum_light_emission_and_occluded_ambient_for_plain_surface() {
        let config = LightingConfig {
            scene_ambient_colour: Vector3::new(0.1, 0.1, 0.1),
            ..LightingConfig::default()
        };
        let texel = lit_texel();
        let colour = combine_pixel(&config, &texel, &Point3::new(0.0, 0.0, -3.0), &light(), 0.5, &black_environment);

        let ambient = Vector3::new(0.1, 0.1, 0.1) + texel.ambient.component_mul(&texel.albedo);
        let expected = light().diffuse + light().specular + ambient.component_mul(&texel.albedo) * (0.8 * 0.5);
        assert_abs_diff_eq!(colour, expected, epsilon = 1e-6);
    }

    #[test]
    fn should_use_background_colour_for_uncovered_pixels() {
        let config = LightingConfig {
            background_colour: Vector3::new(0.2, 0.3, 0.4),
            ..LightingConfig::default()
        };
        let colour = combine_pixel(
            &config,
            &GBufferTexel::default(),
            &Point3::new(0.0, 0.0, -100.0),
            &light(),
            1.0,
            &black_environment,
        );
        assert_eq!(colour, config.background_colour);
    }

    #[test]
    fn should_replace_diffuse_light_with_reflection_for_reflective_pixel() {
        let config = LightingConfig {
            environment_map_count: 1,
            ..LightingConfig::default()
        };
        let texel = GBufferTexel {
            flags: MaterialFlags::new(false, true, false, 1),
            occlusion: 1.0,
            ..lit_texel()
        };
        let environment = |slot: u32, _: &Vector3<fre>| {
            assert_eq!(slot, 0);
            Vector3::new(1.0, 1.0, 1.0)
        };
        let colour = combine_pixel(&config, &texel, &Point3::new(0.0, 0.0, -3.0), &light(), 1.0, &environment);
        assert_abs_diff_eq!(colour, texel.albedo + light().specular, epsilon = 1e-6);
    }

    #[test]
    fn should_blend_reflection_and_refraction_with_fresnel_factor() {
        let config = LightingConfig {
            environment_map_count: 2,
            fresnel: FresnelConfig {
                bias: 0.25,
                scale: 0.0,
                power: 1.0,
            },
            ..LightingConfig::default()
        };
        let texel = GBufferTexel {
            flags: MaterialFlags::new(false, true, true, 2),
            occlusion: 1.0,
            albedo: Vector3::new(1.0, 1.0, 1.0),
            refraction_ratio: 1.0,
            ..lit_texel()
        };
        // Refraction with unit ratio keeps the incident direction
        let environment = |_: u32, direction: &Vector3<fre>| {
            if direction.z < 0.0 {
                Vector3::new(0.0, 1.0, 0.0)
            } else {
                Vector3::new(1.0, 0.0, 0.0)
            }
        };
        let colour = combine_pixel(&config, &texel, &Point3::new(0.0, 0.0, -3.0), &light(), 1.0, &environment);
        assert_abs_diff_eq!(
            colour,
            Vector3::new(0.25, 0.75, 0.0) + light().specular,
            epsilon = 1e-6
        );
    }

    #[test]
    fn should_ignore_environment_flags_without_configured_maps() {
        let config = LightingConfig::default();
        let texel = GBufferTexel {
            flags: MaterialFlags::new(false, true, false, 3),
            ..lit_texel()
        };
        let plain = combine_pixel(&config, &lit_texel(), &Point3::new(0.0, 0.0, -3.0), &light(), 1.0, &black_environment);
        let flagged = combine_pixel(&config, &texel, &Point3::new(0.0, 0.0, -3.0), &light(), 1.0, &black_environment);
        assert_eq!(plain, flagged);
    }

    #[test]
    fn should_clamp_environment_map_slot_to_available_maps() {
        assert_eq!(environment_map_slot(0, 4), None);
        assert_eq!(environment_map_slot(3, 0), None);
        assert_eq!(environment_map_slot(1, 4), Some(0));
        assert_eq!(environment_map_slot(9, 4), Some(3));
    }

    #[test]
    fn should_compute_fog_factors() {
        let mut fog = FogConfig {
            fog_type: FogType::Linear,
            start_distance: 10.0,
            end_distance: 20.0,
            ..FogConfig::default()
        };
        assert_eq!(fog_factor(&fog, 5.0), 1.0);
        assert_abs_diff_eq!(fog_factor(&fog, 15.0), 0.5);
        assert_eq!(fog_factor(&fog, 30.0), 0.0);

        fog.fog_type = FogType::Exponential;
        fog.density = 0.1;
        assert_abs_diff_eq!(fog_factor(&fog, 10.0), fre::exp(-1.0));

        fog.fog_type = FogType::SquaredExponential;
        assert_abs_diff_eq!(fog_factor(&fog, 20.0), fre::exp(-4.0));

        fog.fog_type = FogType::Disabled;
        assert_eq!(fog_factor(&fog, 1e6), 1.0);
    }

    #[test]
    fn should_blend_towards_fog_colour_with_distance() {
        let fog = FogConfig {
            fog_type: FogType::Linear,
            colour: Vector3::new(1.0, 1.0, 1.0),
            start_distance: 0.0,
            end_distance: 10.0,
            density: 0.0,
        };
        let colour = apply_fog(&fog, &Vector3::zeros(), 7.5);
        assert_abs_diff_eq!(colour, Vector3::new(0.75, 0.75, 0.75), epsilon = 1e-6);
    }

    #[test]
    fn should_give_zero_refraction_on_total_internal_reflection() {
        let incident = Vector3::new(1.0, 0.0, -0.1).normalize();
        assert_eq!(refract(&incident, &Vector3::z(), 1.5), Vector3::zeros());
        assert_abs_diff_eq!(
            reflect(&Vector3::new(1.0, 0.0, -1.0), &Vector3::z()),
            Vector3::new(1.0, 0.0, 1.0)
        );
    }
}
