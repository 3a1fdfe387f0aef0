//! Shader template for the combine pass.

use crate::{
    combine::MIN_LINEAR_FOG_RANGE,
    config::{FogType, LightingConfig, MAX_ENVIRONMENT_MAP_COUNT},
    gpu::shader::template::{
        ShaderFlags, SpecificShaderTemplate, TemplateSource, resolve_common_source, wgsl_float,
    },
};
use anyhow::Result;

/// Shader template for the combine pass, which merges the accumulated light
/// with ambient and emissive light, optionally attenuated by ambient
/// occlusion, blends in reflected and refracted environment light and
/// applies fog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CombineShaderTemplate {
    ambient_occlusion: bool,
    environment_map_count: u32,
    fog_type: FogType,
}

impl CombineShaderTemplate {
    /// Creates a new combine template. The environment map count is limited
    /// to [`MAX_ENVIRONMENT_MAP_COUNT`], and zero maps disables reflection.
    pub fn new(ambient_occlusion: bool, environment_map_count: u32, fog_type: FogType) -> Self {
        Self {
            ambient_occlusion,
            environment_map_count: environment_map_count.min(MAX_ENVIRONMENT_MAP_COUNT),
            fog_type,
        }
    }

    pub fn for_config(config: &LightingConfig, ambient_occlusion: bool) -> Self {
        Self::new(
            ambient_occlusion,
            config.environment_map_count,
            config.fog.fog_type,
        )
    }

    pub fn ambient_occlusion(&self) -> bool {
        self.ambient_occlusion
    }

    pub fn environment_map_count(&self) -> u32 {
        self.environment_map_count
    }

    pub fn uses_reflection(&self) -> bool {
        self.environment_map_count > 0
    }
}

impl SpecificShaderTemplate for CombineShaderTemplate {
    fn source(&self) -> TemplateSource {
        TemplateSource::Combine
    }

    fn flags(&self) -> ShaderFlags {
        let mut flags = ShaderFlags::for_fog_type(self.fog_type);
        if self.ambient_occlusion {
            flags |= ShaderFlags::SSAO;
        }
        if self.uses_reflection() {
            flags |= ShaderFlags::REFLECTION;
        }
        flags
    }

    fn resolve(&self) -> Result<String> {
        let slots = 0..self.environment_map_count;

        let environment_map_bindings = slots
            .clone()
            .map(|slot| {
                format!(
                    "@group(3) @binding({}) var environment_map_{slot}: texture_cube<f32>;",
                    slot + 1
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let environment_map_cases = slots
            .map(|slot| {
                format!(
                    "        case {slot}u: {{ colour = textureSampleLevel(environment_map_{slot}, environment_sampler, direction, 0.0).rgb; }}"
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.source().template().resolve(
            &self.flags().template_flag_names(),
            shader_template_replacements!(
                "common" => resolve_common_source()?,
                "environment_map_bindings" => environment_map_bindings,
                "environment_map_cases" => environment_map_cases,
                "min_linear_fog_range" => wgsl_float(MIN_LINEAR_FOG_RANGE),
            ),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::gpu::shader::template::validate_template;

    const FOG_TYPES: [FogType; 4] = [
        FogType::Disabled,
        FogType::Linear,
        FogType::Exponential,
        FogType::SquaredExponential,
    ];

    #[test]
    fn should_resolve_to_valid_wgsl() {
        for ambient_occlusion in [false, true] {
            for environment_map_count in 0..=MAX_ENVIRONMENT_MAP_COUNT {
                for fog_type in FOG_TYPES {
                    validate_template(&CombineShaderTemplate::new(
                        ambient_occlusion,
                        environment_map_count,
                        fog_type,
                    ));
                }
            }
        }
    }

    #[test]
    fn should_limit_environment_map_count() {
        let template = CombineShaderTemplate::new(false, MAX_ENVIRONMENT_MAP_COUNT + 3, FogType::Disabled);
        assert_eq!(template.environment_map_count(), MAX_ENVIRONMENT_MAP_COUNT);
    }

    #[test]
    fn should_bind_one_cube_texture_per_environment_map() {
        let source = CombineShaderTemplate::new(true, 2, FogType::Linear)
            .resolve()
            .unwrap();
        assert_eq!(source.matches("texture_cube<f32>").count(), 2);
        assert!(source.contains("occlusion_texture"));

        let source = CombineShaderTemplate::new(false, 0, FogType::Disabled)
            .resolve()
            .unwrap();
        assert!(!source.contains("texture_cube"));
        assert!(!source.contains("occlusion_texture"));
    }
}
