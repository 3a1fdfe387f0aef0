//! Shader template for the light passes.

use crate::{
    config::ShadowFilter,
    gpu::shader::template::{
        ShaderFlags, SpecificShaderTemplate, TemplateSource, resolve_common_source, wgsl_float,
    },
    light::{LightKind, MAX_SHADOW_CASCADES, shading::MIN_COSINE_CUTOFF_DIFFERENCE},
    shadow::{PCF_KERNEL_RADIUS, POINT_PCF_OFFSET_DIRECTIONS, POINT_PCF_SPREAD, ShadowOffset},
};
use anyhow::Result;

/// Shader template for the light pass of one kind of light, which computes
/// the diffuse and specular light reflected off the G-buffer surfaces and
/// writes it to the two accumulation attachments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightPassShaderTemplate {
    kind: LightKind,
    shadowed: bool,
    filter: ShadowFilter,
}

impl LightPassShaderTemplate {
    /// Creates a new light pass template for the given kind of light. The
    /// shadow filter only has an effect when `shadowed` is `true`.
    pub fn new(kind: LightKind, shadowed: bool, filter: ShadowFilter) -> Self {
        Self {
            kind,
            shadowed,
            filter,
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn shadowed(&self) -> bool {
        self.shadowed
    }
}

impl SpecificShaderTemplate for LightPassShaderTemplate {
    fn source(&self) -> TemplateSource {
        TemplateSource::LightPass
    }

    fn flags(&self) -> ShaderFlags {
        let mut flags = ShaderFlags::for_light_kind(self.kind);
        if self.shadowed {
            flags |= ShaderFlags::SHADOWED;
            if self.filter == ShadowFilter::Pcf {
                flags |= ShaderFlags::PCF;
            }
        }
        flags
    }

    fn resolve(&self) -> Result<String> {
        let offset = ShadowOffset::for_light_kind(self.kind);

        let point_pcf_offset_directions = POINT_PCF_OFFSET_DIRECTIONS
            .iter()
            .map(|[x, y, z]| {
                format!(
                    "        vec3f({}, {}, {}),",
                    wgsl_float(*x),
                    wgsl_float(*y),
                    wgsl_float(*z)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.source().template().resolve(
            &self.flags().template_flag_names(),
            shader_template_replacements!(
                "common" => resolve_common_source()?,
                "shadow_min_offset" => wgsl_float(offset.min_offset),
                "shadow_max_slope_offset" => wgsl_float(offset.max_slope_offset),
                "pcf_kernel_radius" => PCF_KERNEL_RADIUS,
                "min_cosine_cutoff_difference" => wgsl_float(MIN_COSINE_CUTOFF_DIFFERENCE),
                "max_shadow_cascades" => MAX_SHADOW_CASCADES,
                "point_pcf_offset_count" => POINT_PCF_OFFSET_DIRECTIONS.len(),
                "point_pcf_offset_directions" => point_pcf_offset_directions,
                "point_pcf_spread" => wgsl_float(POINT_PCF_SPREAD),
            ),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpu::shader::template::validate_template;

    fn all_permutations() -> impl Iterator<Item = LightPassShaderTemplate> {
        LightKind::ALL.into_iter().flat_map(|kind| {
            [
                LightPassShaderTemplate::new(kind, false, ShadowFilter::Raw),
                LightPassShaderTemplate::new(kind, true, ShadowFilter::Raw),
                LightPassShaderTemplate::new(kind, true, ShadowFilter::Pcf),
            ]
        })
    }

    #[test]
    fn should_resolve_to_valid_wgsl() {
        for template in all_permutations() {
            validate_template(&template);
        }
    }

    #[test]
    fn should_ignore_filter_for_unshadowed_lights() {
        let raw = LightPassShaderTemplate::new(LightKind::Spot, false, ShadowFilter::Raw);
        let pcf = LightPassShaderTemplate::new(LightKind::Spot, false, ShadowFilter::Pcf);
        assert_eq!(raw.flags(), pcf.flags());
        assert_eq!(raw.flags(), ShaderFlags::SPOT);
    }

    #[test]
    fn should_give_distinct_permutation_keys() {
        let keys: std::collections::HashSet<_> =
            all_permutations().map(|template| template.permutation_key()).collect();
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn should_only_sample_shadow_map_when_shadowed() {
        let unshadowed = LightPassShaderTemplate::new(LightKind::Point, false, ShadowFilter::Pcf)
            .resolve()
            .unwrap();
        let shadowed = LightPassShaderTemplate::new(LightKind::Point, true, ShadowFilter::Pcf)
            .resolve()
            .unwrap();
        assert!(!unshadowed.contains("shadow_map"));
        assert!(shadowed.contains("texture_depth_cube"));
    }
}
