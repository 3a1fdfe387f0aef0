//! Shader templates for the ambient occlusion passes.

use crate::{
    config::MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT,
    gpu::shader::template::{
        ShaderFlags, SpecificShaderTemplate, TemplateSource, resolve_common_source,
    },
    ssao::{BLUR_OFFSETS, BlurDirection, NOISE_TEXTURE_SIZE},
};
use anyhow::Result;

/// Shader template for the ambient occlusion computation pass, which
/// estimates the occlusion of ambient light at each covered pixel from the
/// G-buffer depth and normals and writes it to the occlusion attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AmbientOcclusionShaderTemplate;

/// Shader template for one direction of the separable box blur applied to
/// the raw occlusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AmbientOcclusionBlurShaderTemplate {
    direction: BlurDirection,
}

impl SpecificShaderTemplate for AmbientOcclusionShaderTemplate {
    fn source(&self) -> TemplateSource {
        TemplateSource::AmbientOcclusion
    }

    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn resolve(&self) -> Result<String> {
        self.source().template().resolve(
            &[],
            shader_template_replacements!(
                "common" => resolve_common_source()?,
                "max_sample_count" => MAX_AMBIENT_OCCLUSION_SAMPLE_COUNT,
                "noise_texture_size" => NOISE_TEXTURE_SIZE,
            ),
        )
    }
}

impl AmbientOcclusionBlurShaderTemplate {
    pub fn new(direction: BlurDirection) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> BlurDirection {
        self.direction
    }
}

impl SpecificShaderTemplate for AmbientOcclusionBlurShaderTemplate {
    fn source(&self) -> TemplateSource {
        TemplateSource::AmbientOcclusionBlur
    }

    fn flags(&self) -> ShaderFlags {
        match self.direction {
            BlurDirection::Horizontal => ShaderFlags::empty(),
            BlurDirection::Vertical => ShaderFlags::VERTICAL,
        }
    }

    fn resolve(&self) -> Result<String> {
        let blur_offsets = BLUR_OFFSETS
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        self.source().template().resolve(
            &self.flags().template_flag_names(),
            shader_template_replacements!(
                "common" => resolve_common_source()?,
                "blur_offset_count" => BLUR_OFFSETS.len(),
                "blur_offsets" => blur_offsets,
            ),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_to_valid_wgsl() {
        validate_template(&AmbientOcclusionShaderTemplate);
        validate_template(&AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Horizontal));
        validate_template(&AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Vertical));
    }

    #[test]
    fn should_blur_along_requested_axis() {
        let horizontal = AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Horizontal)
            .resolve()
            .unwrap();
        let vertical = AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Vertical)
            .resolve()
            .unwrap();
        assert!(horizontal.contains("vec2i(offsets[idx], 0)"));
        assert!(vertical.contains("vec2i(0, offsets[idx])"));
        assert!(horizontal.contains("array<i32, 4>(-2, -1, 0, 1)"));
    }
}
