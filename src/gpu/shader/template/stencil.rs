//! Shader template for the stencil volume pass.

use crate::gpu::shader::template::{
    ShaderFlags, SpecificShaderTemplate, TemplateSource, resolve_common_source,
};
use anyhow::Result;

/// Shader template for the stencil volume pass, which rasterizes a light's
/// bounding volume without writing colour so that only the depth-stencil
/// state marks the pixels inside the volume. Also provides the full-screen
/// vertex entry point used to reset the stencil buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilShaderTemplate;

impl StencilShaderTemplate {
    pub const VOLUME_VERTEX_ENTRY_POINT: &'static str = "volume_vertex_main";
    pub const CLEAR_VERTEX_ENTRY_POINT: &'static str = "clear_vertex_main";
}

impl SpecificShaderTemplate for StencilShaderTemplate {
    fn source(&self) -> TemplateSource {
        TemplateSource::Stencil
    }

    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn resolve(&self) -> Result<String> {
        self.source().template().resolve(
            &[],
            shader_template_replacements!("common" => resolve_common_source()?),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_to_valid_wgsl() {
        validate_template(&StencilShaderTemplate);
    }

    #[test]
    fn should_have_both_vertex_entry_points() {
        let source = StencilShaderTemplate.resolve().unwrap();
        let module = naga::front::wgsl::parse_str(&source).unwrap();
        let names: Vec<_> = module.entry_points.iter().map(|entry| entry.name.as_str()).collect();
        assert!(names.contains(&StencilShaderTemplate::VOLUME_VERTEX_ENTRY_POINT));
        assert!(names.contains(&StencilShaderTemplate::CLEAR_VERTEX_ENTRY_POINT));
    }
}
