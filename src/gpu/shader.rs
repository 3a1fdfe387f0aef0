//! Graphics shaders.

pub mod template;

use crate::{error::LightingError, gpu::GraphicsDevice};
use anyhow::Result;
use naga::{Module, ShaderStage};
use std::{
    borrow::Cow,
    collections::{HashMap, hash_map::Entry},
};
use template::{ShaderPermutationKey, SpecificShaderTemplate};

/// A graphics shader program.
#[derive(Debug)]
pub struct Shader {
    module: wgpu::ShaderModule,
    entry_points: Vec<(ShaderStage, String)>,
    source_code: Option<String>,
}

/// Cache of the shader permutations that have been compiled, keyed by the
/// template and flags they were resolved from.
#[derive(Debug, Default)]
pub struct ShaderPermutationCache {
    shaders: HashMap<ShaderPermutationKey, Shader>,
}

impl Shader {
    /// Resolves the given template and creates a shader from the resulting
    /// source code.
    ///
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`] if the template can not be
    /// resolved or the resolved source fails to compile.
    pub fn from_template(
        graphics_device: &GraphicsDevice,
        template: &impl SpecificShaderTemplate,
    ) -> Result<Self> {
        let label = template.label();
        let source = template
            .resolve()
            .map_err(|err| LightingError::shader_build(label.clone(), format!("{err:#}")))?;
        Self::from_wgsl_source(graphics_device, source, &label)
    }

    /// Creates a new shader by reading the source from the given WGSL string.
    /// The source is parsed and validated before it is handed to the device.
    ///
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`] if the source can not be
    /// parsed or validated, or if the device rejects the module.
    pub fn from_wgsl_source(
        graphics_device: &GraphicsDevice,
        source: String,
        label: &str,
    ) -> Result<Self> {
        let naga_module = naga::front::wgsl::parse_str(&source).map_err(|err| {
            LightingError::shader_build(label.to_string(), err.emit_to_string(&source))
        })?;

        Self::validate_naga_module(&naga_module, &source, label)?;

        Self::from_naga_module(graphics_device, naga_module, label, Some(source))
    }

    /// Creates a new shader from the given [`Module`].
    ///
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`] if the device rejects the
    /// module.
    pub fn from_naga_module(
        graphics_device: &GraphicsDevice,
        naga_module: Module,
        label: &str,
        source_code: Option<String>,
    ) -> Result<Self> {
        let entry_points = naga_module
            .entry_points
            .iter()
            .map(|entry_point| (entry_point.stage, entry_point.name.clone()))
            .collect();

        let module = graphics_device.build_shader_object(label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
                label: Some(label),
            })
        })?;

        Ok(Self {
            module,
            entry_points,
            source_code,
        })
    }

    /// Returns a reference to the compiled shader module.
    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }

    /// Returns the name of the first entry point for the given stage, if
    /// any.
    pub fn entry_point_name(&self, stage: ShaderStage) -> Option<&str> {
        self.entry_points
            .iter()
            .find(|(entry_stage, _)| *entry_stage == stage)
            .map(|(_, name)| name.as_str())
    }

    pub fn vertex_entry_point_name(&self) -> Option<&str> {
        self.entry_point_name(ShaderStage::Vertex)
    }

    pub fn fragment_entry_point_name(&self) -> Option<&str> {
        self.entry_point_name(ShaderStage::Fragment)
    }

    /// Returns the WGSL source code of the shader, if it was created from
    /// source.
    pub fn source_code(&self) -> Option<&str> {
        self.source_code.as_deref()
    }

    fn validate_naga_module(module: &Module, source: &str, label: &str) -> Result<()> {
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        );
        validator.validate(module).map_err(|err| {
            LightingError::shader_build(label.to_string(), err.emit_to_string(source))
        })?;
        Ok(())
    }
}

impl ShaderPermutationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shader for the given template, compiling it if this
    /// permutation has not been requested before.
    ///
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`] if the shader must be compiled
    /// and compilation fails. Failed permutations are not cached.
    pub fn obtain_shader(
        &mut self,
        graphics_device: &GraphicsDevice,
        template: &impl SpecificShaderTemplate,
    ) -> Result<&Shader> {
        match self.shaders.entry(template.permutation_key()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let shader = with_debug_logging!(
                    "Compiling shader permutation {}", template.label();
                    Shader::from_template(graphics_device, template)
                )?;
                Ok(entry.insert(shader))
            }
        }
    }

    /// Number of compiled permutations.
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
