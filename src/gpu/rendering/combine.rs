//! Final combination of accumulated light, ambient light, environment
//! reflections and fog into the output texture.

use super::{FrameBindGroups, SharedBindGroupLayouts};
use crate::{
    combine::CombineUniform,
    config::LightingConfig,
    error::LightingError,
    gpu::{
        GraphicsDevice,
        shader::{
            ShaderPermutationCache,
            template::{SpecificShaderTemplate, combine::CombineShaderTemplate},
        },
        texture::{
            self, AccumulationTextures, OUTPUT_FORMAT, Texture2D,
            create_sampler_bind_group_layout_entry, create_texture_bind_group_layout_entry,
        },
        uniform::SingleUniformGPUBuffer,
    },
};
use anyhow::Result;

const ACCUMULATED_DIFFUSE_BINDING: u32 = 0;
const ACCUMULATED_SPECULAR_BINDING: u32 = 1;
const UNIFORM_BINDING: u32 = 2;
const OCCLUSION_BINDING: u32 = 3;

const ENVIRONMENT_SAMPLER_BINDING: u32 = 0;

/// GPU resources for the combine pass. The pipeline is built for one
/// shader permutation, determined by whether ambient occlusion is applied,
/// how many environment map slots are configured and the fog type.
#[derive(Debug)]
pub struct CombinePass {
    template: CombineShaderTemplate,
    uniform: SingleUniformGPUBuffer<CombineUniform>,
    inputs_layout: wgpu::BindGroupLayout,
    environment_layout: Option<wgpu::BindGroupLayout>,
    environment_sampler: wgpu::Sampler,
    fallback_environment_map: Texture2D,
    pipeline: wgpu::RenderPipeline,
    output: Texture2D,
}

impl CombinePass {
    /// # Errors
    /// Returns an error if a resource can not be allocated or the shader
    /// permutation can not be built.
    pub fn new(
        graphics_device: &GraphicsDevice,
        shader_cache: &mut ShaderPermutationCache,
        layouts: &SharedBindGroupLayouts,
        config: &LightingConfig,
        ambient_occlusion: bool,
        (width, height): (u32, u32),
    ) -> Result<Self> {
        let template = CombineShaderTemplate::for_config(config, ambient_occlusion);
        let uniform =
            SingleUniformGPUBuffer::new(graphics_device, &CombineUniform::new(config), "Combine uniform")?;
        let output = texture::create_output_texture(graphics_device, width, height)?;
        let fallback_environment_map = texture::create_fallback_environment_map(graphics_device)?;

        let device = graphics_device.device();

        let inputs_layout = create_inputs_bind_group_layout(device, ambient_occlusion);
        let environment_layout = template
            .uses_reflection()
            .then(|| create_environment_bind_group_layout(device, template.environment_map_count()));

        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            label: Some("Environment map sampler"),
            ..Default::default()
        });

        let mut bind_group_layouts = vec![&layouts.frame, &layouts.gbuffer, &inputs_layout];
        if let Some(environment_layout) = &environment_layout {
            bind_group_layouts.push(environment_layout);
        }
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
            label: Some("Combine pipeline layout"),
        });

        let shader = shader_cache.obtain_shader(graphics_device, &template)?;
        let pipeline = graphics_device.build_shader_object("Combine pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader.module(),
                    entry_point: shader.vertex_entry_point_name(),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader.module(),
                    entry_point: shader.fragment_entry_point_name(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: OUTPUT_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
                label: Some("Combine pipeline"),
            })
        })?;

        log::info!("Built combine pass for {}", template.label());

        Ok(Self {
            template,
            uniform,
            inputs_layout,
            environment_layout,
            environment_sampler,
            fallback_environment_map,
            pipeline,
            output,
        })
    }

    pub fn template(&self) -> &CombineShaderTemplate {
        &self.template
    }

    pub fn output(&self) -> &Texture2D {
        &self.output
    }

    /// Uploads fog, Fresnel and background parameters from the given
    /// configuration. Changes to the fog type, environment map count or
    /// ambient occlusion require rebuilding the pass.
    pub fn update_config(&self, graphics_device: &GraphicsDevice, config: &LightingConfig) {
        self.uniform.update(graphics_device, &CombineUniform::new(config));
    }

    /// Creates the bind group with the accumulated light, the uniform and,
    /// when the pass applies ambient occlusion, the blurred occlusion.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if an occlusion texture
    /// is given to a pass without ambient occlusion or missing for a pass
    /// with it.
    pub fn create_inputs_bind_group(
        &self,
        device: &wgpu::Device,
        accumulation: &AccumulationTextures,
        occlusion: Option<&Texture2D>,
    ) -> Result<wgpu::BindGroup> {
        let mut entries = vec![
            accumulation
                .diffuse
                .create_bind_group_entry(ACCUMULATED_DIFFUSE_BINDING),
            accumulation
                .specular
                .create_bind_group_entry(ACCUMULATED_SPECULAR_BINDING),
            self.uniform.create_bind_group_entry(UNIFORM_BINDING),
        ];

        match (self.template.ambient_occlusion(), occlusion) {
            (true, Some(occlusion)) => {
                entries.push(occlusion.create_bind_group_entry(OCCLUSION_BINDING));
            }
            (false, None) => {}
            (expected, _) => {
                return Err(LightingError::contract_violation(format!(
                    "combine pass {} ambient occlusion input",
                    if expected { "requires" } else { "does not take" }
                ))
                .into());
            }
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.inputs_layout,
            entries: &entries,
            label: Some("Combine inputs bind group"),
        }))
    }

    /// Creates the bind group with the environment maps for each configured
    /// slot, or [`None`] if the pass does not use reflection. Slots without
    /// a map get a black fallback map and maps beyond the configured slots
    /// are ignored.
    pub fn create_environment_bind_group(
        &self,
        device: &wgpu::Device,
        environment_maps: &[&wgpu::TextureView],
    ) -> Option<wgpu::BindGroup> {
        let layout = self.environment_layout.as_ref()?;
        let slot_count = self.template.environment_map_count() as usize;

        if environment_maps.len() != slot_count {
            log::warn!(
                "Got {} environment maps for {} configured slots",
                environment_maps.len(),
                slot_count
            );
        }

        let mut entries = Vec::with_capacity(slot_count + 1);
        entries.push(wgpu::BindGroupEntry {
            binding: ENVIRONMENT_SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.environment_sampler),
        });
        for slot in 0..slot_count {
            let view = environment_maps
                .get(slot)
                .copied()
                .unwrap_or_else(|| self.fallback_environment_map.view());
            entries.push(wgpu::BindGroupEntry {
                binding: environment_map_binding(slot as u32),
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &entries,
            label: Some("Environment map bind group"),
        }))
    }

    /// Records the combine pass into the output texture.
    pub fn record(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        bind_groups: &FrameBindGroups<'_>,
        inputs_bind_group: &wgpu::BindGroup,
        environment_bind_group: Option<&wgpu::BindGroup>,
    ) {
        let mut render_pass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.output.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Combine pass"),
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_groups.frame, &[]);
        render_pass.set_bind_group(1, bind_groups.gbuffer, &[]);
        render_pass.set_bind_group(2, inputs_bind_group, &[]);
        if let Some(environment_bind_group) = environment_bind_group {
            render_pass.set_bind_group(3, environment_bind_group, &[]);
        }
        render_pass.draw(0..6, 0..1);
    }
}

/// Binding of the environment map in the given slot.
fn environment_map_binding(slot: u32) -> u32 {
    ENVIRONMENT_SAMPLER_BINDING + 1 + slot
}

fn create_inputs_bind_group_layout(
    device: &wgpu::Device,
    ambient_occlusion: bool,
) -> wgpu::BindGroupLayout {
    let texture_entry = |binding| {
        create_texture_bind_group_layout_entry(
            binding,
            wgpu::ShaderStages::FRAGMENT,
            wgpu::TextureSampleType::Float { filterable: false },
            wgpu::TextureViewDimension::D2,
        )
    };

    let mut entries = vec![
        texture_entry(ACCUMULATED_DIFFUSE_BINDING),
        texture_entry(ACCUMULATED_SPECULAR_BINDING),
        SingleUniformGPUBuffer::<CombineUniform>::create_bind_group_layout_entry(
            UNIFORM_BINDING,
            wgpu::ShaderStages::FRAGMENT,
        ),
    ];
    if ambient_occlusion {
        entries.push(texture_entry(OCCLUSION_BINDING));
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("Combine inputs bind group layout"),
    })
}

fn create_environment_bind_group_layout(
    device: &wgpu::Device,
    environment_map_count: u32,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(environment_map_count as usize + 1);
    entries.push(create_sampler_bind_group_layout_entry(
        ENVIRONMENT_SAMPLER_BINDING,
        wgpu::ShaderStages::FRAGMENT,
        wgpu::SamplerBindingType::Filtering,
    ));
    entries.extend((0..environment_map_count).map(|slot| {
        create_texture_bind_group_layout_entry(
            environment_map_binding(slot),
            wgpu::ShaderStages::FRAGMENT,
            wgpu::TextureSampleType::Float { filterable: true },
            wgpu::TextureViewDimension::Cube,
        )
    }));

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("Environment map bind group layout"),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_place_environment_maps_after_sampler() {
        assert_eq!(environment_map_binding(0), 1);
        assert_eq!(environment_map_binding(3), 4);
    }
}
