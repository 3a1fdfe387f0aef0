//! Screen-space ambient occlusion computation and blurring.

use super::{FrameBindGroups, SharedBindGroupLayouts};
use crate::{
    config::AmbientOcclusionConfig,
    gpu::{
        GraphicsDevice,
        shader::{
            Shader, ShaderPermutationCache,
            template::ambient_occlusion::{
                AmbientOcclusionBlurShaderTemplate, AmbientOcclusionShaderTemplate,
            },
        },
        texture::{
            self, OCCLUSION_FORMAT, OcclusionTextures, Texture2D,
            create_texture_bind_group_layout_entry,
        },
        uniform::SingleUniformGPUBuffer,
    },
    ssao::{AmbientOcclusionUniform, BlurDirection, SsaoKernel},
};
use anyhow::Result;

/// GPU resources for computing the ambient occlusion of the G-buffer
/// surfaces and smoothing it with a separable box blur.
///
/// The computation writes to the raw occlusion texture. The horizontal blur
/// reads it and writes the intermediate texture, and the vertical blur
/// writes the result back to the raw texture, which is what the combine pass
/// samples.
#[derive(Debug)]
pub struct AmbientOcclusionPass {
    uniform: SingleUniformGPUBuffer<AmbientOcclusionUniform>,
    _noise_texture: Texture2D,
    occlusion: OcclusionTextures,
    parameters_bind_group: wgpu::BindGroup,
    raw_input_bind_group: wgpu::BindGroup,
    intermediate_input_bind_group: wgpu::BindGroup,
    computation_pipeline: wgpu::RenderPipeline,
    horizontal_blur_pipeline: wgpu::RenderPipeline,
    vertical_blur_pipeline: wgpu::RenderPipeline,
}

impl AmbientOcclusionPass {
    /// Generates the sample kernel and noise from the configuration and
    /// creates the pass resources for the given resolution.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, a resource can not
    /// be allocated or a shader can not be built. All of these are
    /// recoverable by rendering without ambient occlusion.
    pub fn new(
        graphics_device: &GraphicsDevice,
        shader_cache: &mut ShaderPermutationCache,
        layouts: &SharedBindGroupLayouts,
        config: &AmbientOcclusionConfig,
        (width, height): (u32, u32),
    ) -> Result<Self> {
        let kernel = SsaoKernel::from_config(config)?;
        log::debug!(
            "Generated ambient occlusion kernel with {} samples",
            kernel.sample_count()
        );

        let uniform = SingleUniformGPUBuffer::new(
            graphics_device,
            &kernel.create_uniform(config),
            "Ambient occlusion uniform",
        )?;
        let noise_texture = texture::create_noise_texture(graphics_device, &kernel.noise_texels())?;
        let occlusion = OcclusionTextures::new(graphics_device, width, height)?;

        let device = graphics_device.device();

        let parameters_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                SingleUniformGPUBuffer::<AmbientOcclusionUniform>::create_bind_group_layout_entry(
                    0,
                    wgpu::ShaderStages::FRAGMENT,
                ),
                create_texture_bind_group_layout_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2,
                ),
            ],
            label: Some("Ambient occlusion parameters bind group layout"),
        });

        let parameters_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &parameters_layout,
            entries: &[
                uniform.create_bind_group_entry(0),
                noise_texture.create_bind_group_entry(1),
            ],
            label: Some("Ambient occlusion parameters bind group"),
        });

        let blur_input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[create_texture_bind_group_layout_entry(
                0,
                wgpu::ShaderStages::FRAGMENT,
                wgpu::TextureSampleType::Float { filterable: false },
                wgpu::TextureViewDimension::D2,
            )],
            label: Some("Ambient occlusion blur input bind group layout"),
        });

        let create_blur_input_bind_group = |input: &Texture2D, label| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &blur_input_layout,
                entries: &[input.create_bind_group_entry(0)],
                label: Some(label),
            })
        };
        let raw_input_bind_group =
            create_blur_input_bind_group(&occlusion.raw, "Raw occlusion bind group");
        let intermediate_input_bind_group = create_blur_input_bind_group(
            &occlusion.intermediate,
            "Intermediate occlusion bind group",
        );

        let computation_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            bind_group_layouts: &[&layouts.frame, &layouts.gbuffer, &parameters_layout],
            push_constant_ranges: &[],
            label: Some("Ambient occlusion pipeline layout"),
        });
        let blur_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            bind_group_layouts: &[&blur_input_layout],
            push_constant_ranges: &[],
            label: Some("Ambient occlusion blur pipeline layout"),
        });

        let shader = shader_cache.obtain_shader(graphics_device, &AmbientOcclusionShaderTemplate)?;
        let computation_pipeline = create_occlusion_pipeline(
            graphics_device,
            shader,
            &computation_layout,
            "Ambient occlusion pipeline",
        )?;

        let shader = shader_cache.obtain_shader(
            graphics_device,
            &AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Horizontal),
        )?;
        let horizontal_blur_pipeline = create_occlusion_pipeline(
            graphics_device,
            shader,
            &blur_layout,
            "Horizontal ambient occlusion blur pipeline",
        )?;

        let shader = shader_cache.obtain_shader(
            graphics_device,
            &AmbientOcclusionBlurShaderTemplate::new(BlurDirection::Vertical),
        )?;
        let vertical_blur_pipeline = create_occlusion_pipeline(
            graphics_device,
            shader,
            &blur_layout,
            "Vertical ambient occlusion blur pipeline",
        )?;

        Ok(Self {
            uniform,
            _noise_texture: noise_texture,
            occlusion,
            parameters_bind_group,
            raw_input_bind_group,
            intermediate_input_bind_group,
            computation_pipeline,
            horizontal_blur_pipeline,
            vertical_blur_pipeline,
        })
    }

    /// Regenerates the kernel for a changed configuration and uploads it.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`](crate::LightingError)
    /// if the configuration is invalid.
    pub fn update_config(
        &self,
        graphics_device: &GraphicsDevice,
        config: &AmbientOcclusionConfig,
    ) -> Result<()> {
        let kernel = SsaoKernel::from_config(config)?;
        self.uniform
            .update(graphics_device, &kernel.create_uniform(config));
        Ok(())
    }

    /// The texture holding the final occlusion after both blur passes.
    pub fn output(&self) -> &Texture2D {
        &self.occlusion.raw
    }

    pub fn occlusion_textures(&self) -> &OcclusionTextures {
        &self.occlusion
    }

    /// Records the pass computing the raw occlusion.
    pub fn record_computation(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        bind_groups: &FrameBindGroups<'_>,
    ) {
        let mut render_pass = begin_occlusion_pass(
            command_encoder,
            self.occlusion.raw.view(),
            "Ambient occlusion pass",
        );
        render_pass.set_pipeline(&self.computation_pipeline);
        render_pass.set_bind_group(0, bind_groups.frame, &[]);
        render_pass.set_bind_group(1, bind_groups.gbuffer, &[]);
        render_pass.set_bind_group(2, &self.parameters_bind_group, &[]);
        render_pass.draw(0..6, 0..1);
    }

    /// Records one direction of the blur.
    pub fn record_blur(&self, command_encoder: &mut wgpu::CommandEncoder, direction: BlurDirection) {
        let (pipeline, input, output, label) = match direction {
            BlurDirection::Horizontal => (
                &self.horizontal_blur_pipeline,
                &self.raw_input_bind_group,
                &self.occlusion.intermediate,
                "Horizontal ambient occlusion blur pass",
            ),
            BlurDirection::Vertical => (
                &self.vertical_blur_pipeline,
                &self.intermediate_input_bind_group,
                &self.occlusion.raw,
                "Vertical ambient occlusion blur pass",
            ),
        };

        let mut render_pass = begin_occlusion_pass(command_encoder, output.view(), label);
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, input, &[]);
        render_pass.draw(0..6, 0..1);
    }
}

fn begin_occlusion_pass<'a>(
    command_encoder: &'a mut wgpu::CommandEncoder,
    output: &wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'a> {
    command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: output,
            resolve_target: None,
            ops: wgpu::Operations {
                // Uncovered pixels are left unoccluded
                load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        label: Some(label),
    })
}

fn create_occlusion_pipeline(
    graphics_device: &GraphicsDevice,
    shader: &Shader,
    layout: &wgpu::PipelineLayout,
    label: &str,
) -> Result<wgpu::RenderPipeline> {
    graphics_device.build_shader_object(label, |device| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            layout: Some(layout),
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
                    format: OCCLUSION_FORMAT,
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
            label: Some(label),
        })
    })
}
