//! Recording of the lighting passes for a frame.

pub mod ambient_occlusion;
pub mod combine;
pub mod light_pass;
pub mod stencil;

use crate::{
    camera::Camera,
    config::LightingConfig,
    error::{LightingError, lighting_error},
    fre,
    frame::{FramePlan, FrameStep, LightPassEvent, LightPassState, PlannedLight},
    gpu::{
        GraphicsDevice,
        shader::ShaderPermutationCache,
        texture::{
            AccumulationTextures, FallbackShadowMaps, GBufferTextures, Texture2D,
            create_sampler_bind_group_layout_entry, create_texture_bind_group_layout_entry,
            shadow_map_view_dimension,
        },
        uniform::{DynamicUniformGPUBuffer, SingleUniformGPUBuffer},
    },
    light::{LightKind, LightUniform, SceneLights, volume::LightVolumeMesh},
    shadow::ShadowMapProvider,
};
use ambient_occlusion::AmbientOcclusionPass;
use anyhow::{Context, Result, anyhow};
use bytemuck::{Pod, Zeroable};
use combine::CombinePass;
use light_pass::{LightDraw, LightPassStrategies};
use nalgebra::{Matrix4, Vector2, Vector3, Vector4};
use stencil::StencilVolumePass;
use std::{mem, sync::Arc};
use wgpu::util::DeviceExt;

/// Number of horizontal rings in the point light volume mesh.
pub const SPHERE_RING_COUNT: u32 = 8;
/// Number of vertices around the base of the spot light volume mesh.
pub const CONE_CIRCUMFERENCE_VERTEX_COUNT: u32 = 24;

const INITIAL_LIGHT_CAPACITY: usize = 16;

/// Uniform holding the camera and scene parameters shared by all passes of
/// a frame.
///
/// The size of this struct has to be a multiple of 16 bytes as required for
/// uniforms.
#[repr(C)]
#[derive(Copy, Clone, Debug, Zeroable, Pod)]
pub struct FrameUniform {
    projection: Matrix4<fre>,
    inverse_projection: Matrix4<fre>,
    inverse_view: Matrix4<fre>,
    ambient_colour: Vector4<fre>,
    screen_size: Vector2<fre>,
    near_distance: fre,
    far_distance: fre,
}

assert_uniform_valid!(FrameUniform);

/// Bind group layouts shared by several passes.
#[derive(Debug)]
pub struct SharedBindGroupLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub gbuffer: wgpu::BindGroupLayout,
    pub light: wgpu::BindGroupLayout,
    shadow: [wgpu::BindGroupLayout; 3],
}

/// Bind groups shared by several passes of one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameBindGroups<'a> {
    pub frame: &'a wgpu::BindGroup,
    pub gbuffer: &'a wgpu::BindGroup,
    pub light: &'a wgpu::BindGroup,
}

/// Vertex and index buffers for a light volume mesh.
#[derive(Debug)]
pub struct LightVolumeGPUMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    n_indices: u32,
}

/// The light accumulation stage of a deferred renderer.
///
/// Owns all GPU resources for lighting a G-buffer of one resolution: the
/// accumulation and output textures, light volume meshes, per-light uniforms,
/// fallback shadow and environment maps and the pipelines of every pass.
/// Each call to [`Self::render_frame`] records and submits the passes of one
/// frame in the order given by its [`FramePlan`].
#[derive(Debug)]
pub struct DeferredLightingPipeline {
    graphics_device: Arc<GraphicsDevice>,
    config: LightingConfig,
    dimensions: (u32, u32),
    shader_cache: ShaderPermutationCache,
    layouts: SharedBindGroupLayouts,
    frame_uniform: SingleUniformGPUBuffer<FrameUniform>,
    frame_bind_group: wgpu::BindGroup,
    light_uniforms: DynamicUniformGPUBuffer<LightUniform>,
    shadow_sampler: wgpu::Sampler,
    fallback_shadow_maps: FallbackShadowMaps,
    accumulation: AccumulationTextures,
    sphere: LightVolumeMesh<fre>,
    cone: LightVolumeMesh<fre>,
    sphere_gpu_mesh: LightVolumeGPUMesh,
    cone_gpu_mesh: LightVolumeGPUMesh,
    stencil_pass: StencilVolumePass,
    light_passes: LightPassStrategies,
    ambient_occlusion_pass: Option<AmbientOcclusionPass>,
    combine_pass: CombinePass,
    light_pass_state: LightPassState,
}

impl FrameUniform {
    pub fn new(camera: &Camera, screen_size: (u32, u32), ambient_colour: &Vector3<fre>) -> Self {
        Self {
            projection: *camera.projection(),
            inverse_projection: *camera.inverse_projection(),
            inverse_view: camera.inverse_view_matrix(),
            ambient_colour: ambient_colour.push(1.0),
            screen_size: Vector2::new(screen_size.0 as fre, screen_size.1 as fre),
            near_distance: camera.near_distance(),
            far_distance: camera.far_distance(),
        }
    }
}

impl SharedBindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[SingleUniformGPUBuffer::<FrameUniform>::create_bind_group_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
            label: Some("Frame bind group layout"),
        });

        let gbuffer = GBufferTextures::create_bind_group_layout(device);

        let light = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[DynamicUniformGPUBuffer::<LightUniform>::create_bind_group_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
            label: Some("Light bind group layout"),
        });

        let shadow = LightKind::ALL.map(|kind| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    create_texture_bind_group_layout_entry(
                        0,
                        wgpu::ShaderStages::FRAGMENT,
                        wgpu::TextureSampleType::Depth,
                        shadow_map_view_dimension(kind),
                    ),
                    create_sampler_bind_group_layout_entry(
                        1,
                        wgpu::ShaderStages::FRAGMENT,
                        wgpu::SamplerBindingType::Comparison,
                    ),
                ],
                label: Some("Shadow map bind group layout"),
            })
        });

        Self {
            frame,
            gbuffer,
            light,
            shadow,
        }
    }

    /// Layout of the shadow map bind group for lights of the given kind.
    pub fn shadow(&self, kind: LightKind) -> &wgpu::BindGroupLayout {
        match kind {
            LightKind::Directional => &self.shadow[0],
            LightKind::Point => &self.shadow[1],
            LightKind::Spot => &self.shadow[2],
        }
    }
}

impl LightVolumeGPUMesh {
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if a buffer can not be
    /// allocated.
    pub fn new(
        graphics_device: &GraphicsDevice,
        mesh: &LightVolumeMesh<fre>,
        label: &'static str,
    ) -> Result<Self> {
        let positions: Vec<[fre; 3]> = mesh
            .positions()
            .iter()
            .map(|position| [position.x, position.y, position.z])
            .collect();

        let vertex_buffer = graphics_device.create_resource(label, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                contents: bytemuck::cast_slice(&positions),
                usage: wgpu::BufferUsages::VERTEX,
                label: Some(label),
            })
        })?;
        let index_buffer = graphics_device.create_resource(label, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                contents: bytemuck::cast_slice(mesh.indices()),
                usage: wgpu::BufferUsages::INDEX,
                label: Some(label),
            })
        })?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            n_indices: mesh.n_indices(),
        })
    }

    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<[fre; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }

    pub fn n_indices(&self) -> u32 {
        self.n_indices
    }

    /// Binds the buffers and draws the mesh with the current pipeline.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.n_indices, 0, 0..1);
    }
}

impl DeferredLightingPipeline {
    /// Creates the lighting pipeline for G-buffers of the given resolution.
    ///
    /// If ambient occlusion is enabled but its pass can not be created, a
    /// warning is logged and the pipeline is built without it.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, or a required
    /// resource or shader can not be created.
    pub fn new(
        graphics_device: Arc<GraphicsDevice>,
        config: LightingConfig,
        dimensions: (u32, u32),
    ) -> Result<Self> {
        config.validate()?;
        let (width, height) = dimensions;
        log::info!("Creating deferred lighting pipeline for {width}x{height} G-buffers");

        let mut shader_cache = ShaderPermutationCache::new();
        let layouts = SharedBindGroupLayouts::new(graphics_device.device());

        let frame_uniform =
            SingleUniformGPUBuffer::new(&graphics_device, &FrameUniform::zeroed(), "Frame uniform")?;
        let frame_bind_group =
            graphics_device
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &layouts.frame,
                    entries: &[frame_uniform.create_bind_group_entry(0)],
                    label: Some("Frame bind group"),
                });

        let light_uniforms =
            DynamicUniformGPUBuffer::new(&graphics_device, INITIAL_LIGHT_CAPACITY, "Light uniforms")?;

        let shadow_sampler = graphics_device
            .device()
            .create_sampler(&wgpu::SamplerDescriptor {
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                mipmap_filter: wgpu::FilterMode::Nearest,
                compare: Some(wgpu::CompareFunction::LessEqual),
                label: Some("Shadow map comparison sampler"),
                ..Default::default()
            });
        let fallback_shadow_maps = FallbackShadowMaps::new(&graphics_device)?;

        let accumulation = AccumulationTextures::new(&graphics_device, width, height)?;

        let sphere = LightVolumeMesh::create_sphere(SPHERE_RING_COUNT);
        let cone = LightVolumeMesh::create_cone(CONE_CIRCUMFERENCE_VERTEX_COUNT);
        let sphere_gpu_mesh = LightVolumeGPUMesh::new(&graphics_device, &sphere, "Point light volume")?;
        let cone_gpu_mesh = LightVolumeGPUMesh::new(&graphics_device, &cone, "Spot light volume")?;

        let stencil_pass = StencilVolumePass::new(&graphics_device, &mut shader_cache, &layouts.light)?;
        let light_passes = with_debug_logging!(
            "Building light pass pipelines";
            LightPassStrategies::new(
                &graphics_device,
                &mut shader_cache,
                &layouts,
                config.shadows.filter,
            )
        )?;

        let ambient_occlusion_pass =
            Self::create_ambient_occlusion_pass(&graphics_device, &mut shader_cache, &layouts, &config, dimensions)?;

        let combine_pass = CombinePass::new(
            &graphics_device,
            &mut shader_cache,
            &layouts,
            &config,
            ambient_occlusion_pass.is_some(),
            dimensions,
        )?;

        log::info!(
            "Built {} light pass pipelines from {} shader permutations",
            light_passes.n_pipelines(),
            shader_cache.len()
        );

        Ok(Self {
            graphics_device,
            config,
            dimensions,
            shader_cache,
            layouts,
            frame_uniform,
            frame_bind_group,
            light_uniforms,
            shadow_sampler,
            fallback_shadow_maps,
            accumulation,
            sphere,
            cone,
            sphere_gpu_mesh,
            cone_gpu_mesh,
            stencil_pass,
            light_passes,
            ambient_occlusion_pass,
            combine_pass,
            light_pass_state: LightPassState::Uninitialised,
        })
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Whether ambient occlusion is computed, which may be false even if it
    /// is enabled in the configuration when its pass could not be created.
    pub fn ambient_occlusion_active(&self) -> bool {
        self.ambient_occlusion_pass.is_some()
    }

    pub fn light_pass_state(&self) -> LightPassState {
        self.light_pass_state
    }

    /// The colour texture the combine pass writes the lit frame to.
    pub fn output_texture(&self) -> &Texture2D {
        self.combine_pass.output()
    }

    pub fn accumulation_textures(&self) -> &AccumulationTextures {
        &self.accumulation
    }

    /// The blurred occlusion, if ambient occlusion is active.
    pub fn occlusion_texture(&self) -> Option<&Texture2D> {
        self.ambient_occlusion_pass
            .as_ref()
            .map(AmbientOcclusionPass::output)
    }

    /// Applies a new configuration. Passes whose shader permutation depends
    /// on a changed option are rebuilt, the others only get new uniform
    /// data.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a rebuilt pass
    /// can not be created. The previous configuration stays in effect on
    /// error.
    pub fn update_config(&mut self, config: LightingConfig) -> Result<()> {
        config.validate()?;
        let graphics_device = Arc::clone(&self.graphics_device);

        let light_passes = if config.shadows.filter != self.config.shadows.filter {
            Some(LightPassStrategies::new(
                &graphics_device,
                &mut self.shader_cache,
                &self.layouts,
                config.shadows.filter,
            )?)
        } else {
            None
        };

        let ambient_occlusion_pass = if config.ambient_occlusion != self.config.ambient_occlusion {
            Some(Self::create_ambient_occlusion_pass(
                &graphics_device,
                &mut self.shader_cache,
                &self.layouts,
                &config,
                self.dimensions,
            )?)
        } else {
            None
        };

        let ambient_occlusion_active = ambient_occlusion_pass
            .as_ref()
            .map_or(self.ambient_occlusion_pass.is_some(), Option::is_some);

        let combine_pass = CombinePass::new(
            &graphics_device,
            &mut self.shader_cache,
            &self.layouts,
            &config,
            ambient_occlusion_active,
            self.dimensions,
        )?;

        if let Some(light_passes) = light_passes {
            self.light_passes = light_passes;
        }
        if let Some(ambient_occlusion_pass) = ambient_occlusion_pass {
            self.ambient_occlusion_pass = ambient_occlusion_pass;
        }
        self.combine_pass = combine_pass;
        self.config = config;
        Ok(())
    }

    /// Recreates the resolution-dependent textures for G-buffers of the given
    /// resolution.
    ///
    /// # Errors
    /// Returns an error if a texture or pass can not be created.
    pub fn resize(&mut self, dimensions: (u32, u32)) -> Result<()> {
        if dimensions == self.dimensions {
            return Ok(());
        }
        log::info!(
            "Resizing lighting pipeline to {}x{}",
            dimensions.0,
            dimensions.1
        );

        let graphics_device = Arc::clone(&self.graphics_device);
        let accumulation = AccumulationTextures::new(&graphics_device, dimensions.0, dimensions.1)?;
        let ambient_occlusion_pass = Self::create_ambient_occlusion_pass(
            &graphics_device,
            &mut self.shader_cache,
            &self.layouts,
            &self.config,
            dimensions,
        )?;
        let combine_pass = CombinePass::new(
            &graphics_device,
            &mut self.shader_cache,
            &self.layouts,
            &self.config,
            ambient_occlusion_pass.is_some(),
            dimensions,
        )?;

        self.accumulation = accumulation;
        self.ambient_occlusion_pass = ambient_occlusion_pass;
        self.combine_pass = combine_pass;
        self.dimensions = dimensions;
        Ok(())
    }

    /// Lights the given G-buffer and writes the result to the
    /// [output texture](Self::output_texture).
    ///
    /// Shadow-producing lights sample the shadow map the provider returns for
    /// them, or a fully lit fallback if it returns none. Environment maps are
    /// bound to the configured slots in order.
    ///
    /// # Errors
    /// Returns
    /// - A [`LightingError::DeviceLost`] if the device has been lost.
    /// - A [`LightingError::ContractViolation`] if the G-buffer resolution
    ///   differs from the pipeline's.
    /// - A [`LightingError::ResourceCreation`] if the light uniform buffer
    ///   can not be grown.
    pub fn render_frame(
        &mut self,
        gbuffer: &GBufferTextures,
        lights: &SceneLights,
        camera: &Camera,
        shadow_maps: &impl ShadowMapProvider,
        environment_maps: &[&wgpu::TextureView],
    ) -> Result<()> {
        self.graphics_device.ensure_not_lost()?;

        if gbuffer.dimensions() != self.dimensions {
            return Err(LightingError::contract_violation(format!(
                "G-buffer resolution {:?} differs from pipeline resolution {:?}",
                gbuffer.dimensions(),
                self.dimensions
            ))
            .into());
        }

        // A frame aborted by an error leaves the state machine mid-frame
        self.light_pass_state = LightPassState::Uninitialised;

        let plan = FramePlan::build(
            lights,
            camera,
            self.dimensions,
            self.config.max_light_distance,
            &self.sphere,
            &self.cone,
            self.ambient_occlusion_pass.is_some(),
        );
        log::debug!(
            "Planned {} of {} lights in {} steps",
            plan.n_drawn_lights(),
            lights.len(),
            plan.steps().len()
        );

        let graphics_device = Arc::clone(&self.graphics_device);
        let device = graphics_device.device();

        self.frame_uniform.update(
            &graphics_device,
            &FrameUniform::new(camera, self.dimensions, &self.config.scene_ambient_colour),
        );

        let light_uniforms = plan
            .lights()
            .iter()
            .map(|planned| {
                let light = lights
                    .get(planned.id)
                    .ok_or_else(|| anyhow!("Missing planned light {:?}", planned.id))?;
                Ok(LightUniform::new(
                    light,
                    camera,
                    planned.volume_to_clip(camera),
                    planned.effective_distance,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.light_uniforms.upload(&graphics_device, &light_uniforms)?;

        let gbuffer_bind_group = gbuffer.create_bind_group(device, &self.layouts.gbuffer);
        let light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layouts.light,
            entries: &[self.light_uniforms.create_bind_group_entry(0)],
            label: Some("Light bind group"),
        });
        let shadow_bind_groups: Vec<_> = plan
            .lights()
            .iter()
            .map(|planned| self.create_shadow_bind_group(device, lights, planned, shadow_maps))
            .collect();

        let bind_groups = FrameBindGroups {
            frame: &self.frame_bind_group,
            gbuffer: &gbuffer_bind_group,
            light: &light_bind_group,
        };

        let combine_inputs_bind_group = self.combine_pass.create_inputs_bind_group(
            device,
            &self.accumulation,
            self.ambient_occlusion_pass
                .as_ref()
                .map(AmbientOcclusionPass::output),
        )?;
        let environment_bind_group = self
            .combine_pass
            .create_environment_bind_group(device, environment_maps);

        let mut command_encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Lighting command encoder"),
        });

        let mut state = LightPassState::Uninitialised.transition(LightPassEvent::Initialise)?;

        for step in plan.steps() {
            match *step {
                FrameStep::ClearAccumulation => {
                    self.record_accumulation_clear(&mut command_encoder);
                    log::debug!("Recorded accumulation clear pass");
                }
                FrameStep::StencilVolume { light } => {
                    let planned = &plan.lights()[light];
                    self.stencil_pass.record(
                        &mut command_encoder,
                        gbuffer,
                        &light_bind_group,
                        self.light_uniforms.dynamic_offset(light),
                        self.volume_mesh(planned.id.kind)
                            .ok_or_else(|| anyhow!("No volume mesh for {} lights", planned.id.kind))?,
                        &planned.scissor,
                    );
                    log::debug!("Recorded stencil volume pass for light {light}");
                }
                FrameStep::Light {
                    light,
                    first,
                    strategy,
                } => {
                    state = state.transition(LightPassEvent::BindLight)?;
                    let planned = &plan.lights()[light];
                    let draw = LightDraw {
                        strategy,
                        first,
                        dynamic_offset: self.light_uniforms.dynamic_offset(light),
                        shadow_bind_group: shadow_bind_groups[light].as_ref(),
                        mesh: self.volume_mesh(planned.id.kind),
                        scissor: planned.scissor,
                    };
                    self.light_passes
                        .record(
                            &mut command_encoder,
                            &self.accumulation,
                            gbuffer,
                            &bind_groups,
                            &draw,
                        )
                        .with_context(|| format!("Recording light pass for light {light}"))?;
                    state = state.transition(LightPassEvent::Render)?;
                    log::debug!(
                        "Recorded {}{} light pass for light {light}",
                        if strategy.shadowed { "shadowed " } else { "" },
                        strategy.kind
                    );
                }
                FrameStep::AmbientOcclusion => {
                    if let Some(pass) = &self.ambient_occlusion_pass {
                        pass.record_computation(&mut command_encoder, &bind_groups);
                        log::debug!("Recorded ambient occlusion pass");
                    }
                }
                FrameStep::AmbientOcclusionBlur(direction) => {
                    if let Some(pass) = &self.ambient_occlusion_pass {
                        pass.record_blur(&mut command_encoder, direction);
                        log::debug!("Recorded {direction:?} ambient occlusion blur pass");
                    }
                }
                FrameStep::Combine => {
                    self.combine_pass.record(
                        &mut command_encoder,
                        &bind_groups,
                        &combine_inputs_bind_group,
                        environment_bind_group.as_ref(),
                    );
                    log::debug!("Recorded combine pass");
                }
            }
        }

        state = state.transition(LightPassEvent::Finish)?;

        graphics_device
            .queue()
            .submit(std::iter::once(command_encoder.finish()));

        self.light_pass_state = state.transition(LightPassEvent::Reset)?;

        graphics_device.ensure_not_lost()
    }

    fn create_ambient_occlusion_pass(
        graphics_device: &GraphicsDevice,
        shader_cache: &mut ShaderPermutationCache,
        layouts: &SharedBindGroupLayouts,
        config: &LightingConfig,
        dimensions: (u32, u32),
    ) -> Result<Option<AmbientOcclusionPass>> {
        if !config.ambient_occlusion.enabled {
            return Ok(None);
        }

        match AmbientOcclusionPass::new(
            graphics_device,
            shader_cache,
            layouts,
            &config.ambient_occlusion,
            dimensions,
        ) {
            Ok(pass) => Ok(Some(pass)),
            Err(err)
                if lighting_error(&err)
                    .is_some_and(LightingError::is_recoverable_by_disabling_feature) =>
            {
                log::warn!("Disabling ambient occlusion: {err:#}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn volume_mesh(&self, kind: LightKind) -> Option<&LightVolumeGPUMesh> {
        match kind {
            LightKind::Directional => None,
            LightKind::Point => Some(&self.sphere_gpu_mesh),
            LightKind::Spot => Some(&self.cone_gpu_mesh),
        }
    }

    fn create_shadow_bind_group(
        &self,
        device: &wgpu::Device,
        lights: &SceneLights,
        planned: &PlannedLight,
        shadow_maps: &impl ShadowMapProvider,
    ) -> Option<wgpu::BindGroup> {
        if !planned.strategy.shadowed {
            return None;
        }
        let kind = planned.strategy.kind;

        let shadow_map = lights
            .get(planned.id)
            .and_then(|light| light.emission().shadow_map)
            .and_then(|id| shadow_maps.shadow_map(id));

        let view = shadow_map.unwrap_or_else(|| {
            log::warn!(
                "No shadow map for shadowed {} light {}, rendering it fully lit",
                kind,
                planned.id.index
            );
            self.fallback_shadow_maps.view_for(kind)
        });

        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: self.layouts.shadow(kind),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
            label: Some("Shadow map bind group"),
        }))
    }

    fn record_accumulation_clear(&self, command_encoder: &mut wgpu::CommandEncoder) {
        let clear = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[
                clear(self.accumulation.diffuse.view()),
                clear(self.accumulation.specular.view()),
            ],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Accumulation clear pass"),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Point3};

    #[test]
    fn should_have_frame_uniform_size_matching_shader_struct() {
        assert_eq!(mem::size_of::<FrameUniform>(), 224);
    }

    #[test]
    fn should_fill_frame_uniform_from_camera() {
        let camera = Camera::perspective(
            Camera::look_at(&Point3::new(0.0, 0.0, 5.0), &Point3::origin(), &Vector3::y()),
            1.0,
            2.0,
            0.1,
            100.0,
        );
        let uniform = FrameUniform::new(&camera, (640, 320), &Vector3::new(0.1, 0.2, 0.3));

        assert_eq!(uniform.screen_size, Vector2::new(640.0, 320.0));
        assert_abs_diff_eq!(uniform.near_distance, 0.1);
        assert_abs_diff_eq!(uniform.far_distance, 100.0);
        assert_abs_diff_eq!(uniform.ambient_colour, Vector4::new(0.1, 0.2, 0.3, 1.0));
        assert_abs_diff_eq!(
            uniform.projection * uniform.inverse_projection,
            Matrix4::identity(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn should_describe_tightly_packed_volume_vertices() {
        let layout = LightVolumeGPUMesh::vertex_buffer_layout();
        assert_eq!(layout.array_stride, 12);
        assert_eq!(layout.attributes.len(), 1);
        assert_eq!(layout.attributes[0].format, wgpu::VertexFormat::Float32x3);
        assert_eq!(layout.attributes[0].shader_location, 0);
    }

    #[test]
    fn should_use_identity_volume_transform_for_camera_at_origin_with_unit_isometry() {
        let camera = Camera::perspective(Isometry3::identity(), 1.0, 1.0, 0.1, 10.0);
        let uniform = FrameUniform::new(&camera, (1, 1), &Vector3::zeros());
        assert_abs_diff_eq!(uniform.inverse_view, Matrix4::identity());
    }
}
