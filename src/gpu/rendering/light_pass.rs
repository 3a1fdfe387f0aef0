//! Accumulation of light contributions into the diffuse and specular
//! attachments.

use super::{FrameBindGroups, LightVolumeGPUMesh, SharedBindGroupLayouts};
use crate::{
    config::ShadowFilter,
    error::LightingError,
    frame::{Blending, LightStrategyKey},
    gbuffer::DEPTH_STENCIL_FORMAT,
    gpu::{
        GraphicsDevice,
        shader::{
            ShaderPermutationCache,
            template::{SpecificShaderTemplate, light_pass::LightPassShaderTemplate},
        },
        texture::{ACCUMULATION_FORMAT, AccumulationTextures, GBufferTextures},
    },
    light::{LightKind, volume::ScissorRect},
};
use anyhow::{Result, anyhow};
use std::collections::HashMap;

/// One render pipeline per light strategy and blending mode.
#[derive(Debug)]
pub struct LightPassStrategies {
    pipelines: HashMap<(LightStrategyKey, Blending), wgpu::RenderPipeline>,
}

/// The parameters for drawing a single light.
#[derive(Clone, Copy, Debug)]
pub struct LightDraw<'a> {
    pub strategy: LightStrategyKey,
    /// Whether this is the first light drawn in the frame, which overwrites
    /// the accumulation attachments.
    pub first: bool,
    /// Offset selecting the light's uniform in the light bind group.
    pub dynamic_offset: u32,
    /// Bind group with the light's shadow map, required for shadowed
    /// strategies.
    pub shadow_bind_group: Option<&'a wgpu::BindGroup>,
    /// Volume mesh, required for local lights.
    pub mesh: Option<&'a LightVolumeGPUMesh>,
    pub scissor: ScissorRect,
}

impl LightPassStrategies {
    /// Builds the pipelines for every strategy.
    ///
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`](crate::LightingError) if a
    /// shader permutation or pipeline can not be built.
    pub fn new(
        graphics_device: &GraphicsDevice,
        shader_cache: &mut ShaderPermutationCache,
        layouts: &SharedBindGroupLayouts,
        shadow_filter: ShadowFilter,
    ) -> Result<Self> {
        let mut pipelines = HashMap::new();

        for strategy in LightStrategyKey::all() {
            let template =
                LightPassShaderTemplate::new(strategy.kind, strategy.shadowed, shadow_filter);
            let shader = shader_cache.obtain_shader(graphics_device, &template)?;

            let mut bind_group_layouts = vec![&layouts.frame, &layouts.gbuffer, &layouts.light];
            if strategy.shadowed {
                bind_group_layouts.push(layouts.shadow(strategy.kind));
            }

            let pipeline_layout =
                graphics_device
                    .device()
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        bind_group_layouts: &bind_group_layouts,
                        push_constant_ranges: &[],
                        label: Some("Light pass pipeline layout"),
                    });

            let volume_vertex_buffers = [LightVolumeGPUMesh::vertex_buffer_layout()];
            let vertex_buffers: &[wgpu::VertexBufferLayout<'_>] = if strategy.kind.is_local() {
                &volume_vertex_buffers
            } else {
                &[]
            };

            for blending in [Blending::Replace, Blending::Additive] {
                let color_target = Some(wgpu::ColorTargetState {
                    format: ACCUMULATION_FORMAT,
                    blend: Some(blend_state(blending)),
                    write_mask: wgpu::ColorWrites::ALL,
                });

                let label = format!("{} {:?} light pass pipeline", template.label(), blending);

                let pipeline = graphics_device.build_shader_object(&label, |device| {
                    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: shader.module(),
                            entry_point: shader.vertex_entry_point_name(),
                            buffers: vertex_buffers,
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: shader.module(),
                            entry_point: shader.fragment_entry_point_name(),
                            targets: &[color_target.clone(), color_target],
                            compilation_options: Default::default(),
                        }),
                        primitive: wgpu::PrimitiveState {
                            front_face: wgpu::FrontFace::Ccw,
                            cull_mode: cull_mode(strategy.kind),
                            ..Default::default()
                        },
                        depth_stencil: Some(light_depth_stencil_state(strategy.kind)),
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                        label: Some(&label),
                    })
                })?;

                pipelines.insert((strategy, blending), pipeline);
            }
        }

        Ok(Self { pipelines })
    }

    pub fn pipeline(
        &self,
        strategy: LightStrategyKey,
        blending: Blending,
    ) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&(strategy, blending))
    }

    pub fn n_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// Records the render pass accumulating one light. For local lights the
    /// stencil must already mark the pixels inside the light's volume.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`](crate::LightingError)
    /// if the draw lacks the shadow bind group or volume mesh its strategy
    /// requires.
    pub fn record(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        accumulation: &AccumulationTextures,
        gbuffer: &GBufferTextures,
        bind_groups: &FrameBindGroups<'_>,
        draw: &LightDraw<'_>,
    ) -> Result<()> {
        let blending = Blending::for_light(draw.first);
        let pipeline = self
            .pipeline(draw.strategy, blending)
            .ok_or_else(|| anyhow!("Missing light pass pipeline for {:?}", draw.strategy))?;

        let shadow_bind_group = match (draw.strategy.shadowed, draw.shadow_bind_group) {
            (true, None) => {
                return Err(LightingError::contract_violation(format!(
                    "shadowed {} light drawn without shadow map",
                    draw.strategy.kind
                ))
                .into());
            }
            (true, shadow_bind_group) => shadow_bind_group,
            (false, _) => None,
        };

        let mesh = match (draw.strategy.kind.is_local(), draw.mesh) {
            (true, None) => {
                return Err(LightingError::contract_violation(format!(
                    "{} light drawn without volume mesh",
                    draw.strategy.kind
                ))
                .into());
            }
            (true, mesh) => mesh,
            (false, _) => None,
        };

        let load = if draw.first {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        } else {
            wgpu::LoadOp::Load
        };
        let color_attachment = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })
        };

        let mut render_pass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[
                color_attachment(accumulation.diffuse.view()),
                color_attachment(accumulation.specular.view()),
            ],
            // Read-only, since the depth is also sampled from the G-buffer
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Light pass"),
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_stencil_reference(0);
        render_pass.set_bind_group(0, bind_groups.frame, &[]);
        render_pass.set_bind_group(1, bind_groups.gbuffer, &[]);
        render_pass.set_bind_group(2, bind_groups.light, &[draw.dynamic_offset]);
        if let Some(shadow_bind_group) = shadow_bind_group {
            render_pass.set_bind_group(3, shadow_bind_group, &[]);
        }

        match mesh {
            Some(mesh) => {
                let scissor = &draw.scissor;
                render_pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
                mesh.draw(&mut render_pass);
            }
            None => {
                render_pass.draw(0..6, 0..1);
            }
        }

        Ok(())
    }
}

/// Blend state of the accumulation attachments for the given blending mode.
pub fn blend_state(blending: Blending) -> wgpu::BlendState {
    match blending {
        Blending::Replace => wgpu::BlendState::REPLACE,
        Blending::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: add,
                alpha: add,
            }
        }
    }
}

/// Local lights draw the back faces of their volume so that the volume is
/// still rasterized when the camera is inside it.
pub fn cull_mode(kind: LightKind) -> Option<wgpu::Face> {
    if kind.is_local() {
        Some(wgpu::Face::Front)
    } else {
        None
    }
}

/// Depth-stencil state of the light pass. Local lights only shade pixels
/// with a non-zero stencil value. The depth and stencil are never written.
pub fn light_depth_stencil_state(kind: LightKind) -> wgpu::DepthStencilState {
    let compare = if kind.is_local() {
        wgpu::CompareFunction::NotEqual
    } else {
        wgpu::CompareFunction::Always
    };
    let face = wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op: wgpu::StencilOperation::Keep,
    };
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xFF,
            write_mask: 0,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_replace_for_first_light_and_add_for_rest() {
        assert_eq!(
            blend_state(Blending::for_light(true)),
            wgpu::BlendState::REPLACE
        );

        let additive = blend_state(Blending::for_light(false));
        for component in [additive.color, additive.alpha] {
            assert_eq!(component.src_factor, wgpu::BlendFactor::One);
            assert_eq!(component.dst_factor, wgpu::BlendFactor::One);
            assert_eq!(component.operation, wgpu::BlendOperation::Add);
        }
    }

    #[test]
    fn should_cull_front_faces_only_for_local_lights() {
        assert_eq!(cull_mode(LightKind::Directional), None);
        assert_eq!(cull_mode(LightKind::Point), Some(wgpu::Face::Front));
        assert_eq!(cull_mode(LightKind::Spot), Some(wgpu::Face::Front));
    }

    #[test]
    fn should_test_stencil_only_for_local_lights() {
        assert_eq!(
            light_depth_stencil_state(LightKind::Directional).stencil.front.compare,
            wgpu::CompareFunction::Always
        );
        for kind in [LightKind::Point, LightKind::Spot] {
            let state = light_depth_stencil_state(kind);
            assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::NotEqual);
            assert_eq!(state.stencil.back.compare, wgpu::CompareFunction::NotEqual);
        }
    }

    #[test]
    fn should_never_write_depth_or_stencil_in_light_pass() {
        for kind in LightKind::ALL {
            let state = light_depth_stencil_state(kind);
            assert!(!state.depth_write_enabled);
            assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
            assert_eq!(state.stencil.write_mask, 0);
            assert!(state.is_read_only(cull_mode(kind)));
        }
    }
}
