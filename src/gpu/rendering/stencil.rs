//! Stencil marking of the pixels inside a light volume.

use super::LightVolumeGPUMesh;
use crate::{
    gbuffer::DEPTH_STENCIL_FORMAT,
    gpu::{
        GraphicsDevice,
        shader::{
            ShaderPermutationCache,
            template::stencil::StencilShaderTemplate,
        },
        texture::GBufferTextures,
    },
    light::volume::ScissorRect,
};
use anyhow::Result;

/// Pipelines for the pass that leaves a non-zero stencil value exactly at the
/// pixels whose G-buffer surface lies inside a light volume.
///
/// The pass first resets the stencil to zero within the light's scissor
/// rectangle, then draws both faces of the volume with depth testing but no
/// depth writes. Back faces behind the scene geometry increment the stencil
/// and front faces behind it decrement it, so the result does not depend on
/// whether the camera is inside the volume.
#[derive(Debug)]
pub struct StencilVolumePass {
    clear_pipeline: wgpu::RenderPipeline,
    volume_pipeline: wgpu::RenderPipeline,
}

impl StencilVolumePass {
    /// # Errors
    /// Returns a [`LightingError::ShaderBuild`](crate::LightingError) if the
    /// shader or a pipeline can not be built.
    pub fn new(
        graphics_device: &GraphicsDevice,
        shader_cache: &mut ShaderPermutationCache,
        light_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        let shader = shader_cache.obtain_shader(graphics_device, &StencilShaderTemplate)?;

        let pipeline_layout =
            graphics_device
                .device()
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    bind_group_layouts: &[light_bind_group_layout],
                    push_constant_ranges: &[],
                    label: Some("Stencil volume pipeline layout"),
                });

        let clear_pipeline = graphics_device.build_shader_object("Stencil clear pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader.module(),
                    entry_point: Some(StencilShaderTemplate::CLEAR_VERTEX_ENTRY_POINT),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: None,
                primitive: wgpu::PrimitiveState {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(stencil_clear_depth_stencil_state()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
                label: Some("Stencil clear pipeline"),
            })
        })?;

        let volume_pipeline =
            graphics_device.build_shader_object("Stencil volume pipeline", |device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: shader.module(),
                        entry_point: Some(StencilShaderTemplate::VOLUME_VERTEX_ENTRY_POINT),
                        buffers: &[LightVolumeGPUMesh::vertex_buffer_layout()],
                        compilation_options: Default::default(),
                    },
                    fragment: None,
                    primitive: wgpu::PrimitiveState {
                        front_face: wgpu::FrontFace::Ccw,
                        // Both faces contribute to the stencil count
                        cull_mode: None,
                        ..Default::default()
                    },
                    depth_stencil: Some(stencil_volume_depth_stencil_state()),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                    label: Some("Stencil volume pipeline"),
                })
            })?;

        Ok(Self {
            clear_pipeline,
            volume_pipeline,
        })
    }

    /// Records the stencil pass for one light volume. The light's uniform is
    /// selected from `light_bind_group` with `dynamic_offset`.
    pub fn record(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBufferTextures,
        light_bind_group: &wgpu::BindGroup,
        dynamic_offset: u32,
        mesh: &LightVolumeGPUMesh,
        scissor: &ScissorRect,
    ) {
        let mut render_pass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Stencil volume pass"),
        });

        render_pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
        render_pass.set_stencil_reference(0);
        render_pass.set_bind_group(0, light_bind_group, &[dynamic_offset]);

        render_pass.set_pipeline(&self.clear_pipeline);
        render_pass.draw(0..6, 0..1);

        render_pass.set_pipeline(&self.volume_pipeline);
        mesh.draw(&mut render_pass);
    }
}

/// Depth-stencil state for resetting the stencil within the scissor
/// rectangle.
fn stencil_clear_depth_stencil_state() -> wgpu::DepthStencilState {
    let face = wgpu::StencilFaceState {
        compare: wgpu::CompareFunction::Always,
        fail_op: wgpu::StencilOperation::Replace,
        depth_fail_op: wgpu::StencilOperation::Replace,
        pass_op: wgpu::StencilOperation::Replace,
    };
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xFF,
            write_mask: 0xFF,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Depth-stencil state for counting the volume faces lying behind the scene
/// geometry.
fn stencil_volume_depth_stencil_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState {
            front: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::DecrementWrap,
                pass_op: wgpu::StencilOperation::Keep,
            },
            back: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::IncrementWrap,
                pass_op: wgpu::StencilOperation::Keep,
            },
            read_mask: 0xFF,
            write_mask: 0xFF,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_reset_stencil_regardless_of_depth() {
        let state = stencil_clear_depth_stencil_state();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
        assert!(!state.depth_write_enabled);
        for face in [state.stencil.front, state.stencil.back] {
            assert_eq!(face.compare, wgpu::CompareFunction::Always);
            assert_eq!(face.pass_op, wgpu::StencilOperation::Replace);
            assert_eq!(face.depth_fail_op, wgpu::StencilOperation::Replace);
        }
    }

    #[test]
    fn should_count_only_faces_failing_the_depth_test() {
        let state = stencil_volume_depth_stencil_state();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Less);
        assert!(!state.depth_write_enabled);

        let front = state.stencil.front;
        let back = state.stencil.back;
        assert_eq!(back.depth_fail_op, wgpu::StencilOperation::IncrementWrap);
        assert_eq!(front.depth_fail_op, wgpu::StencilOperation::DecrementWrap);
        assert_eq!(front.pass_op, wgpu::StencilOperation::Keep);
        assert_eq!(back.pass_op, wgpu::StencilOperation::Keep);
    }

    #[test]
    fn should_write_through_full_stencil_mask_when_marking() {
        for state in [
            stencil_clear_depth_stencil_state(),
            stencil_volume_depth_stencil_state(),
        ] {
            assert_eq!(state.stencil.write_mask, 0xFF);
            assert_eq!(state.format, DEPTH_STENCIL_FORMAT);
        }
    }
}
