//! Textures used by the lighting passes.

use crate::{
    error::LightingError,
    fre,
    gbuffer::{GBufferChannel, GBufferImage},
    gpu::GraphicsDevice,
    light::{LightKind, MAX_SHADOW_CASCADES},
    ssao::NOISE_TEXTURE_SIZE,
};
use anyhow::Result;
use half::f16;
use nalgebra::Vector4;
use std::sync::mpsc;

/// Format of the two light accumulation attachments.
pub const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of the ambient occlusion attachments.
pub const OCCLUSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

/// Format of the combined output colour.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of the fallback shadow maps bound when a shadowed light has no
/// shadow map.
pub const FALLBACK_SHADOW_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const NOISE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const FALLBACK_ENVIRONMENT_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A 2D texture with a default view.
#[derive(Debug)]
pub struct Texture2D {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// The textures of a geometry buffer, as consumed by the lighting passes.
#[derive(Debug)]
pub struct GBufferTextures {
    width: u32,
    height: u32,
    depth_stencil: Texture2D,
    /// View of only the depth aspect, for sampling in shaders.
    depth_only_view: wgpu::TextureView,
    /// Colour channels in [`GBufferChannel::COLOR`] order.
    colour: [Texture2D; 5],
}

/// The diffuse and specular light accumulation attachments.
#[derive(Debug)]
pub struct AccumulationTextures {
    pub diffuse: Texture2D,
    pub specular: Texture2D,
}

/// The two occlusion attachments the ambient occlusion and blur passes
/// ping-pong between.
#[derive(Debug)]
pub struct OcclusionTextures {
    pub raw: Texture2D,
    pub intermediate: Texture2D,
}

/// Single-texel depth textures holding the far depth, bound in place of
/// missing shadow maps so that everything is lit.
#[derive(Debug)]
pub struct FallbackShadowMaps {
    cascades: Texture2D,
    cube: Texture2D,
    single: Texture2D,
}

impl Texture2D {
    /// Creates a texture with the given dimensions, format and usage.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if the texture can not
    /// be allocated.
    pub fn new(
        graphics_device: &GraphicsDevice,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &'static str,
    ) -> Result<Self> {
        Self::with_layers(
            graphics_device,
            width,
            height,
            1,
            format,
            usage,
            wgpu::TextureViewDimension::D2,
            label,
        )
    }

    fn with_layers(
        graphics_device: &GraphicsDevice,
        width: u32,
        height: u32,
        n_layers: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        view_dimension: wgpu::TextureViewDimension,
        label: &'static str,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(LightingError::resource_creation(
                label,
                format!("invalid texture dimensions {width}x{height}"),
            )
            .into());
        }

        let texture = graphics_device.create_resource(label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: n_layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
                label: Some(label),
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(view_dimension),
            ..Default::default()
        });

        Ok(Self { texture, view })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    /// Creates a bind group entry for the default view.
    pub fn create_bind_group_entry(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }

    /// Queues a write of the given tightly packed texel bytes to the whole
    /// texture.
    fn write_bytes(&self, graphics_device: &GraphicsDevice, bytes: &[u8], bytes_per_texel: u32) {
        let size = self.texture.size();
        graphics_device.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_texel * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );
    }
}

impl GBufferTextures {
    /// Creates the textures for a geometry buffer with the given dimensions.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if any texture can not
    /// be allocated.
    pub fn new(graphics_device: &GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_DST;

        let depth_stencil = Texture2D::new(
            graphics_device,
            width,
            height,
            GBufferChannel::Depth.texture_format(),
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            GBufferChannel::Depth.label(),
        )?;

        let depth_only_view = depth_stencil
            .texture
            .create_view(&wgpu::TextureViewDescriptor {
                label: Some("G-buffer depth (depth only)"),
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            });

        let create_channel = |channel: GBufferChannel| {
            Texture2D::new(
                graphics_device,
                width,
                height,
                channel.texture_format(),
                usage,
                channel.label(),
            )
        };

        let colour = [
            create_channel(GBufferChannel::Data1)?,
            create_channel(GBufferChannel::Data2)?,
            create_channel(GBufferChannel::Data3)?,
            create_channel(GBufferChannel::Data4)?,
            create_channel(GBufferChannel::Data5)?,
        ];

        Ok(Self {
            width,
            height,
            depth_stencil,
            depth_only_view,
            colour,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the view of the depth-stencil texture used as attachment.
    pub fn depth_stencil_view(&self) -> &wgpu::TextureView {
        self.depth_stencil.view()
    }

    /// Returns the texture of the given colour channel.
    ///
    /// # Panics
    /// If `channel` is [`GBufferChannel::Depth`].
    pub fn colour_channel(&self, channel: GBufferChannel) -> &Texture2D {
        let binding = channel.binding();
        assert!(binding > 0, "Depth is not a colour channel");
        &self.colour[(binding - 1) as usize]
    }

    /// Creates the layout of the bind group holding all channels, with the
    /// depth at binding 0 and the colour channels at the following bindings.
    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = GBufferChannel::ALL
            .iter()
            .map(|channel| {
                let sample_type = match channel {
                    GBufferChannel::Depth => wgpu::TextureSampleType::Depth,
                    _ => wgpu::TextureSampleType::Float { filterable: false },
                };
                create_texture_bind_group_layout_entry(
                    channel.binding(),
                    wgpu::ShaderStages::FRAGMENT,
                    sample_type,
                    wgpu::TextureViewDimension::D2,
                )
            })
            .collect();

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &entries,
            label: Some("G-buffer bind group layout"),
        })
    }

    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(GBufferChannel::ALL.len());
        entries.push(wgpu::BindGroupEntry {
            binding: GBufferChannel::Depth.binding(),
            resource: wgpu::BindingResource::TextureView(&self.depth_only_view),
        });
        for channel in GBufferChannel::COLOR {
            entries.push(self.colour_channel(channel).create_bind_group_entry(channel.binding()));
        }

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &entries,
            label: Some("G-buffer bind group"),
        })
    }

    /// Writes the contents of the given CPU-side geometry buffer to the
    /// textures. All pixels of the image must share one depth, which is
    /// written by clearing the depth-stencil texture. The stencil is cleared
    /// to zero.
    ///
    /// # Errors
    /// Returns a [`LightingError::ContractViolation`] if the image dimensions
    /// differ from those of the textures or if the depth varies between
    /// pixels.
    pub fn upload_image(&self, graphics_device: &GraphicsDevice, image: &GBufferImage) -> Result<()> {
        if (image.width(), image.height()) != self.dimensions() {
            return Err(LightingError::contract_violation(format!(
                "G-buffer image is {}x{} but textures are {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ))
            .into());
        }

        let depth = image.texels().first().map_or(1.0, |texel| texel.depth);
        if image.texels().iter().any(|texel| texel.depth != depth) {
            return Err(LightingError::contract_violation(
                "uploaded G-buffer images must have a uniform depth",
            )
            .into());
        }

        for channel in GBufferChannel::COLOR {
            let values = image
                .texels()
                .iter()
                .map(|texel| texel.channel_value(channel));
            let texture = self.colour_channel(channel);
            match channel.texture_format() {
                wgpu::TextureFormat::Rgba32Float => {
                    let texels: Vec<[f32; 4]> = values.map(|value| value.into()).collect();
                    texture.write_bytes(graphics_device, bytemuck::cast_slice(&texels), 16);
                }
                _ => {
                    let texels: Vec<[f16; 4]> = values
                        .map(|value| value.map(f16::from_f32).into())
                        .collect();
                    texture.write_bytes(graphics_device, bytemuck::cast_slice(&texels), 8);
                }
            }
        }

        let mut command_encoder =
            graphics_device
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("G-buffer depth clear encoder"),
                });
        self.record_depth_stencil_clear(&mut command_encoder, depth, 0);
        graphics_device
            .queue()
            .submit(std::iter::once(command_encoder.finish()));

        Ok(())
    }

    /// Records a pass clearing the depth and stencil to the given values.
    pub fn record_depth_stencil_clear(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        depth: fre,
        stencil: u32,
    ) {
        command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.depth_stencil_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(stencil),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("G-buffer depth clear pass"),
        });
    }
}

impl AccumulationTextures {
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if a texture can not be
    /// allocated.
    pub fn new(graphics_device: &GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        Ok(Self {
            diffuse: Texture2D::new(
                graphics_device,
                width,
                height,
                ACCUMULATION_FORMAT,
                usage,
                "Diffuse light accumulation",
            )?,
            specular: Texture2D::new(
                graphics_device,
                width,
                height,
                ACCUMULATION_FORMAT,
                usage,
                "Specular light accumulation",
            )?,
        })
    }
}

impl OcclusionTextures {
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if a texture can not be
    /// allocated.
    pub fn new(graphics_device: &GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        Ok(Self {
            raw: Texture2D::new(
                graphics_device,
                width,
                height,
                OCCLUSION_FORMAT,
                usage,
                "Ambient occlusion",
            )?,
            intermediate: Texture2D::new(
                graphics_device,
                width,
                height,
                OCCLUSION_FORMAT,
                usage,
                "Ambient occlusion blur intermediate",
            )?,
        })
    }
}

/// Creates the output colour texture of the combine pass.
///
/// # Errors
/// Returns a [`LightingError::ResourceCreation`] if the texture can not be
/// allocated.
pub fn create_output_texture(
    graphics_device: &GraphicsDevice,
    width: u32,
    height: u32,
) -> Result<Texture2D> {
    Texture2D::new(
        graphics_device,
        width,
        height,
        OUTPUT_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        "Lighting output",
    )
}

/// Creates the tiled noise texture holding the given random rotation
/// vectors, in row-major order.
///
/// # Errors
/// Returns a [`LightingError::ContractViolation`] if the number of texels
/// does not fill the texture, or a [`LightingError::ResourceCreation`] if the
/// texture can not be allocated.
pub fn create_noise_texture(graphics_device: &GraphicsDevice, texels: &[[fre; 4]]) -> Result<Texture2D> {
    let n_texels = (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE) as usize;
    if texels.len() != n_texels {
        return Err(LightingError::contract_violation(format!(
            "expected {n_texels} noise texels, got {}",
            texels.len()
        ))
        .into());
    }

    let texture = Texture2D::new(
        graphics_device,
        NOISE_TEXTURE_SIZE,
        NOISE_TEXTURE_SIZE,
        NOISE_FORMAT,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        "Ambient occlusion noise",
    )?;
    texture.write_bytes(graphics_device, bytemuck::cast_slice(texels), 16);
    Ok(texture)
}

/// Creates a single-texel black cube texture, bound in place of missing
/// environment maps.
///
/// # Errors
/// Returns a [`LightingError::ResourceCreation`] if the texture can not be
/// allocated.
pub fn create_fallback_environment_map(graphics_device: &GraphicsDevice) -> Result<Texture2D> {
    let texture = Texture2D::with_layers(
        graphics_device,
        1,
        1,
        6,
        FALLBACK_ENVIRONMENT_MAP_FORMAT,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        wgpu::TextureViewDimension::Cube,
        "Fallback environment map",
    )?;

    graphics_device.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: texture.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[0; 4 * 6],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        texture.texture().size(),
    );

    Ok(texture)
}

impl FallbackShadowMaps {
    /// Creates the fallback maps and clears them to the far depth.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`] if a texture can not be
    /// allocated.
    pub fn new(graphics_device: &GraphicsDevice) -> Result<Self> {
        let usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;

        let cascades = Texture2D::with_layers(
            graphics_device,
            1,
            1,
            MAX_SHADOW_CASCADES as u32,
            FALLBACK_SHADOW_MAP_FORMAT,
            usage,
            wgpu::TextureViewDimension::D2Array,
            "Fallback cascaded shadow map",
        )?;
        let cube = Texture2D::with_layers(
            graphics_device,
            1,
            1,
            6,
            FALLBACK_SHADOW_MAP_FORMAT,
            usage,
            wgpu::TextureViewDimension::Cube,
            "Fallback shadow cube map",
        )?;
        let single = Texture2D::new(
            graphics_device,
            1,
            1,
            FALLBACK_SHADOW_MAP_FORMAT,
            usage,
            "Fallback shadow map",
        )?;

        let mut command_encoder =
            graphics_device
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Fallback shadow map clear encoder"),
                });

        for texture in [&cascades, &cube, &single] {
            for layer in 0..texture.texture().depth_or_array_layers() {
                let layer_view = texture.texture().create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &layer_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    label: Some("Fallback shadow map clear pass"),
                });
            }
        }

        graphics_device
            .queue()
            .submit(std::iter::once(command_encoder.finish()));

        Ok(Self {
            cascades,
            cube,
            single,
        })
    }

    /// Returns the fallback view with the dimension expected for shadow maps
    /// of the given kind of light.
    pub fn view_for(&self, kind: LightKind) -> &wgpu::TextureView {
        match kind {
            LightKind::Directional => self.cascades.view(),
            LightKind::Point => self.cube.view(),
            LightKind::Spot => self.single.view(),
        }
    }
}

/// Returns the view dimension expected for shadow maps of the given kind of
/// light.
pub fn shadow_map_view_dimension(kind: LightKind) -> wgpu::TextureViewDimension {
    match kind {
        LightKind::Directional => wgpu::TextureViewDimension::D2Array,
        LightKind::Point => wgpu::TextureViewDimension::Cube,
        LightKind::Spot => wgpu::TextureViewDimension::D2,
    }
}

/// Creates a [`wgpu::BindGroupLayoutEntry`] for a texture with the given
/// binding, visibility, sample type and view dimension.
pub fn create_texture_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

/// Creates a [`wgpu::BindGroupLayoutEntry`] for a sampler with the given
/// binding, visibility and binding type.
pub fn create_sampler_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    binding_type: wgpu::SamplerBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(binding_type),
        count: None,
    }
}

/// Reads back the given texture, which must have a half-precision float
/// format with one or four channels, and returns its texels row by row as
/// four-component vectors. Missing channels are zero.
///
/// # Errors
/// Returns a [`LightingError::ContractViolation`] for unsupported formats
/// and a [`LightingError::ResourceCreation`] if the readback fails.
pub fn read_half_float_texels(
    graphics_device: &GraphicsDevice,
    texture: &Texture2D,
) -> Result<Vec<Vector4<fre>>> {
    let n_channels = match texture.format() {
        wgpu::TextureFormat::Rgba16Float => 4,
        wgpu::TextureFormat::R16Float => 1,
        format => {
            return Err(LightingError::contract_violation(format!(
                "readback of {format:?} textures is not supported"
            ))
            .into());
        }
    };

    let bytes = read_texture_bytes(graphics_device, texture, 2 * n_channels)?;
    let halves: Vec<f16> = bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(halves
        .chunks_exact(n_channels as usize)
        .map(|channels| {
            let mut texel = Vector4::zeros();
            for (component, value) in texel.iter_mut().zip(channels) {
                *component = value.to_f32();
            }
            texel
        })
        .collect())
}

/// Copies the texture into a mappable buffer and returns the tightly packed
/// texel bytes row by row.
fn read_texture_bytes(
    graphics_device: &GraphicsDevice,
    texture: &Texture2D,
    texel_size: u32,
) -> Result<Vec<u8>> {
    let device = graphics_device.device();
    let width = texture.width();
    let height = texture.height();

    let unpadded_bytes_per_row = texel_size * width;
    let padded_bytes_per_row = padded_bytes_per_row(unpadded_bytes_per_row);

    let buffer = graphics_device.create_resource("texture readback buffer", |device| {
        device.create_buffer(&wgpu::BufferDescriptor {
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
            label: Some("Texture readback buffer"),
        })
    })?;

    let mut command_encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Texture copy encoder"),
    });

    command_encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: texture.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture.texture().size(),
    );

    graphics_device
        .queue()
        .submit(std::iter::once(command_encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver outlives the poll below
        let _ = sender.send(result);
    });

    device.poll(wgpu::Maintain::Wait);
    graphics_device.ensure_not_lost()?;

    receiver
        .recv()
        .map_err(|err| LightingError::resource_creation("texture readback", err))?
        .map_err(|err| LightingError::resource_creation("texture readback", err))?;

    let mapped = buffer_slice.get_mapped_range();
    let mut bytes = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    for row in mapped.chunks_exact(padded_bytes_per_row as usize) {
        bytes.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
    }
    drop(mapped);
    buffer.unmap();

    Ok(bytes)
}

fn padded_bytes_per_row(unpadded_bytes_per_row: u32) -> u32 {
    unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}
