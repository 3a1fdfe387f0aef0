//! Management of uniform buffers for rendering.

use crate::gpu::GraphicsDevice;
use anyhow::Result;
use bytemuck::Pod;
use std::{marker::PhantomData, mem, num::NonZeroU64};
use wgpu::util::DeviceExt;

/// GPU buffer for a single uniform of type `U`.
#[derive(Debug)]
pub struct SingleUniformGPUBuffer<U> {
    buffer: wgpu::Buffer,
    _phantom: PhantomData<U>,
}

/// GPU buffer for a sequence of uniforms of type `U`, where each uniform
/// starts at an offset satisfying the device's alignment for dynamic uniform
/// offsets. One uniform is bound at a time by passing its offset when
/// setting the bind group.
///
/// The buffer is grown on demand, but never shrunk.
#[derive(Debug)]
pub struct DynamicUniformGPUBuffer<U> {
    buffer: wgpu::Buffer,
    stride: u64,
    capacity: usize,
    staging: Vec<u8>,
    label: &'static str,
    _phantom: PhantomData<U>,
}

impl<U: Pod> SingleUniformGPUBuffer<U> {
    /// Creates a new uniform buffer initialized with the given uniform.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`](crate::LightingError)
    /// if the buffer can not be allocated.
    pub fn new(graphics_device: &GraphicsDevice, uniform: &U, label: &'static str) -> Result<Self> {
        let buffer = graphics_device.create_resource(label, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                contents: bytemuck::bytes_of(uniform),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                label: Some(label),
            })
        })?;
        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Queues a write of the given uniform to the buffer.
    pub fn update(&self, graphics_device: &GraphicsDevice, uniform: &U) {
        graphics_device
            .queue()
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniform));
    }

    /// Creates the bind group layout entry for the uniform, assigned to the
    /// given binding and visible in the given stages.
    pub fn create_bind_group_layout_entry(
        binding: u32,
        visibility: wgpu::ShaderStages,
    ) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: uniform_size::<U>(),
            },
            count: None,
        }
    }

    /// Creates a bind group entry for the uniform.
    pub fn create_bind_group_entry(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: self.buffer.as_entire_binding(),
        }
    }
}

impl<U: Pod> DynamicUniformGPUBuffer<U> {
    /// Creates a new buffer with room for the given number of uniforms.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`](crate::LightingError)
    /// if the buffer can not be allocated.
    pub fn new(graphics_device: &GraphicsDevice, capacity: usize, label: &'static str) -> Result<Self> {
        let alignment = u64::from(
            graphics_device
                .device()
                .limits()
                .min_uniform_buffer_offset_alignment,
        );
        let stride = aligned_stride(mem::size_of::<U>() as u64, alignment);
        let capacity = capacity.max(1);
        let buffer = Self::create_buffer(graphics_device, stride, capacity, label)?;

        Ok(Self {
            buffer,
            stride,
            capacity,
            staging: Vec::new(),
            label,
            _phantom: PhantomData,
        })
    }

    /// Distance in bytes between the starts of consecutive uniforms.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the dynamic offset to bind the uniform with the given index.
    pub fn dynamic_offset(&self, idx: usize) -> u32 {
        (idx as u64 * self.stride) as u32
    }

    /// Queues writes of the given uniforms to the buffer, growing the buffer
    /// if it can not hold them all. Growing replaces the underlying buffer,
    /// so bind groups must be created after calling this.
    ///
    /// # Errors
    /// Returns a [`LightingError::ResourceCreation`](crate::LightingError)
    /// if a larger buffer can not be allocated.
    pub fn upload(&mut self, graphics_device: &GraphicsDevice, uniforms: &[U]) -> Result<()> {
        if uniforms.is_empty() {
            return Ok(());
        }

        if uniforms.len() > self.capacity {
            let capacity = uniforms.len().next_power_of_two();
            log::debug!(
                "Growing {} from {} to {} uniforms",
                self.label,
                self.capacity,
                capacity
            );
            self.buffer = Self::create_buffer(graphics_device, self.stride, capacity, self.label)?;
            self.capacity = capacity;
        }

        fill_strided_bytes(&mut self.staging, uniforms, self.stride as usize);
        graphics_device
            .queue()
            .write_buffer(&self.buffer, 0, &self.staging);
        Ok(())
    }

    /// Creates the bind group layout entry for one uniform in the buffer,
    /// assigned to the given binding and visible in the given stages.
    pub fn create_bind_group_layout_entry(
        binding: u32,
        visibility: wgpu::ShaderStages,
    ) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: uniform_size::<U>(),
            },
            count: None,
        }
    }

    /// Creates a bind group entry exposing one uniform-sized window of the
    /// buffer, to be positioned with [`Self::dynamic_offset`].
    pub fn create_bind_group_entry(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &self.buffer,
                offset: 0,
                size: uniform_size::<U>(),
            }),
        }
    }

    fn create_buffer(
        graphics_device: &GraphicsDevice,
        stride: u64,
        capacity: usize,
        label: &'static str,
    ) -> Result<wgpu::Buffer> {
        graphics_device.create_resource(label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                size: stride * capacity as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
                label: Some(label),
            })
        })
    }
}

/// Rounds the given uniform size up to the nearest multiple of the
/// alignment.
pub fn aligned_stride(uniform_size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    uniform_size.div_ceil(alignment) * alignment
}

fn uniform_size<U>() -> Option<NonZeroU64> {
    NonZeroU64::new(mem::size_of::<U>() as u64)
}

/// Writes the bytes of each uniform to `bytes` at multiples of `stride`,
/// zeroing the gaps.
fn fill_strided_bytes<U: Pod>(bytes: &mut Vec<u8>, uniforms: &[U], stride: usize) {
    bytes.clear();
    bytes.resize(stride * uniforms.len(), 0);
    for (chunk, uniform) in bytes.chunks_exact_mut(stride).zip(uniforms) {
        let uniform_bytes = bytemuck::bytes_of(uniform);
        chunk[..uniform_bytes.len()].copy_from_slice(uniform_bytes);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::light::LightUniform;

    #[test]
    fn should_round_stride_up_to_alignment() {
        assert_eq!(aligned_stride(416, 256), 512);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(1, 256), 256);
        assert_eq!(aligned_stride(20, 0), 20);
    }

    #[test]
    fn should_fit_light_uniform_in_two_default_alignment_slots() {
        let stride = aligned_stride(mem::size_of::<LightUniform>() as u64, 256);
        assert_eq!(stride, 512);
    }

    #[test]
    fn should_place_uniforms_at_stride_offsets() {
        let mut bytes = vec![1; 3];
        fill_strided_bytes(&mut bytes, &[[7_u32; 2], [9_u32; 2]], 16);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &7_u32.to_ne_bytes());
        assert!(bytes[8..16].iter().all(|&b| b == 0));
        assert_eq!(&bytes[16..20], &9_u32.to_ne_bytes());
    }
}
