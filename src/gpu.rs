//! GPU implementation of the lighting stage.

mod device;
pub mod rendering;
pub mod shader;
pub mod texture;
pub mod uniform;

pub use device::GraphicsDevice;

use anyhow::Result;
use std::sync::Arc;

/// Connects to a graphics device suitable for running the lighting stage
/// without presenting to a surface.
///
/// # Errors
/// See [`GraphicsDevice::connect`].
pub fn connect_headless() -> Result<Arc<GraphicsDevice>> {
    let wgpu_instance = create_wgpu_instance();

    let graphics_device = pollster::block_on(GraphicsDevice::connect(
        &wgpu_instance,
        wgpu::Features::empty(),
        wgpu::Limits::default(),
        wgpu::MemoryHints::Performance,
    ))?;

    Ok(Arc::new(graphics_device))
}

/// Creates a new instance of `wgpu`.
fn create_wgpu_instance() -> wgpu::Instance {
    // Allow all backends
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        ..Default::default()
    })
}
