//! Graphics device.

use crate::error::LightingError;
use anyhow::{Result, anyhow};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Interface to a connected graphics device.
#[derive(Debug)]
pub struct GraphicsDevice {
    /// The connection to the graphics device.
    device: wgpu::Device,
    /// The queue where we put commands to execute on the device.
    queue: wgpu::Queue,
    /// The adapter used to connect to the device.
    adapter: wgpu::Adapter,
    /// Set when the device reports that it has been lost.
    lost: Arc<AtomicBool>,
}

impl GraphicsDevice {
    /// Opens a connection to a graphics device with the given requirements for
    /// the features and limits of the device. The device does not have to be
    /// compatible with any surface.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A graphics device can not be found.
    /// - The connection request fails.
    pub async fn connect(
        wgpu_instance: &wgpu::Instance,
        required_features: wgpu::Features,
        required_limits: wgpu::Limits,
        memory_hints: wgpu::MemoryHints,
    ) -> Result<Self> {
        let adapter = Self::create_adapter(wgpu_instance).await?;

        let info = adapter.get_info();
        log::info!(
            "Using adapter {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features,
                    required_limits,
                    memory_hints,
                    label: Some("Lighting device"),
                },
                None,
            )
            .await
            .map_err(|err| LightingError::resource_creation("graphics device", err))?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Graphics device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Release);
        });

        Ok(Self {
            device,
            queue,
            adapter,
            lost,
        })
    }

    /// Returns a reference to the underlying [`wgpu::Device`].
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the underlying [`wgpu::Queue`].
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns a reference to the [`wgpu::Adapter`] used to connect to the
    /// device.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Whether the device has reported that it was lost.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// # Errors
    /// Returns a [`LightingError::DeviceLost`] if the device has been lost.
    pub fn ensure_not_lost(&self) -> Result<()> {
        if self.is_lost() {
            Err(LightingError::DeviceLost(
                "the device must be re-acquired with all its resources".to_string(),
            )
            .into())
        } else {
            Ok(())
        }
    }

    /// Runs the given closure, which creates a GPU resource, inside error
    /// scopes catching out-of-memory and validation errors. A caught error
    /// is turned into a [`LightingError::ResourceCreation`] for the named
    /// resource.
    ///
    /// # Errors
    /// See above.
    pub fn create_resource<T>(
        &self,
        resource: &'static str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T> {
        self.scoped(create, |reason| LightingError::resource_creation(resource, reason))
    }

    /// Runs the given closure, which creates a shader module or pipeline,
    /// inside error scopes. A caught error is turned into a
    /// [`LightingError::ShaderBuild`] for the given label.
    ///
    /// # Errors
    /// See above.
    pub fn build_shader_object<T>(
        &self,
        label: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T> {
        self.scoped(create, |reason| {
            LightingError::shader_build(label.to_string(), reason)
        })
    }

    fn scoped<T>(
        &self,
        create: impl FnOnce(&wgpu::Device) -> T,
        to_error: impl FnOnce(String) -> LightingError,
    ) -> Result<T> {
        self.ensure_not_lost()?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let created = create(&self.device);

        let validation_error = pollster::block_on(self.device.pop_error_scope());
        let memory_error = pollster::block_on(self.device.pop_error_scope());

        match validation_error.or(memory_error) {
            Some(error) => Err(to_error(error.to_string()).into()),
            None => Ok(created),
        }
    }

    /// Creates a handle to a graphics device.
    ///
    /// # Errors
    /// Returns an error if no graphics device can be found.
    async fn create_adapter(wgpu_instance: &wgpu::Instance) -> Result<wgpu::Adapter> {
        wgpu_instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                anyhow!(LightingError::resource_creation(
                    "graphics adapter",
                    "no compatible adapter found"
                ))
            })
    }
}
