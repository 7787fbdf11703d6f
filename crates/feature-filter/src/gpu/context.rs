use anyhow::{anyhow, bail, Result};

/// Headless device and queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter."))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "GPU adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Feature Filter Device"),
                    required_features: wgpu::Features::empty(),
                    // Keep the adapter's uniform budget; it bounds how many oids can be hidden.
                    required_limits: wgpu::Limits {
                        max_uniform_buffer_binding_size: adapter.limits().max_uniform_buffer_binding_size,
                        ..wgpu::Limits::default()
                    },
                },
                None,
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Number of `vec4<f32>` uniforms one binding can hold.
    pub fn uniform_vector_limit(&self) -> usize {
        self.device.limits().max_uniform_buffer_binding_size as usize / 16
    }

    /// Runs `f` inside a validation error scope and fails if wgpu reported anything.
    pub async fn validated<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        if let Some(err) = self.device.pop_error_scope().await {
            bail!("wgpu validation failed: {err}");
        }
        out
    }
}
