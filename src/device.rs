use crate::tensor::Kind;
use crate::{Error, Precision, PrecisionSupport, Result};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Optional shader features that are enabled whenever the adapter offers them.
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::SHADER_F64.union(wgpu::Features::SHADER_F16);

pub(crate) struct DeviceInternal {
    pub(crate) info: wgpu::AdapterInfo,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pipelines: RefCell<HashMap<Precision, Rc<wgpu::ComputePipeline>>>,
}

impl Drop for DeviceInternal {
    fn drop(&mut self) {
        // Let in-flight kernels finish before the device goes away.
        self.device.poll(wgpu::Maintain::Wait);
        log::debug!("released device {}", self.info.name);
    }
}

/// A WebGPU device pinned to one adapter, the device is released when the
/// last clone is dropped.
#[derive(Clone)]
pub struct Device(pub(crate) Rc<DeviceInternal>);

/// Checks a user supplied device index against the number of adapters.
pub fn select_device(index: i64, count: usize) -> Result<usize> {
    match usize::try_from(index) {
        Ok(index) if index < count => Ok(index),
        _ => Err(Error::InvalidDevice(index)),
    }
}

/// Adapters on the primary backends, falling back to the secondary ones (GL,
/// DX11) only when there are none. Enumerating every backend at once would list
/// the same GPU once per API and shift the indexes.
fn adapters(instance: &wgpu::Instance) -> Vec<wgpu::Adapter> {
    with_fallback(instance.enumerate_adapters(wgpu::Backends::PRIMARY), || {
        instance.enumerate_adapters(wgpu::Backends::SECONDARY)
    })
}

fn with_fallback<T>(primary: Vec<T>, fallback: impl FnOnce() -> Vec<T>) -> Vec<T> {
    if primary.is_empty() {
        fallback()
    } else {
        primary
    }
}

/// Backend followed by whichever driver strings the adapter reports.
pub fn backend_version(info: &wgpu::AdapterInfo) -> String {
    let backend = format!("{:?}", info.backend);
    [backend.as_str(), info.driver.trim(), info.driver_info.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Device {
    /// Number of adapters visible on this machine, the valid indexes are `0..count`.
    pub fn count() -> usize {
        adapters(&wgpu::Instance::default()).len()
    }

    pub async fn with_index(index: usize) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = adapters(&instance)
            .into_iter()
            .nth(index)
            .ok_or(Error::InvalidDevice(index as i64))?;
        let info = adapter.get_info();
        log::info!("using adapter {index}: {info:?}");

        // Large FP64 operands need more than the default binding sizes.
        let limits = adapter.limits();
        let features = adapter.features() & OPTIONAL_FEATURES;
        log::info!("requesting features {features:?}");
        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("mbench"),
            required_features: features,
            required_limits: limits,
        };

        let (device, queue) = adapter.request_device(&device_descriptor, None).await?;
        let internal = DeviceInternal {
            info,
            device,
            queue,
            pipelines: RefCell::new(HashMap::new()),
        };
        Ok(Self(Rc::new(internal)))
    }

    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.0.info
    }

    pub fn features(&self) -> wgpu::Features {
        self.0.device.features()
    }

    /// Blocks until all submitted work has completed.
    pub fn synchronize(&self) {
        self.0.device.poll(wgpu::Maintain::Wait);
    }

    /// Returns the gemm pipeline for a precision, compiling it on first use.
    pub(crate) fn gemm_pipeline(&self, precision: Precision) -> Result<Rc<wgpu::ComputePipeline>> {
        if let Some(pipeline) = self.0.pipelines.borrow().get(&precision) {
            return Ok(pipeline.clone());
        }
        let missing = precision.required_features().difference(self.features());
        if !missing.is_empty() {
            return Err(Error::MissingFeatures { precision, missing });
        }
        let source = precision.gemm_source();
        let dev = &self.0.device;
        let cs_module = dev.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(precision.name()),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });
        let pipeline = dev.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(precision.name()),
            layout: None,
            module: &cs_module,
            entry_point: "gemm",
        });
        log::debug!("compiled {precision} gemm pipeline");
        let pipeline = Rc::new(pipeline);
        self.0
            .pipelines
            .borrow_mut()
            .insert(precision, pipeline.clone());
        Ok(pipeline)
    }

    pub(crate) fn storage_buffer<K: Kind>(&self, len: usize, mapped_at_creation: bool) -> wgpu::Buffer {
        self.0.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: (len * K::size_of()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation,
        })
    }

    pub(crate) fn transfer_buffer<K: Kind>(&self, len: usize) -> wgpu::Buffer {
        self.0.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: (len * K::size_of()) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub(crate) fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.0.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        })
    }
}

impl PrecisionSupport for Device {
    /// WebGPU has no bf16 type. bf16 is offered on adapters with native 16-bit
    /// float arithmetic, the hardware class where the format is meaningful.
    fn supports_bf16(&self) -> bool {
        self.features().contains(wgpu::Features::SHADER_F16)
    }
}
