use crate::{Device, Error, Precision, Result};
use half::{bf16, f16};
use rand::Rng;
use wgpu::util::DeviceExt;

pub trait Shape {
    fn num_elements(&self) -> usize;
    fn dims(&self) -> Vec<usize>;
}

pub type D2 = (usize, usize);

impl Shape for (usize, usize) {
    fn num_elements(&self) -> usize {
        self.0 * self.1
    }

    fn dims(&self) -> Vec<usize> {
        vec![self.0, self.1]
    }
}

/// Element types that can live in a device tensor.
pub trait Kind: bytemuck::Pod + std::fmt::Debug {
    const PRECISION: Precision;

    fn size_of() -> usize {
        std::mem::size_of::<Self>()
    }

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Kind for f64 {
    const PRECISION: Precision = Precision::F64;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Kind for f32 {
    const PRECISION: Precision = Precision::F32;

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Kind for f16 {
    const PRECISION: Precision = Precision::F16;

    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl Kind for bf16 {
    const PRECISION: Precision = Precision::BF16;

    fn from_f64(v: f64) -> Self {
        bf16::from_f64(v)
    }

    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }
}

/// Samples N(0, 1) with the Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// A simple WebGPU backed tensor.
pub struct Tensor<S: Shape, K: Kind> {
    pub(crate) shape: S,
    pub(crate) data: wgpu::Buffer,
    pub(crate) device: Device,
    pub(crate) phantom: std::marker::PhantomData<K>,
}

pub type Tensor2D<K> = Tensor<D2, K>;

impl<K: Kind> Tensor<D2, K> {
    fn new_uninitialized(
        device: &Device,
        rows: usize,
        cols: usize,
        mapped_at_creation: bool,
    ) -> Result<Self> {
        // Half precision buffers are addressed as u32 words.
        if K::size_of() < 4 && (rows * cols) % 2 != 0 {
            return Err(Error::OddDimension {
                op: "alloc",
                dims: vec![rows, cols],
            });
        }
        let data = device.storage_buffer::<K>(rows * cols, mapped_at_creation);
        Ok(Tensor {
            shape: (rows, cols),
            data,
            phantom: std::marker::PhantomData,
            device: device.clone(),
        })
    }

    /// Uploads row-major `values` to the device.
    pub fn from_slice(device: &Device, rows: usize, cols: usize, values: &[K]) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(Error::DimensionMismatchBinaryOp {
                op: "from_slice",
                lhs: vec![rows, cols],
                rhs: vec![values.len()],
            });
        }
        let tensor = Self::new_uninitialized(device, rows, cols, true)?;
        tensor
            .data
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(values));
        tensor.data.unmap();
        Ok(tensor)
    }

    /// A tensor filled with standard normal samples.
    pub fn randn<R: Rng + ?Sized>(
        device: &Device,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let values: Vec<K> = (0..rows * cols)
            .map(|_| K::from_f64(standard_normal(rng)))
            .collect();
        Self::from_slice(device, rows, cols, &values)
    }

    pub fn dims(&self) -> Vec<usize> {
        self.shape.dims()
    }

    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        let output = Self::new_uninitialized(&self.device, self.shape.0, rhs.shape.1, false)?;
        self.matmul_into(rhs, &output)?;
        Ok(output)
    }

    /// Enqueues `dst = self * rhs` without waiting for the result.
    // TODO: Ensure that the same devices are used in self, rhs and dst.
    pub fn matmul_into(&self, rhs: &Self, dst: &Self) -> Result<()> {
        let (m, k1) = self.shape;
        let (k2, n) = rhs.shape;
        if k1 != k2 || dst.shape != (m, n) {
            return Err(Error::DimensionMismatchBinaryOp {
                op: "gemm",
                lhs: self.shape.dims(),
                rhs: rhs.shape.dims(),
            });
        }
        if k1 % 2 != 0 || n % 2 != 0 {
            return Err(Error::OddDimension {
                op: "gemm",
                dims: vec![m, k1, n],
            });
        }
        let pipeline = self.device.gemm_pipeline(K::PRECISION)?;
        let dev = &self.device.0;
        let param_buffer = dev
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(&[m as u32, k1 as u32, n as u32, 0]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self
            .device
            .create_bind_group(&pipeline, &[&self.data, &rhs.data, &dst.data, &param_buffer]);
        let mut encoder = dev
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut c = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            c.set_pipeline(&pipeline);
            c.set_bind_group(0, &bind_group, &[]);
            c.insert_debug_marker("gemm");
            c.dispatch_workgroups(((n + 31) / 32) as u32, ((m + 15) / 16) as u32, 1);
        };
        dev.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    pub async fn to_vec(&self) -> Result<Vec<K>> {
        let dev = &self.device.0;
        let size = self.shape.num_elements();
        let staging_buffer = self.device.transfer_buffer::<K>(size);
        let mut encoder = dev
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(
            &self.data,
            0,
            &staging_buffer,
            0,
            (size * K::size_of()) as u64,
        );
        dev.queue.submit(Some(encoder.finish()));
        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });
        dev.device.poll(wgpu::Maintain::Wait);

        receiver
            .receive()
            .await
            .ok_or(Error::ReceiverReturnedNone)??;
        let data = buffer_slice.get_mapped_range();
        let result = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();
        Ok(result)
    }
}
