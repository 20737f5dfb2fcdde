use anyhow::{bail, ensure, Result};
use bytes::Bytes;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl Device {
    /// Where parameter storage lives when a net runs on this device.
    pub fn memory_location(&self) -> MemoryLocation {
        match self {
            Device::Cpu => MemoryLocation::Host,
            Device::Cuda { device_id } => MemoryLocation::Device {
                device_id: *device_id,
            },
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    Host,
    Device { device_id: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    /// Shape of a blob that has not been sized yet.
    pub fn unknown() -> Self {
        Self::from_slice(&[0])
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Axis `index` of the 4-d NCHW view; axes past the rank read as 1.
    pub fn legacy_dim(&self, index: usize) -> usize {
        self.0.get(index).copied().unwrap_or(1)
    }

    pub fn num(&self) -> usize {
        self.legacy_dim(0)
    }

    pub fn channels(&self) -> usize {
        self.legacy_dim(1)
    }

    pub fn height(&self) -> usize {
        self.legacy_dim(2)
    }

    pub fn width(&self) -> usize {
        self.legacy_dim(3)
    }
}

impl std::fmt::Display for Shape {
    /// Tab separated `num channels height width`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.num(),
            self.channels(),
            self.height(),
            self.width()
        )
    }
}

#[derive(Clone, Debug)]
pub struct DeviceBuf {
    pub device_id: u32,
    pub bytes: Bytes, // host-side stand-in for device memory
}

#[derive(Clone, Debug)]
pub enum BlobStorage {
    Host(Vec<f32>),
    Device(DeviceBuf),
}

impl BlobStorage {
    pub fn location(&self) -> MemoryLocation {
        match self {
            BlobStorage::Host(_) => MemoryLocation::Host,
            BlobStorage::Device(buf) => MemoryLocation::Device {
                device_id: buf.device_id,
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            BlobStorage::Host(data) => data.len(),
            BlobStorage::Device(buf) => buf.bytes.len() / 4,
        }
    }
}

/// A named float tensor owned by a net.
#[derive(Clone, Debug)]
pub struct Blob {
    name: String,
    shape: Shape,
    storage: BlobStorage,
}

impl Blob {
    pub fn from_host(name: impl Into<String>, shape: Shape, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        ensure!(
            data.len() == shape.numel(),
            "blob {name}: {} values do not fit shape {:?}",
            data.len(),
            shape.0
        );
        Ok(Self {
            name,
            shape,
            storage: BlobStorage::Host(data),
        })
    }

    /// Zero-filled blob stored at `location`.
    pub fn zeros(name: impl Into<String>, shape: Shape, location: MemoryLocation) -> Self {
        let count = shape.numel();
        let storage = match location {
            MemoryLocation::Host => BlobStorage::Host(vec![0.0; count]),
            MemoryLocation::Device { device_id } => BlobStorage::Device(DeviceBuf {
                device_id,
                bytes: Bytes::from(vec![0u8; count * 4]),
            }),
        };
        Self {
            name: name.into(),
            shape,
            storage,
        }
    }

    /// Builds a blob from host values and places it at `location`.
    pub fn placed(
        name: impl Into<String>,
        shape: Shape,
        data: &[f32],
        location: MemoryLocation,
    ) -> Result<Self> {
        let mut blob = Self::zeros(name, shape, location);
        blob.write_from_host(data)?;
        Ok(blob)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn count(&self) -> usize {
        self.storage.len()
    }

    pub fn num(&self) -> usize {
        self.shape.num()
    }

    pub fn location(&self) -> MemoryLocation {
        self.storage.location()
    }

    pub fn storage(&self) -> &BlobStorage {
        &self.storage
    }

    /// Copies the current values into a fresh host buffer.
    pub fn to_host(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.count()];
        copy_floats(Transfer::ToHost {
            src: &self.storage,
            dst: &mut out,
        });
        out
    }

    /// Overwrites the values in place, wherever they live.
    pub fn write_from_host(&mut self, data: &[f32]) -> Result<()> {
        ensure!(
            data.len() == self.count(),
            "blob {}: cannot write {} values into {} elements",
            self.name,
            data.len(),
            self.count()
        );
        copy_floats(Transfer::FromHost {
            src: data,
            dst: &mut self.storage,
        });
        Ok(())
    }

    /// Replaces shape and values, keeping the memory location.
    pub fn reshape_from_host(&mut self, shape: Shape, data: &[f32]) -> Result<()> {
        if shape.numel() != data.len() {
            bail!(
                "blob {}: {} values do not fit shape {:?}",
                self.name,
                data.len(),
                shape.0
            );
        }
        let location = self.location();
        *self = Self::placed(std::mem::take(&mut self.name), shape, data, location)?;
        Ok(())
    }

    /// Up to the first `n` values, read through the host copy.
    pub fn head(&self, n: usize) -> Vec<f32> {
        let mut values = self.to_host();
        values.truncate(n);
        values
    }
}

enum Transfer<'a> {
    ToHost {
        src: &'a BlobStorage,
        dst: &'a mut [f32],
    },
    FromHost {
        src: &'a [f32],
        dst: &'a mut BlobStorage,
    },
}

/// The one place that knows how to move floats between host and device storage.
fn copy_floats(transfer: Transfer<'_>) {
    match transfer {
        Transfer::ToHost { src, dst } => match src {
            BlobStorage::Host(data) => dst.copy_from_slice(data),
            BlobStorage::Device(buf) => {
                for (out, b) in dst.iter_mut().zip(buf.bytes.chunks_exact(4)) {
                    *out = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
            }
        },
        Transfer::FromHost { src, dst } => match dst {
            BlobStorage::Host(data) => data.copy_from_slice(src),
            BlobStorage::Device(buf) => {
                let mut staged = Vec::with_capacity(src.len() * 4);
                for v in src {
                    staged.extend_from_slice(&v.to_le_bytes());
                }
                buf.bytes = Bytes::from(staged);
            }
        },
    }
}
