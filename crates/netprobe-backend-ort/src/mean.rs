use std::path::Path;

use anyhow::{ensure, Context, Result};
use netprobe_core::{Blob, Shape};
use netprobe_proto::caffe::BlobProto;
use prost::Message;

/// Loads a Caffe `.binaryproto` mean image into a host blob named `mean`.
pub fn load_mean_image(path: &Path) -> Result<Blob> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read image mean failed: {}", path.display()))?;
    let proto = BlobProto::decode(bytes.as_slice())
        .with_context(|| format!("read image mean failed: {} is not a BlobProto", path.display()))?;
    blob_from_proto("mean", &proto).with_context(|| format!("invalid mean image {}", path.display()))
}

pub fn blob_from_proto(name: &str, proto: &BlobProto) -> Result<Blob> {
    let dims = proto
        .dims()
        .into_iter()
        .map(|d| usize::try_from(d).with_context(|| format!("negative dimension {d}")))
        .collect::<Result<Vec<_>>>()?;

    let data = if proto.data.is_empty() {
        proto.double_data.iter().map(|v| *v as f32).collect()
    } else {
        proto.data.clone()
    };

    let shape = Shape::from_slice(&dims);
    ensure!(
        data.len() == shape.numel(),
        "{} values do not fill shape {:?}",
        data.len(),
        dims
    );
    Blob::from_host(name, shape, data)
}
