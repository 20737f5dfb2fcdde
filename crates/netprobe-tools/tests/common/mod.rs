#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use netprobe_core::{Blob, Device, Layer, MemoryLocation, Net, Shape};

/// In-memory net: `data[1,3]` feeding `conv1` (weights 2x3, bias 2) with
/// top `conv1[1,10]`, and a parameterless `pool1` with top `pool1[2,5]`.
/// Every forward pass fills the tops with `pass * 100 + index`.
pub struct FakeNet {
    device: Device,
    blobs: Vec<Blob>,
    layers: Vec<Layer>,
    pub forwards: usize,
    /// Blobs that `forward_output` refuses, as if the backend could not read them.
    pub unreadable: Vec<String>,
}

impl FakeNet {
    pub fn new(device: Device) -> Result<Self> {
        let location = device.memory_location();
        let weights = Blob::placed(
            "conv1_w",
            Shape::from_slice(&[2, 3]),
            &[0.5, -0.5, 0.25, 1.0, 2.0, 3.0],
            location,
        )?;
        let bias = Blob::placed("conv1_b", Shape::from_slice(&[2]), &[0.1, 0.2], location)?;
        Ok(Self {
            device,
            blobs: vec![
                Blob::zeros("data", Shape::from_slice(&[1, 3]), MemoryLocation::Host),
                Blob::zeros("conv1", Shape::from_slice(&[1, 10]), MemoryLocation::Host),
                Blob::zeros("pool1", Shape::from_slice(&[2, 5]), MemoryLocation::Host),
            ],
            layers: vec![
                Layer {
                    name: "conv1".to_string(),
                    kind: "Conv".to_string(),
                    bottoms: vec!["data".to_string()],
                    tops: vec!["conv1".to_string()],
                    params: vec![weights, bias],
                },
                Layer {
                    name: "pool1".to_string(),
                    kind: "MaxPool".to_string(),
                    bottoms: vec!["conv1".to_string()],
                    tops: vec!["pool1".to_string()],
                    params: Vec::new(),
                },
            ],
            forwards: 0,
            unreadable: Vec::new(),
        })
    }

    /// Gives `conv1` a single weight so the rewrite step has nothing to work with.
    pub fn with_tiny_weights(mut self) -> Result<Self> {
        let location = self.device.memory_location();
        self.layers[0].params[0] =
            Blob::placed("conv1_w", Shape::from_slice(&[1]), &[7.0], location)?;
        Ok(self)
    }
}

impl Net for FakeNet {
    fn device(&self) -> &Device {
        &self.device
    }

    fn input_blobs(&self) -> Vec<&Blob> {
        self.blobs.iter().take(1).collect()
    }

    fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn param_mut(&mut self, layer: usize, param: usize) -> Result<&mut Blob> {
        self.layers
            .get_mut(layer)
            .and_then(|l| l.params.get_mut(param))
            .context("no such parameter")
    }

    fn forward(&mut self) -> Result<()> {
        self.forwards += 1;
        let pass = self.forwards as f32;
        for blob in self.blobs.iter_mut().skip(1) {
            let values: Vec<f32> = (0..blob.count()).map(|i| pass * 100.0 + i as f32).collect();
            blob.write_from_host(&values)?;
        }
        Ok(())
    }

    fn forward_output(&self, name: &str) -> Result<&Blob> {
        if self.unreadable.iter().any(|n| n == name) {
            bail!("blob {name} could not be read after the last forward pass");
        }
        self.blob_by_name(name).context("no such blob")
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            bail!("empty checkpoint path");
        }
        let mut text = String::new();
        for param in self.layers.iter().flat_map(|l| &l.params) {
            writeln!(text, "{} {:?}", param.name(), param.to_host())?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}
