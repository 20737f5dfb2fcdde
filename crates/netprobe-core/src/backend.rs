use std::path::Path;

use anyhow::{Context, Result};

use crate::{Blob, Device, NetArtifact};

/// A node of the network graph as the tools see it.
#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub kind: String,
    pub bottoms: Vec<String>,
    pub tops: Vec<String>,
    /// Weights first, then bias, then anything else the layer owns.
    pub params: Vec<Blob>,
}

pub trait Backend {
    type Net: Net;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &NetArtifact, device: Device) -> Result<Self::Net>;
}

pub trait Net {
    fn device(&self) -> &Device;

    /// Blobs fed from outside the graph, in declaration order.
    fn input_blobs(&self) -> Vec<&Blob>;

    /// Every blob the net produces or consumes, in graph order.
    fn blobs(&self) -> &[Blob];

    fn layers(&self) -> &[Layer];

    /// Mutable access to parameter `param` of layer `layer`. Handing this out
    /// marks the net's parameters as changed.
    fn param_mut(&mut self, layer: usize, param: usize) -> Result<&mut Blob>;

    /// Runs one forward pass with whatever inputs the definition supplies.
    fn forward(&mut self) -> Result<()>;

    /// Writes the definition together with the current parameters.
    fn save_checkpoint(&self, path: &Path) -> Result<()>;

    fn blob_names(&self) -> Vec<&str> {
        self.blobs().iter().map(Blob::name).collect()
    }

    fn has_blob(&self, name: &str) -> bool {
        self.blobs().iter().any(|b| b.name() == name)
    }

    fn blob_by_name(&self, name: &str) -> Option<&Blob> {
        self.blobs().iter().find(|b| b.name() == name)
    }

    /// Blob `name` as the last forward pass left it. Fails for unknown names
    /// and for blobs the backend could not read back.
    fn forward_output(&self, name: &str) -> Result<&Blob> {
        self.blob_by_name(name)
            .with_context(|| format!("Unknown blob name: {name}"))
    }

    /// Host copy of the top blobs of layer `name`, concatenated in top order.
    fn layer_features(&self, name: &str) -> Result<Vec<f32>> {
        let layer = &self.layers()[self.layer_index(name)?];
        let mut features = Vec::new();
        for top in &layer.tops {
            features.extend(self.forward_output(top)?.to_host());
        }
        Ok(features)
    }

    fn layer_index(&self, name: &str) -> Result<usize> {
        self.layers()
            .iter()
            .position(|l| l.name == name)
            .with_context(|| format!("Unknown layer name: {name}"))
    }

    fn blob_index(&self, name: &str) -> Result<usize> {
        self.blobs()
            .iter()
            .position(|b| b.name() == name)
            .with_context(|| format!("Unknown blob name: {name}"))
    }
}
