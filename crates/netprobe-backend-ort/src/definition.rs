use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

/// On-disk network definition: an ONNX graph plus the data source that feeds it.
///
/// ```toml
/// name = "CaffeNet"
/// graph = "caffenet.onnx"
///
/// [data]
/// input = "data"
/// source = "file_list.txt"
/// shape = [1, 3, 227, 227]
/// mean_file = "imagenet_mean.binaryproto"
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub graph: PathBuf,
    #[serde(default)]
    pub data: Option<DataConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Graph input this source feeds.
    pub input: String,
    /// List file, one `<path> [label]` per line.
    pub source: PathBuf,
    /// Batch size followed by the per-sample dimensions.
    pub shape: Vec<usize>,
    #[serde(default)]
    pub mean_file: Option<PathBuf>,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    /// Blob that receives the labels of the current batch.
    #[serde(default)]
    pub label: Option<String>,
}

fn unit_scale() -> f32 {
    1.0
}

impl DataConfig {
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

impl NetDefinition {
    /// Reads a definition. A path ending in `.onnx` is taken as a bare graph
    /// without a data source. Relative paths inside a manifest resolve against
    /// the manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("onnx")) {
            return Ok(Self {
                name: None,
                graph: path.to_path_buf(),
                data: None,
            });
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read net definition {}", path.display()))?;
        let mut def = Self::parse(&text)
            .with_context(|| format!("invalid net definition {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        def.graph = base.join(&def.graph);
        if let Some(data) = def.data.as_mut() {
            data.source = base.join(&data.source);
            if let Some(mean) = data.mean_file.as_mut() {
                *mean = base.join(&*mean);
            }
        }
        Ok(def)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let def: Self = toml::from_str(text)?;
        if let Some(data) = &def.data {
            ensure!(
                data.shape.len() >= 2,
                "data shape needs a batch size and at least one sample dimension"
            );
            ensure!(
                data.shape.iter().all(|d| *d > 0),
                "data shape {:?} has an empty axis",
                data.shape
            );
        }
        Ok(def)
    }
}
