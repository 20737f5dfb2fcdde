use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use tracing::{debug, info};

use crate::definition::DataConfig;
use crate::mean::load_mean_image;

#[derive(Clone, Debug)]
struct Sample {
    path: PathBuf,
    label: f32,
}

/// One forward pass worth of input.
#[derive(Clone, Debug)]
pub struct Batch {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
    pub labels: Vec<f32>,
}

/// Reads fixed-size raw f32 samples from a list file, one batch per forward
/// pass, starting over at the top of the list when it runs out.
pub struct DataSource {
    config: DataConfig,
    samples: Vec<Sample>,
    cursor: usize,
    mean: Option<Vec<f32>>,
}

impl DataSource {
    pub fn open(config: DataConfig) -> Result<Self> {
        let list = std::fs::read_to_string(&config.source)
            .with_context(|| format!("failed to read data source {}", config.source.display()))?;
        let base = config.source.parent().unwrap_or_else(|| Path::new("."));
        let samples = list
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| parse_sample(l, base))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid data source {}", config.source.display()))?;
        ensure!(
            !samples.is_empty(),
            "data source {} lists no samples",
            config.source.display()
        );

        let mean = match &config.mean_file {
            Some(path) => {
                let mean = load_mean_image(path)?;
                ensure!(
                    mean.count() == config.sample_len(),
                    "mean image {} has {} values, samples have {}",
                    path.display(),
                    mean.count(),
                    config.sample_len()
                );
                Some(mean.to_host())
            }
            None => None,
        };

        info!(
            input = %config.input,
            samples = samples.len(),
            batch = config.batch_size(),
            "opened data source"
        );
        Ok(Self {
            config,
            samples,
            cursor: 0,
            mean,
        })
    }

    pub fn input(&self) -> &str {
        &self.config.input
    }

    pub fn label_blob(&self) -> Option<&str> {
        self.config.label.as_deref()
    }

    pub fn shape(&self) -> &[usize] {
        &self.config.shape
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn next_batch(&mut self) -> Result<Batch> {
        let batch_size = self.config.batch_size();
        let sample_len = self.config.sample_len();
        let mut data = Vec::with_capacity(batch_size * sample_len);
        let mut labels = Vec::with_capacity(batch_size);

        for _ in 0..batch_size {
            let sample = &self.samples[self.cursor];
            let values = read_sample(&sample.path, sample_len)?;
            match &self.mean {
                Some(mean) => data.extend(
                    values
                        .iter()
                        .zip(mean)
                        .map(|(v, m)| (v - m) * self.config.scale),
                ),
                None => data.extend(values.iter().map(|v| v * self.config.scale)),
            }
            labels.push(sample.label);

            self.cursor += 1;
            if self.cursor == self.samples.len() {
                debug!(input = %self.config.input, "restarting data source from the top");
                self.cursor = 0;
            }
        }

        Ok(Batch {
            shape: self.config.shape.clone(),
            data,
            labels,
        })
    }
}

fn parse_sample(line: &str, base: &Path) -> Result<Sample> {
    let (path, label) = match line.rsplit_once(char::is_whitespace) {
        Some((path, label)) => match label.parse::<f32>() {
            Ok(label) => (path.trim_end(), label),
            Err(_) => (line, 0.0),
        },
        None => (line, 0.0),
    };
    ensure!(!path.is_empty(), "sample line {line:?} has no path");
    Ok(Sample {
        path: base.join(path),
        label,
    })
}

fn read_sample(path: &Path, sample_len: usize) -> Result<Vec<f32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read sample {}", path.display()))?;
    ensure!(
        bytes.len() == sample_len * 4,
        "sample {} has {} bytes, expected {} f32 values",
        path.display(),
        bytes.len(),
        sample_len
    );
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
