//! Flat binary feature dumps.
//!
//! A dump is `[feature_dim][num_images]` followed by `feature_dim * num_images`
//! values, every field a little-endian `f32`. The two counts are stored as
//! floats as well; readers written against the format expect that.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};

use crate::Blob;

pub const HEADER_BYTES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureHeader {
    pub feature_dim: f32,
    pub num_images: f32,
}

impl FeatureHeader {
    /// Header for a blob that will be appended once per iteration.
    pub fn for_blob(blob: &Blob, iterations: usize) -> Result<Self> {
        let num = blob.num();
        ensure!(num > 0, "blob {} has no samples", blob.name());
        Ok(Self {
            feature_dim: (blob.count() / num) as f32,
            num_images: (num * iterations) as f32,
        })
    }
}

/// Appends one blob's values per forward pass to a dump file.
pub struct FeatureDumpWriter {
    path: PathBuf,
    out: BufWriter<File>,
    iterations: usize,
    row_len: Option<usize>,
    rows: usize,
}

impl FeatureDumpWriter {
    pub fn create(path: impl AsRef<Path>, iterations: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to create feature file {}", path.display()))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            iterations,
            row_len: None,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of `append` calls so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Writes the blob's current values, preceded by the header on first use.
    /// Every row must be as long as the first.
    pub fn append(&mut self, blob: &Blob) -> Result<()> {
        match self.row_len {
            None => {
                let header = FeatureHeader::for_blob(blob, self.iterations)?;
                self.write_floats(&[header.feature_dim, header.num_images])?;
                self.row_len = Some(blob.count());
            }
            Some(len) => ensure!(
                blob.count() == len,
                "blob {} changed from {len} to {} values between passes",
                blob.name(),
                blob.count()
            ),
        }
        self.write_floats(&blob.to_host())?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.out
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(self.path)
    }

    fn write_floats(&mut self, values: &[f32]) -> Result<()> {
        for v in values {
            self.out
                .write_all(&v.to_le_bytes())
                .with_context(|| format!("failed to write {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureDump {
    pub header: FeatureHeader,
    pub data: Vec<f32>,
}

impl FeatureDump {
    pub fn feature_dim(&self) -> usize {
        self.header.feature_dim as usize
    }

    pub fn num_images(&self) -> usize {
        self.header.num_images as usize
    }

    /// Values of sample `index`.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let dim = self.feature_dim();
        self.data.get(index * dim..(index + 1) * dim)
    }
}

pub fn read_feature_dump(path: impl AsRef<Path>) -> Result<FeatureDump> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_feature_dump(&bytes).with_context(|| format!("invalid feature file {}", path.display()))
}

pub fn parse_feature_dump(bytes: &[u8]) -> Result<FeatureDump> {
    ensure!(
        bytes.len() >= HEADER_BYTES && bytes.len() % 4 == 0,
        "length {} is not a header plus whole f32 values",
        bytes.len()
    );
    let mut values = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    let header = FeatureHeader {
        feature_dim: values.next().unwrap_or_default(),
        num_images: values.next().unwrap_or_default(),
    };
    let data: Vec<f32> = values.collect();
    let expected = header_count(header.feature_dim, "feature_dim")?
        .checked_mul(header_count(header.num_images, "num_images")?)
        .with_context(|| {
            format!(
                "header {} x {} overflows",
                header.feature_dim, header.num_images
            )
        })?;
    ensure!(
        data.len() == expected,
        "header promises {} x {} values, found {}",
        header.feature_dim,
        header.num_images,
        data.len()
    );
    Ok(FeatureDump { header, data })
}

/// Header counts are floats on disk but must hold whole, non-negative numbers.
fn header_count(value: f32, field: &str) -> Result<usize> {
    ensure!(
        value.is_finite() && value >= 0.0 && value.fract() == 0.0,
        "header {field} {value} is not a count"
    );
    ensure!(
        value < usize::MAX as f32,
        "header {field} {value} is out of range"
    );
    Ok(value as usize)
}
