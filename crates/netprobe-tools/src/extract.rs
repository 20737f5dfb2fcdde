use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use netprobe_core::{FeatureDumpWriter, Net};
use tracing::debug;

/// One blob and the file it is dumped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureTarget {
    pub blob: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ExtractRequest {
    pub iterations: usize,
    pub targets: Vec<FeatureTarget>,
}

#[derive(Clone, Debug)]
pub struct DumpSummary {
    pub blob: String,
    pub path: PathBuf,
    pub rows: usize,
}

pub fn split_names(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}

impl ExtractRequest {
    /// Pairs comma separated blob names with comma separated output files.
    pub fn from_lists(iterations: usize, blob_names: &str, save_names: &str) -> Result<Self> {
        ensure!(iterations > 0, "iterations must be at least 1");
        let blobs = split_names(blob_names);
        let files = split_names(save_names);
        ensure!(
            blobs.len() == files.len(),
            "the number of feature blob names and save file names must be equal ({} vs {})",
            blobs.len(),
            files.len()
        );
        ensure!(
            blobs.iter().chain(&files).all(|s| !s.is_empty()),
            "blob and file name lists must not contain empty entries"
        );
        let mut seen = HashSet::new();
        for file in &files {
            ensure!(seen.insert(file.as_str()), "file {file} is listed twice");
        }

        Ok(Self {
            iterations,
            targets: blobs
                .into_iter()
                .zip(files)
                .map(|(blob, file)| FeatureTarget {
                    blob,
                    path: PathBuf::from(file),
                })
                .collect(),
        })
    }
}

pub fn check_blobs(net: &impl Net, request: &ExtractRequest) -> Result<()> {
    for target in &request.targets {
        ensure!(
            net.has_blob(&target.blob),
            "Unknown feature blob name {} in the network",
            target.blob
        );
    }
    Ok(())
}

/// Runs `request.iterations` forward passes and appends every requested blob
/// to its file after each one. Names are checked and files created before the
/// first pass.
pub fn extract_features<N: Net>(net: &mut N, request: &ExtractRequest) -> Result<Vec<DumpSummary>> {
    check_blobs(&*net, request)?;

    let mut writers = request
        .targets
        .iter()
        .map(|t| FeatureDumpWriter::create(&t.path, request.iterations))
        .collect::<Result<Vec<_>>>()?;

    for i in 0..request.iterations {
        net.forward()
            .with_context(|| format!("forward pass {} of {} failed", i + 1, request.iterations))?;
        for (target, writer) in request.targets.iter().zip(writers.iter_mut()) {
            let blob = net.forward_output(&target.blob)?;
            writer.append(blob)?;
        }
        debug!(iteration = i + 1, "appended features");
    }

    writers
        .into_iter()
        .zip(&request.targets)
        .map(|(writer, target)| {
            let rows = writer.rows();
            let path = writer.finish()?;
            Ok(DumpSummary {
                blob: target.blob.clone(),
                path,
                rows,
            })
        })
        .collect()
}
