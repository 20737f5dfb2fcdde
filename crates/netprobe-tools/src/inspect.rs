use std::io::Write;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use netprobe_core::{Blob, Net};
use tracing::info;

pub const MUTATED_VALUES: [f32; 2] = [1.1111, 2.2222];

#[derive(Clone, Debug)]
pub struct InspectQuery {
    pub layer: String,
    pub blob: String,
    pub mutated: [f32; 2],
    pub output: PathBuf,
}

fn write_head(out: &mut impl Write, values: &[f32]) -> Result<()> {
    let line = values
        .iter()
        .take(2)
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(out, "{line}")?;
    Ok(())
}

pub fn describe_mean_image(out: &mut impl Write, mean: &Blob) -> Result<()> {
    writeln!(out, "read image mean succeeded")?;
    writeln!(out, "{}", mean.count())?;
    writeln!(out, "{}", mean.shape())?;
    write_head(out, &mean.head(2))
}

pub fn describe_inputs(out: &mut impl Write, net: &impl Net) -> Result<()> {
    writeln!(out, "\nInput blob size:")?;
    for blob in net.input_blobs() {
        writeln!(out, "{}", blob.shape())?;
    }
    Ok(())
}

pub fn describe_layers(out: &mut impl Write, net: &impl Net) -> Result<()> {
    let layers = net.layers();
    writeln!(out, "\n#Layers: {}", layers.len())?;
    for (i, layer) in layers.iter().enumerate() {
        writeln!(
            out,
            "\n[{}] layer name: {}, type: {}",
            i + 1,
            layer.name,
            layer.kind
        )?;
        writeln!(out, "#Blobs: {}", layer.params.len())?;
        for param in &layer.params {
            writeln!(out, "{}", param.shape())?;
            write_head(out, &param.head(2))?;
        }
    }
    Ok(())
}

/// Prints the leading weight and bias values of layer `index`, if it has any.
pub fn describe_layer_params(out: &mut impl Write, net: &impl Net, index: usize) -> Result<()> {
    let layer = net
        .layers()
        .get(index)
        .with_context(|| format!("no layer #{index}"))?;
    if layer.params.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nweights and bias from layer: {}", layer.name)?;
    for param in layer.params.iter().take(2) {
        write_head(out, &param.head(2))?;
    }
    Ok(())
}

/// Copies the layer's weights to a host buffer, overwrites its leading values
/// and writes the buffer back. Returns the leading values read back afterwards.
pub fn mutate_weights<N: Net>(net: &mut N, index: usize, values: &[f32]) -> Result<Vec<f32>> {
    let layer = net
        .layers()
        .get(index)
        .with_context(|| format!("no layer #{index}"))?;
    let name = layer.name.clone();
    ensure!(!layer.params.is_empty(), "layer {name} has no weight blob");

    let weights = net.param_mut(index, 0)?;
    ensure!(
        weights.count() >= values.len(),
        "weights of layer {name} hold {} values, need at least {}",
        weights.count(),
        values.len()
    );
    let mut scratch = weights.to_host();
    scratch[..values.len()].copy_from_slice(values);
    weights.write_from_host(&scratch)?;
    Ok(weights.head(values.len()))
}

pub fn describe_blob(out: &mut impl Write, blob: &Blob) -> Result<()> {
    writeln!(out, "\n#Features: {}", blob.count())?;
    write_head(out, &blob.head(2))
}

/// Walks a loaded net: inputs, every layer's parameters, one layer lookup and
/// weight rewrite, one blob lookup, then saves the modified net.
pub fn inspect_net<N: Net>(net: &mut N, query: &InspectQuery, out: &mut impl Write) -> Result<()> {
    describe_inputs(out, &*net)?;
    describe_layers(out, &*net)?;

    let layer = net.layer_index(&query.layer)?;
    describe_layer_params(out, &*net, layer)?;

    let new_values = mutate_weights(net, layer, &query.mutated)?;
    writeln!(out, "\nnew weights and bias from layer: {}", query.layer)?;
    write_head(out, &new_values)?;

    let blob = net.blob_index(&query.blob)?;
    describe_blob(out, &net.blobs()[blob])?;

    net.save_checkpoint(&query.output)?;
    info!(path = %query.output.display(), "saved modified network");
    writeln!(out, "END")?;
    Ok(())
}
