mod common;

use anyhow::{Context, Result};
use netprobe_backend_ort::OrtBackend;
use netprobe_core::{Backend, Device, Net, NetArtifact};

use common::{masked_model, write_manifest, write_model, write_net_pair, TRAINED_B, TRAINED_W};

fn blob_values(net: &impl Net, name: &str) -> Result<Vec<f32>> {
    Ok(net
        .blob_by_name(name)
        .with_context(|| format!("missing blob {name}"))?
        .to_host())
}

#[test]
fn forward_fills_intermediate_blobs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_, trained) = write_net_pair(dir.path())?;
    let manifest = write_manifest(dir.path(), "deploy.onnx")?;

    let mut net = OrtBackend::new().load(&NetArtifact::new(&manifest, &trained), Device::Cpu)?;
    assert_eq!(net.name(), "fc-relu");
    assert!(net.has_blob("label"));

    net.forward()?;
    assert_eq!(blob_values(&net, "data")?, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(blob_values(&net, "fc1")?, vec![1.5, 2.0, -3.0]);
    assert_eq!(blob_values(&net, "relu1")?, vec![1.5, 2.0, 0.0]);
    assert_eq!(blob_values(&net, "label")?, vec![3.0]);
    let fc1 = net.blob_by_name("fc1").context("fc1")?;
    assert_eq!(fc1.shape().0.as_slice(), &[1, 3]);

    net.forward()?;
    assert_eq!(blob_values(&net, "fc1")?, vec![5.5, 6.0, -7.0]);
    assert_eq!(net.layer_features("relu1")?, vec![5.5, 6.0, 0.0]);
    assert_eq!(blob_values(&net, "label")?, vec![7.0]);

    // two samples, so the third pass starts over
    net.forward()?;
    assert_eq!(blob_values(&net, "relu1")?, vec![1.5, 2.0, 0.0]);
    Ok(())
}

#[test]
fn forward_sees_written_parameters() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_, trained) = write_net_pair(dir.path())?;
    let manifest = write_manifest(dir.path(), "deploy.onnx")?;
    let mut net = OrtBackend::new().load(&NetArtifact::new(&manifest, &trained), Device::Cpu)?;

    net.forward()?;
    assert_eq!(blob_values(&net, "fc1")?[0], 1.5);

    let bias = net.param_mut(0, 1)?;
    bias.write_from_host(&[10.0, 0.0, 0.0])?;

    net.forward()?;
    assert_eq!(blob_values(&net, "fc1")?, vec![15.0, 6.0, -7.0]);
    Ok(())
}

#[test]
fn bare_graph_has_nothing_to_feed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (deploy, trained) = write_net_pair(dir.path())?;
    let mut net = OrtBackend::new().load(&NetArtifact::new(&deploy, &trained), Device::Cpu)?;

    let err = net.forward().unwrap_err();
    assert_eq!(err.to_string(), "graph input data has no data source");
    Ok(())
}

#[test]
fn non_float_intermediates_do_not_break_the_pass() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_model(&dir.path().join("masked.onnx"), &masked_model(&TRAINED_W, &TRAINED_B))?;
    let manifest = write_manifest(dir.path(), "masked.onnx")?;
    let mut net = OrtBackend::new().load(&NetArtifact::definition_only(&manifest), Device::Cpu)?;

    net.forward()?;
    assert_eq!(blob_values(&net, "relu1")?, vec![1.5, 2.0, 0.0]);
    assert_eq!(net.forward_output("mask")?.to_host(), vec![1.0, 1.0, 0.0]);

    // float16 has no f32 conversion; only asking for it fails
    let err = net.forward_output("half").unwrap_err();
    assert!(err.to_string().contains("could not be read"), "{err}");
    assert!(net.forward_output("relu1").is_ok());
    Ok(())
}
