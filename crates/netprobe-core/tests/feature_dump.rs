use anyhow::Result;
use netprobe_core::{
    parse_feature_dump, read_feature_dump, Blob, FeatureDumpWriter, FeatureHeader, Shape,
};

#[test]
fn header_counts_samples_across_iterations() -> Result<()> {
    let blob = Blob::from_host("fc7", Shape::from_slice(&[2, 5]), vec![0.0; 10])?;
    let header = FeatureHeader::for_blob(&blob, 3)?;
    assert_eq!(header.feature_dim, 5.0);
    assert_eq!(header.num_images, 6.0);
    Ok(())
}

#[test]
fn header_rejects_empty_batch() {
    let blob = Blob::zeros(
        "empty",
        Shape::from_slice(&[0, 4]),
        netprobe_core::MemoryLocation::Host,
    );
    assert!(FeatureHeader::for_blob(&blob, 1).is_err());
}

#[test]
fn dump_is_header_then_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("prob.dat");

    let mut writer = FeatureDumpWriter::create(&path, 2)?;
    let first = Blob::from_host("prob", Shape::from_slice(&[1, 10]), (0..10).map(|i| i as f32).collect())?;
    let second = Blob::from_host("prob", Shape::from_slice(&[1, 10]), (10..20).map(|i| i as f32).collect())?;
    writer.append(&first)?;
    writer.append(&second)?;
    assert_eq!(writer.rows(), 2);
    writer.finish()?;

    assert_eq!(std::fs::metadata(&path)?.len(), 8 + 4 * 10 * 2);

    let dump = read_feature_dump(&path)?;
    assert_eq!(dump.header, FeatureHeader { feature_dim: 10.0, num_images: 2.0 });
    assert_eq!(dump.row(1).map(|r| r[0]), Some(10.0));
    assert_eq!(dump.data.len(), 20);
    Ok(())
}

#[test]
fn parse_rejects_truncated_payload() {
    let mut bytes = Vec::new();
    for v in [3.0f32, 2.0, 1.0, 1.0] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    assert!(parse_feature_dump(&bytes).is_err());
    assert!(parse_feature_dump(&bytes[..6]).is_err());
}

#[test]
fn rows_must_keep_their_length() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut writer = FeatureDumpWriter::create(dir.path().join("x.dat"), 2)?;
    writer.append(&Blob::from_host("x", Shape::from_slice(&[1, 2]), vec![1.0, 2.0])?)?;
    let err = writer
        .append(&Blob::from_host("x", Shape::from_slice(&[1, 3]), vec![1.0, 2.0, 3.0])?)
        .unwrap_err();
    assert!(err.to_string().contains("changed from 2 to 3"));
    Ok(())
}

fn le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn parse_rejects_huge_header_without_panicking() {
    let err = parse_feature_dump(&le_bytes(&[1e30, 1e30])).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");

    let err = parse_feature_dump(&le_bytes(&[1e19, 1e19])).unwrap_err();
    assert!(err.to_string().contains("overflows"), "{err}");
}

#[test]
fn parse_rejects_non_integral_header() {
    let mut values = vec![2.5, 4.0];
    values.extend([0.0; 8]);
    let err = parse_feature_dump(&le_bytes(&values)).unwrap_err();
    assert!(err.to_string().contains("feature_dim 2.5 is not a count"), "{err}");

    assert!(parse_feature_dump(&le_bytes(&[-1.0, 0.0])).is_err());
    assert!(parse_feature_dump(&le_bytes(&[f32::NAN, 1.0])).is_err());
}
