#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use netprobe_proto::onnx::{
    data_type, tensor_shape_proto, type_proto, AttributeProto, GraphProto, ModelProto, NodeProto,
    OperatorSetIdProto, TensorProto, TensorShapeProto, TypeProto, ValueInfoProto,
};
use prost::Message;

pub const TRAINED_W: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, -1.0, 0.0,
];
pub const TRAINED_B: [f32; 3] = [0.5, 0.0, 0.0];

pub fn float_tensor(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for v in values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    TensorProto {
        name: Some(name.to_string()),
        dims: dims.to_vec(),
        data_type: Some(data_type::FLOAT),
        raw_data: Some(raw),
        ..Default::default()
    }
}

pub fn value_info(name: &str, dims: &[i64]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| tensor_shape_proto::Dimension {
            value: Some(tensor_shape_proto::dimension::Value::DimValue(*d)),
            denotation: None,
        })
        .collect();
    ValueInfoProto {
        name: Some(name.to_string()),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: Some(data_type::FLOAT),
                shape: Some(TensorShapeProto { dim }),
            })),
            denotation: None,
        }),
        doc_string: None,
    }
}

/// `data[1,4] -> Gemm(fc1, transB) -> fc1[1,3] -> Relu -> relu1[1,3]`.
pub fn fc_relu_model(weights: &[f32], bias: &[f32]) -> ModelProto {
    let gemm = NodeProto {
        name: Some("fc1".to_string()),
        op_type: Some("Gemm".to_string()),
        input: vec!["data".into(), "fc1_w".into(), "fc1_b".into()],
        output: vec!["fc1".into()],
        attribute: vec![AttributeProto {
            name: Some("transB".to_string()),
            r#type: Some(2),
            i: Some(1),
            ..Default::default()
        }],
        ..Default::default()
    };
    let relu = NodeProto {
        name: Some("relu1".to_string()),
        op_type: Some("Relu".to_string()),
        input: vec!["fc1".into()],
        output: vec!["relu1".into()],
        ..Default::default()
    };
    ModelProto {
        ir_version: Some(8),
        opset_import: vec![OperatorSetIdProto {
            domain: Some(String::new()),
            version: Some(13),
        }],
        producer_name: Some("netprobe-tests".to_string()),
        graph: Some(GraphProto {
            name: Some("fc_relu".to_string()),
            node: vec![gemm, relu],
            initializer: vec![
                float_tensor("fc1_w", &[3, 4], weights),
                float_tensor("fc1_b", &[3], bias),
            ],
            input: vec![value_info("data", &[1, 4])],
            output: vec![value_info("relu1", &[1, 3])],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `fc_relu_model` plus two side branches off `relu1`: a boolean
/// `mask = relu1 > 0` and a float16 `half = Cast(relu1)`.
pub fn masked_model(weights: &[f32], bias: &[f32]) -> ModelProto {
    let mut model = fc_relu_model(weights, bias);
    if let Some(graph) = model.graph.as_mut() {
        graph.node.push(NodeProto {
            name: Some("gt".to_string()),
            op_type: Some("Greater".to_string()),
            input: vec!["relu1".into(), "zero".into()],
            output: vec!["mask".into()],
            ..Default::default()
        });
        graph.node.push(NodeProto {
            name: Some("to_half".to_string()),
            op_type: Some("Cast".to_string()),
            input: vec!["relu1".into()],
            output: vec!["half".into()],
            attribute: vec![AttributeProto {
                name: Some("to".to_string()),
                r#type: Some(2),
                i: Some(10),
                ..Default::default()
            }],
            ..Default::default()
        });
        graph.initializer.push(float_tensor("zero", &[], &[0.0]));
    }
    model
}

pub fn write_model(path: &Path, model: &ModelProto) -> Result<PathBuf> {
    std::fs::write(path, model.encode_to_vec())?;
    Ok(path.to_path_buf())
}

/// Untrained definition plus trained checkpoint.
pub fn write_net_pair(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let deploy = write_model(&dir.join("deploy.onnx"), &fc_relu_model(&[0.0; 12], &[0.0; 3]))?;
    let trained = write_model(&dir.join("trained.onnx"), &fc_relu_model(&TRAINED_W, &TRAINED_B))?;
    Ok((deploy, trained))
}

pub fn write_sample(path: &Path, values: &[f32]) -> Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Manifest feeding `data` from two labelled samples, one per pass.
pub fn write_manifest(dir: &Path, graph: &str) -> Result<PathBuf> {
    write_sample(&dir.join("a.bin"), &[1.0, 2.0, 3.0, 4.0])?;
    write_sample(&dir.join("b.bin"), &[5.0, 6.0, 7.0, 8.0])?;
    std::fs::write(dir.join("file_list.txt"), "a.bin 3\nb.bin 7\n")?;

    let manifest = dir.join("net.toml");
    std::fs::write(
        &manifest,
        format!(
            r#"name = "fc-relu"
graph = "{graph}"

[data]
input = "data"
source = "file_list.txt"
shape = [1, 4]
label = "label"
"#
        ),
    )?;
    Ok(manifest)
}
