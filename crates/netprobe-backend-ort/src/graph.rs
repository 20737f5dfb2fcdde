use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use netprobe_core::Shape;
use netprobe_proto::onnx::{GraphProto, ModelProto, TensorProto, ValueInfoProto};
use prost::Message;
use tracing::debug;

/// A node's view of the graph: its name, type, the tensors it reads and writes,
/// and the float initializers it owns.
#[derive(Clone, Debug)]
pub struct LayerSpec {
    pub name: String,
    pub kind: String,
    pub bottoms: Vec<String>,
    pub tops: Vec<String>,
    pub params: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub added: usize,
    pub ignored: usize,
}

/// An ONNX model held in memory so its initializers can be swapped and
/// re-encoded.
#[derive(Clone, Debug)]
pub struct NetGraph {
    // `model.graph` is kept empty; the graph lives beside it.
    model: ModelProto,
    graph: GraphProto,
}

impl NetGraph {
    pub fn from_model(mut model: ModelProto) -> Result<Self> {
        let graph = model.graph.take().context("ONNX model has no graph")?;
        Ok(Self { model, graph })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let model = ModelProto::decode(bytes.as_slice())
            .with_context(|| format!("failed to decode ONNX model {}", path.display()))?;
        Self::from_model(model).with_context(|| format!("invalid ONNX model {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_model().encode_to_vec()
    }

    pub fn to_model(&self) -> ModelProto {
        ModelProto {
            graph: Some(self.graph.clone()),
            ..self.model.clone()
        }
    }

    pub fn graph(&self) -> &GraphProto {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut GraphProto {
        &mut self.graph
    }

    fn initializer(&self, name: &str) -> Option<&TensorProto> {
        self.graph().initializer.iter().find(|t| t.name() == name)
    }

    fn initializer_names(&self) -> HashSet<&str> {
        self.graph().initializer.iter().map(TensorProto::name).collect()
    }

    /// Copies trained tensors from `checkpoint` by name. Same-named tensors
    /// must agree in shape; tensors no node reads are skipped.
    pub fn copy_trained_from(&mut self, checkpoint: &NetGraph) -> Result<CopyReport> {
        let referenced: HashSet<String> = self
            .graph()
            .node
            .iter()
            .flat_map(|n| n.input.iter().cloned())
            .collect();

        let mut report = CopyReport::default();
        for source in &checkpoint.graph().initializer {
            let name = source.name();
            let graph = self.graph_mut();
            match graph.initializer.iter_mut().find(|t| t.name() == name) {
                Some(target) => {
                    ensure!(
                        target.dims == source.dims,
                        "Cannot copy param {name} weights from checkpoint; shape mismatch. \
                         Target shape: {:?}, source shape: {:?}",
                        target.dims,
                        source.dims
                    );
                    *target = source.clone();
                    report.copied += 1;
                }
                None if referenced.contains(name) => {
                    graph.initializer.push(source.clone());
                    report.added += 1;
                }
                None => {
                    debug!(tensor = name, "ignoring checkpoint tensor unknown to the definition");
                    report.ignored += 1;
                }
            }
        }
        Ok(report)
    }

    /// Shape and values of a float initializer.
    pub fn float_initializer(&self, name: &str) -> Result<(Shape, Vec<f32>)> {
        let tensor = self
            .initializer(name)
            .with_context(|| format!("no initializer named {name}"))?;
        decode_float_tensor(tensor)
    }

    pub fn set_float_initializer(&mut self, name: &str, values: &[f32]) -> Result<()> {
        let tensor = self
            .graph_mut()
            .initializer
            .iter_mut()
            .find(|t| t.name() == name)
            .with_context(|| format!("no initializer named {name}"))?;
        ensure!(tensor.is_float(), "initializer {name} is not a float tensor");
        let expected: i64 = tensor.dims.iter().product();
        ensure!(
            expected as usize == values.len(),
            "initializer {name} holds {expected} values, got {}",
            values.len()
        );

        let mut raw = Vec::with_capacity(values.len() * 4);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        tensor.float_data.clear();
        tensor.raw_data = Some(raw);
        Ok(())
    }

    /// Graph inputs that are fed at run time, i.e. not backed by an initializer.
    pub fn runtime_inputs(&self) -> Vec<&ValueInfoProto> {
        let initializers = self.initializer_names();
        self.graph()
            .input
            .iter()
            .filter(|i| !initializers.contains(i.name()))
            .collect()
    }

    /// Every tensor written by some node, in node order.
    pub fn node_outputs(&self) -> Vec<&str> {
        self.graph()
            .node
            .iter()
            .flat_map(|n| n.output.iter())
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Declared dimensions of a value, if the graph states them. A symbolic
    /// leading axis is taken as a batch of one; any other symbolic axis leaves
    /// the shape undeclared.
    pub fn declared_dims(&self, name: &str) -> Option<Vec<usize>> {
        let graph = self.graph();
        let dims = graph
            .input
            .iter()
            .chain(graph.output.iter())
            .chain(graph.value_info.iter())
            .find(|v| v.name() == name)
            .and_then(ValueInfoProto::dims)?;
        dims.into_iter()
            .enumerate()
            .map(|(axis, d)| match (axis, d) {
                (_, Some(d)) => Some(d),
                (0, None) => Some(1),
                _ => None,
            })
            .collect()
    }

    /// One entry per node. Each float initializer is owned by the first node
    /// that reads it.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        let floats: HashSet<&str> = self
            .graph()
            .initializer
            .iter()
            .filter(|t| t.is_float())
            .map(TensorProto::name)
            .collect();
        let initializers = self.initializer_names();
        let mut owned: HashSet<&str> = HashSet::new();

        self.graph()
            .node
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let name = match node.name.as_deref() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => format!("{}_{i}", node.op_type()),
                };
                let mut params = Vec::new();
                let mut bottoms = Vec::new();
                for input in node.input.iter().filter(|s| !s.is_empty()) {
                    if floats.contains(input.as_str()) {
                        if owned.insert(input.as_str()) {
                            params.push(input.clone());
                        }
                    } else if !initializers.contains(input.as_str()) {
                        bottoms.push(input.clone());
                    }
                }
                LayerSpec {
                    name,
                    kind: node.op_type().to_string(),
                    bottoms,
                    tops: node.output.iter().filter(|s| !s.is_empty()).cloned().collect(),
                    params,
                }
            })
            .collect()
    }

    /// The model with every node output promoted to a graph output, so a run
    /// returns all intermediate values.
    pub fn exposed_model(&self) -> ModelProto {
        let mut graph = self.graph.clone();
        let mut exposed: HashSet<String> =
            graph.output.iter().map(|o| o.name().to_string()).collect();
        for name in self.node_outputs() {
            if !exposed.insert(name.to_string()) {
                continue;
            }
            let info = self
                .graph
                .value_info
                .iter()
                .find(|v| v.name() == name)
                .cloned()
                .unwrap_or_else(|| ValueInfoProto {
                    name: Some(name.to_string()),
                    ..Default::default()
                });
            graph.output.push(info);
        }
        ModelProto {
            graph: Some(graph),
            ..self.model.clone()
        }
    }
}

pub fn decode_float_tensor(tensor: &TensorProto) -> Result<(Shape, Vec<f32>)> {
    let name = tensor.name();
    ensure!(tensor.is_float(), "tensor {name} is not a float tensor");
    if tensor.is_external() {
        bail!("tensor {name} keeps its data in an external file, which is not supported");
    }

    let dims = tensor
        .dims
        .iter()
        .map(|d| usize::try_from(*d).with_context(|| format!("tensor {name} has dim {d}")))
        .collect::<Result<Vec<_>>>()?;
    let shape = Shape::from_slice(&dims);

    let values = match &tensor.raw_data {
        Some(raw) if !raw.is_empty() => {
            ensure!(raw.len() % 4 == 0, "tensor {name} has a ragged raw buffer");
            raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        }
        _ => tensor.float_data.clone(),
    };
    ensure!(
        values.len() == shape.numel(),
        "tensor {name} holds {} values for shape {:?}",
        values.len(),
        dims
    );
    Ok((shape, values))
}
