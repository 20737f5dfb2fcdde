pub mod definition;
pub mod feeder;
pub mod graph;
pub mod mean;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use netprobe_core::{Backend, Blob, Device, Layer, MemoryLocation, Net, NetArtifact, Shape};
use netprobe_proto::onnx::data_type;
use ort::{
    session::{builder::SessionBuilder, Session, SessionInputValue},
    tensor::TensorElementType,
    value::{ValueRef, ValueType},
};
use prost::Message;
use tracing::{debug, info};

pub use definition::{DataConfig, NetDefinition};
pub use feeder::{Batch, DataSource};
pub use graph::{CopyReport, LayerSpec, NetGraph};
pub use mean::load_mean_image;

pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// A network bound to onnxruntime. The session is built lazily on the first
/// forward pass and rebuilt whenever parameters were handed out for writing.
pub struct OrtNet {
    name: String,
    device: Device,
    graph: NetGraph,
    layers: Vec<Layer>,
    blobs: Vec<Blob>,
    inputs: Vec<String>,
    data: Option<DataSource>,
    session: Option<Session>,
    params_dirty: bool,
    // outputs of the last pass that could not be copied out as f32
    unreadable: HashSet<String>,
}

impl Backend for OrtBackend {
    type Net = OrtNet;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &NetArtifact, device: Device) -> Result<Self::Net> {
        let definition = NetDefinition::load(&artifact.definition)?;
        let mut graph = NetGraph::read(&definition.graph)?;

        if let Some(weights) = &artifact.weights {
            let checkpoint = NetGraph::read(weights)?;
            let report = graph
                .copy_trained_from(&checkpoint)
                .with_context(|| format!("failed to copy weights from {}", weights.display()))?;
            info!(
                weights = %weights.display(),
                copied = report.copied,
                added = report.added,
                ignored = report.ignored,
                "copied trained layers"
            );
        }

        let data = definition.data.map(DataSource::open).transpose()?;
        OrtNet::new(
            definition.name.unwrap_or_else(|| graph_name(&graph)),
            graph,
            data,
            device,
        )
    }
}

fn graph_name(graph: &NetGraph) -> String {
    graph.graph().name.clone().unwrap_or_else(|| "net".to_string())
}

impl OrtNet {
    pub fn new(
        name: String,
        graph: NetGraph,
        data: Option<DataSource>,
        device: Device,
    ) -> Result<Self> {
        let location = device.memory_location();

        let mut layers = Vec::new();
        for spec in graph.layer_specs() {
            let params = spec
                .params
                .iter()
                .map(|p| {
                    let (shape, values) = graph.float_initializer(p)?;
                    Blob::placed(p.as_str(), shape, &values, location)
                })
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("failed to load parameters of layer {}", spec.name))?;
            layers.push(Layer {
                name: spec.name,
                kind: spec.kind,
                bottoms: spec.bottoms,
                tops: spec.tops,
                params,
            });
        }

        let inputs: Vec<String> = graph
            .runtime_inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        let mut blobs = Vec::new();
        for blob_name in inputs.iter().map(String::as_str).chain(graph.node_outputs()) {
            if blobs.iter().any(|b: &Blob| b.name() == blob_name) {
                continue;
            }
            let dims = match &data {
                Some(d) if d.input() == blob_name => Some(d.shape().to_vec()),
                _ => graph.declared_dims(blob_name),
            };
            let shape = dims.map_or_else(Shape::unknown, |d| Shape::from_slice(&d));
            blobs.push(Blob::zeros(blob_name, shape, MemoryLocation::Host));
        }
        if let Some(label) = data.as_ref().and_then(DataSource::label_blob) {
            ensure!(
                !blobs.iter().any(|b| b.name() == label),
                "label blob {label} collides with a graph value"
            );
            let batch = data.as_ref().map_or(0, |d| d.shape()[0]);
            blobs.push(Blob::zeros(label, Shape::from_slice(&[batch]), MemoryLocation::Host));
        }

        info!(
            net = %name,
            device = %device,
            layers = layers.len(),
            blobs = blobs.len(),
            "network initialized"
        );
        Ok(Self {
            name,
            device,
            graph,
            layers,
            blobs,
            inputs,
            data,
            session: None,
            params_dirty: false,
            unreadable: HashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &NetGraph {
        &self.graph
    }

    fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() && !self.params_dirty {
            return Ok(());
        }
        write_params(&mut self.graph, &self.layers)?;
        self.params_dirty = false;

        let bytes = self.graph.exposed_model().encode_to_vec();
        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .context("failed to configure ORT session builder")?;
        let builder = configure_session_builder(builder, &self.device)?;
        let session = builder
            .commit_from_memory(&bytes)
            .context("failed to load ONNX model")?;
        debug!(net = %self.name, outputs = session.outputs.len(), "built ORT session");
        self.session = Some(session);
        Ok(())
    }

    fn next_feeds(&mut self) -> Result<(Vec<(String, Batch)>, Option<Vec<f32>>)> {
        let mut feeds = Vec::with_capacity(self.inputs.len());
        let mut labels = None;
        for input in &self.inputs {
            let Some(source) = self.data.as_mut().filter(|d| d.input() == input.as_str()) else {
                bail!("graph input {input} has no data source");
            };
            let elem = self
                .graph
                .runtime_inputs()
                .into_iter()
                .find(|i| i.name() == input.as_str())
                .and_then(|i| i.tensor_type())
                .and_then(|t| t.elem_type);
            ensure!(
                elem.is_none() || elem == Some(data_type::FLOAT),
                "graph input {input} is not a float tensor"
            );
            let batch = source.next_batch()?;
            labels = Some(batch.labels.clone());
            feeds.push((input.clone(), batch));
        }
        Ok((feeds, labels))
    }

    fn set_blob(&mut self, name: &str, dims: &[usize], values: &[f32]) -> Result<()> {
        let Some(blob) = self.blobs.iter_mut().find(|b| b.name() == name) else {
            debug!(blob = name, "dropping output with no matching blob");
            return Ok(());
        };
        blob.reshape_from_host(Shape::from_slice(dims), values)
    }
}

impl Net for OrtNet {
    fn device(&self) -> &Device {
        &self.device
    }

    fn input_blobs(&self) -> Vec<&Blob> {
        self.inputs
            .iter()
            .filter_map(|name| self.blob_by_name(name))
            .collect()
    }

    fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn param_mut(&mut self, layer: usize, param: usize) -> Result<&mut Blob> {
        let layer = self
            .layers
            .get_mut(layer)
            .with_context(|| format!("no layer #{layer}"))?;
        let count = layer.params.len();
        let name = layer.name.clone();
        let blob = layer
            .params
            .get_mut(param)
            .with_context(|| format!("layer {name} has {count} parameter blobs, no #{param}"))?;
        self.params_dirty = true;
        Ok(blob)
    }

    fn forward(&mut self) -> Result<()> {
        self.ensure_session()?;
        let (feeds, labels) = self.next_feeds()?;

        let mut ort_inputs = Vec::with_capacity(feeds.len());
        for (name, batch) in &feeds {
            let value = ort::value::Tensor::from_array((batch.shape.clone(), batch.data.clone()))?
                .into_dyn();
            ort_inputs.push((name.clone(), SessionInputValue::from(value)));
        }

        let session = self.session.as_mut().context("ORT session missing")?;
        let outputs = session.run(ort_inputs)?;
        let mut produced = Vec::with_capacity(outputs.len());
        let mut unreadable = HashSet::new();
        for (name, value) in outputs.iter() {
            match ort_value_to_host(&value) {
                Ok((dims, values)) => produced.push((name.to_string(), dims, values)),
                Err(err) => {
                    debug!(output = name, error = %err, "leaving output unset");
                    unreadable.insert(name.to_string());
                }
            }
        }
        drop(outputs);
        self.unreadable = unreadable;

        for (name, batch) in &feeds {
            self.set_blob(name, &batch.shape, &batch.data)?;
        }
        if let (Some(label), Some(labels)) = (
            self.data
                .as_ref()
                .and_then(DataSource::label_blob)
                .map(str::to_string),
            labels,
        ) {
            self.set_blob(&label, &[labels.len()], &labels)?;
        }
        for (name, dims, values) in produced {
            self.set_blob(&name, &dims, &values)?;
        }
        Ok(())
    }

    fn forward_output(&self, name: &str) -> Result<&Blob> {
        ensure!(
            !self.unreadable.contains(name),
            "blob {name} could not be read after the last forward pass"
        );
        self.blob_by_name(name)
            .with_context(|| format!("Unknown blob name: {name}"))
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        let mut graph = self.graph.clone();
        write_params(&mut graph, &self.layers)?;
        graph.write(path)?;
        info!(net = %self.name, path = %path.display(), "wrote checkpoint");
        Ok(())
    }
}

fn write_params(graph: &mut NetGraph, layers: &[Layer]) -> Result<()> {
    for param in layers.iter().flat_map(|l| l.params.iter()) {
        graph.set_float_initializer(param.name(), &param.to_host())?;
    }
    Ok(())
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("GPU requested but netprobe-backend-ort was built without the `cuda` feature")
    }
}

/// Copies an output to host memory as f32, the element type every blob uses.
/// Booleans become 0 or 1.
fn ort_value_to_host(value: &ValueRef<'_>) -> Result<(Vec<usize>, Vec<f32>)> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let values = match *ty {
        TensorElementType::Float32 => value.try_extract_array::<f32>()?.iter().copied().collect(),
        TensorElementType::Float64 => widen::<f64>(value, |v| v as f32)?,
        TensorElementType::Int64 => widen::<i64>(value, |v| v as f32)?,
        TensorElementType::Int32 => widen::<i32>(value, |v| v as f32)?,
        TensorElementType::Int16 => widen::<i16>(value, f32::from)?,
        TensorElementType::Int8 => widen::<i8>(value, f32::from)?,
        TensorElementType::Uint64 => widen::<u64>(value, |v| v as f32)?,
        TensorElementType::Uint32 => widen::<u32>(value, |v| v as f32)?,
        TensorElementType::Uint16 => widen::<u16>(value, f32::from)?,
        TensorElementType::Uint8 => widen::<u8>(value, f32::from)?,
        TensorElementType::Bool => widen::<bool>(value, |v| if v { 1.0 } else { 0.0 })?,
        _ => bail!("unsupported output tensor element type: {ty:?}"),
    };
    Ok((dims, values))
}

fn widen<T>(value: &ValueRef<'_>, to_f32: impl Fn(T) -> f32) -> Result<Vec<f32>>
where
    T: ort::tensor::PrimitiveTensorElementType + Copy + std::fmt::Debug + 'static,
{
    Ok(value
        .try_extract_array::<T>()?
        .iter()
        .map(|v| to_f32(*v))
        .collect())
}
