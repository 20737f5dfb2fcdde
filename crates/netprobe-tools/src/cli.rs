use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, ValueEnum};
use netprobe_core::Device;

pub const DEFAULT_DEFINITION: &str = "deploy.onnx";
pub const DEFAULT_WEIGHTS: &str = "model.onnx";
pub const DEFAULT_MEAN_FILE: &str = "imagenet_mean.binaryproto";
pub const DEFAULT_QUERY_LAYER: &str = "conv1";
pub const DEFAULT_QUERY_BLOB: &str = "conv1";
pub const DEFAULT_OUTPUT: &str = "model_new.onnx";

#[derive(Parser, Debug)]
#[command(
    name = "extract_features",
    version,
    about = "Dump named blobs of a network over a number of forward passes"
)]
pub struct ExtractCli {
    /// Network definition (TOML manifest or bare .onnx graph)
    pub proto_file: PathBuf,

    /// Checkpoint holding the trained weights
    pub model_file: PathBuf,

    /// Number of forward passes
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub iterations: u32,

    /// Blobs to dump: blob_name1[,blob_name2,...]
    pub blob_names: String,

    /// Output files, one per blob: save_name1[,save_name2,...]
    pub save_names: String,

    /// Compute mode
    #[arg(value_enum, ignore_case = true, default_value = "cpu")]
    pub mode: ComputeMode,

    /// Accelerator index, used in GPU mode
    #[arg(default_value_t = 0)]
    pub device_id: u32,

    /// Log level (RUST_LOG syntax)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ComputeMode {
    Cpu,
    Gpu,
}

impl ExtractCli {
    pub fn device(&self) -> Device {
        match self.mode {
            ComputeMode::Cpu => Device::Cpu,
            ComputeMode::Gpu => Device::Cuda {
                device_id: self.device_id,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "inspect_net",
    version,
    about = "Print a network's blobs and parameters, tweak one weight and save the result"
)]
pub struct InspectCli {
    /// Network definition (TOML manifest or bare .onnx graph)
    #[arg(long, default_value = DEFAULT_DEFINITION)]
    pub definition: PathBuf,

    /// Checkpoint holding the trained weights
    #[arg(long, default_value = DEFAULT_WEIGHTS)]
    pub weights: PathBuf,

    /// Caffe .binaryproto mean image
    #[arg(long, default_value = DEFAULT_MEAN_FILE)]
    pub mean_file: PathBuf,

    /// Skip the mean image
    #[arg(long)]
    pub no_mean: bool,

    /// Layer whose weights are printed and modified
    #[arg(long, default_value = DEFAULT_QUERY_LAYER)]
    pub layer: String,

    /// Blob whose values are printed
    #[arg(long, default_value = DEFAULT_QUERY_BLOB)]
    pub blob: String,

    /// Where the modified network is written
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Device for inference (cpu or cuda:N)
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Log level (RUST_LOG syntax)
    #[arg(long, default_value = "warn")]
    pub log: String,
}

impl InspectCli {
    pub fn mean_file(&self) -> Option<&PathBuf> {
        (!self.no_mean).then_some(&self.mean_file)
    }
}

/// Parses the command line. Usage errors print the usage and exit with status 1;
/// `--help` and `--version` exit normally.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

pub fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
