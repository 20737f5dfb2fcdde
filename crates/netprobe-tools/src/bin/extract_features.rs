use std::process::ExitCode;

use anyhow::Result;
use netprobe_backend_ort::OrtBackend;
use netprobe_core::{Backend, Device, NetArtifact};
use netprobe_tools::cli::{parse_or_exit, ExtractCli};
use netprobe_tools::extract::{extract_features, ExtractRequest};
use netprobe_tools::init_tracing;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli: ExtractCli = parse_or_exit();
    init_tracing(&cli.log);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &ExtractCli) -> Result<()> {
    // list mismatches fail before anything is loaded or opened
    let request =
        ExtractRequest::from_lists(cli.iterations as usize, &cli.blob_names, &cli.save_names)?;

    let device = cli.device();
    match &device {
        Device::Cuda { device_id } => info!("Using GPU #{device_id}"),
        Device::Cpu => info!("Using CPU"),
    }

    let backend = OrtBackend::new();
    let mut net = backend.load(
        &NetArtifact::new(&cli.proto_file, &cli.model_file),
        device,
    )?;
    info!(backend = backend.name(), "Running {} iterations.", request.iterations);

    for dump in extract_features(&mut net, &request)? {
        info!(
            blob = %dump.blob,
            path = %dump.path.display(),
            passes = dump.rows,
            "saved features"
        );
    }
    Ok(())
}
