use std::process::ExitCode;

use anyhow::Result;
use netprobe_backend_ort::{load_mean_image, OrtBackend};
use netprobe_core::{Backend, NetArtifact};
use netprobe_tools::cli::{parse_device, parse_or_exit, InspectCli};
use netprobe_tools::init_tracing;
use netprobe_tools::inspect::{describe_mean_image, inspect_net, InspectQuery, MUTATED_VALUES};
use tracing::error;

fn main() -> ExitCode {
    let cli: InspectCli = parse_or_exit();
    init_tracing(&cli.log);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &InspectCli) -> Result<()> {
    let device = parse_device(&cli.device)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(path) = cli.mean_file() {
        let mean = load_mean_image(path)?;
        describe_mean_image(&mut out, &mean)?;
    }

    let mut net = OrtBackend::new().load(&NetArtifact::new(&cli.definition, &cli.weights), device)?;

    let query = InspectQuery {
        layer: cli.layer.clone(),
        blob: cli.blob.clone(),
        mutated: MUTATED_VALUES,
        output: cli.output.clone(),
    };
    inspect_net(&mut net, &query, &mut out)
}
