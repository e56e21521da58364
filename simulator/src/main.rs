use anyhow::Context;
use clap::Parser;
use kadrxcore::iwrf::StreamServer;
use kadrxcore::ShutdownToken;
use log::info;
use std::fs;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{NullSink, RunReport, Runner};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Ka-band DRX acquisition core on simulated hardware")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Pulses to generate; 0 runs until Ctrl+C
    #[arg(long)]
    pulses: Option<u64>,
    /// Stream server port (overrides the workflow file)
    #[arg(long)]
    port: Option<u16>,
    /// Serve the packet stream over TCP instead of discarding it
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Write the run summary as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn write_report(report: &RunReport, path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    fs::write(path, json).with_context(|| format!("writing run report {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // serving streams until Ctrl+C unless a pulse count is given
    let pulses = args.pulses.or(args.serve.then_some(0));
    let workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    }
    .with_overrides(pulses, args.port);

    let shutdown = ShutdownToken::new();
    let runtime = TokioBuilder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    {
        let shutdown = shutdown.clone();
        runtime.spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down");
                shutdown.trigger();
            }
        });
    }

    let runner = Runner::new(workflow_config.clone());
    let report = if args.serve {
        let server = StreamServer::bind(workflow_config.drx.iwrf_server_tcp_port)
            .context("binding stream server")?;
        runner.execute(server, &shutdown)?
    } else {
        runner.execute(NullSink::default(), &shutdown)?
    };

    println!(
        "Run -> pulses {}, streamed {}, gaps {}, AFC {:?}, residual {:.0} Hz",
        report.pulses_generated,
        report.stream.pulses_streamed,
        report.stream.pulse_gaps,
        report.afc_mode,
        report.residual_offset_hz
    );
    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    runtime.shutdown_background();
    Ok(())
}
