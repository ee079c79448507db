use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jarsmith::{init_tracing, Pipeline, PipelineConfig, PipelineResult, ProvisionResult};

#[derive(Parser, Debug)]
#[command(name = "jarsmith", version, about = "Provision game jars for a build")]
struct Cli {
    /// JSON run configuration.
    #[arg(short, long, default_value = "jarsmith.json")]
    config: PathBuf,
    /// Ignore cached stage outputs.
    #[arg(long)]
    refresh: bool,
    /// Never touch the network.
    #[arg(long)]
    offline: bool,
    /// Print the result as JSON instead of plain lines.
    #[arg(long)]
    json: bool,
}

async fn provision(cli: &Cli) -> PipelineResult<ProvisionResult> {
    let mut config = PipelineConfig::load(&cli.config)?;
    config.refresh |= cli.refresh;
    config.offline |= cli.offline;
    Pipeline::new(config)?.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match provision(&cli).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Provisioning failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if result.fully_cached() {
        tracing::info!("All stages reused cached output");
    }

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                tracing::error!("Could not serialise result: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for published in &result.jars {
            println!("{}\t{}", published.notation, published.jar.path().display());
        }
    }
    ExitCode::SUCCESS
}
