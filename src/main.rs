// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use kinetic_flow::kinetic::config::EngineConfig;
use kinetic_flow::kinetic::nodes::builtin_registry;
use kinetic_flow::kinetic::server;
use kinetic_flow::kinetic::workflow::loader::FlowLoader;
use kinetic_flow::kinetic::workflow::Engine;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow file to completion or its first pause
    Run {
        /// Path to the flow file (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Run input as JSON
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    /// Validate a flow file and print its execution order
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Serve the HTTP trigger surface
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of flow files to load
        #[arg(long)]
        flows: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut config = EngineConfig::from_env()?;

    match args.command {
        Commands::Run { file, input } => {
            env_logger::init();
            let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
            let flow = FlowLoader::new()
                .load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;

            let engine = Engine::new(builtin_registry(&config)?, &config);
            let flow_id = flow.id.clone();
            engine.register_flow(flow).await?;

            let state = engine.start_run(&flow_id, input).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Validate { file } => {
            env_logger::init();
            let flow = FlowLoader::new()
                .load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;

            let engine = Engine::new(builtin_registry(&config)?, &config);
            let order = engine.validate(flow)?;
            println!("Execution order:");
            for (i, node_id) in order.iter().enumerate() {
                println!("  {}. {}", i + 1, node_id);
            }
        }
        Commands::Serve { port, flows } => {
            server::init_tracing();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(flows) = flows {
                config.flows_dir = flows;
            }

            let engine = Engine::new(builtin_registry(&config)?, &config);
            if config.flows_dir.is_dir() {
                for flow in FlowLoader::new().load_dir(&config.flows_dir)? {
                    engine.register_flow(flow).await?;
                }
            } else {
                log::warn!(
                    "Flows directory {} not found, starting with no flows",
                    config.flows_dir.display()
                );
            }

            server::serve(Arc::new(engine), config.port).await?;
        }
    }

    Ok(())
}
