// src/cli.rs

use clap::{Parser, Subcommand};
use log::info;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::error::Error;

use crate::config::{HarnessConfig, LayerConfig};
use crate::layer::TensorTrainLayer;
use crate::module::Module;
use crate::scenario::run_scenarios;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Tensor-train layer smoke runner", long_about = None)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run randomly generated layer configurations through a forward pass
    Smoke {
        #[clap(long, value_parser, default_value_t = 5)]
        num_cases: usize,
        #[clap(long, value_parser, default_value_t = 42)]
        seed: u64,
        #[clap(long, value_parser, default_value_t = 9)]
        max_batch_size: usize,
    },
    /// Load a layer configuration from JSON and run one random batch
    Forward {
        #[clap(long, value_parser)]
        config: String,
        #[clap(long, value_parser, default_value_t = 4)]
        batch_size: usize,
        #[clap(long, value_parser, default_value_t = 42)]
        seed: u64,
    },
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    run(args.command)
}

pub fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Smoke { num_cases, seed, max_batch_size } => {
            let harness = HarnessConfig {
                num_cases,
                seed,
                max_batch_size,
                ..HarnessConfig::default()
            };
            let report = run_scenarios(&harness)?;
            println!(
                "{} scenarios: {} passed, {} failed",
                report.outcomes.len(),
                report.passed(),
                report.failed()
            );
            for outcome in report.failures() {
                let config_json = serde_json::to_string(&outcome.config)?;
                println!("  failed (batch {}): {}", outcome.batch_size, config_json);
            }
            if !report.all_passed() {
                return Err(format!("{} of {} scenarios failed", report.failed(), report.outcomes.len()).into());
            }
            Ok(())
        }
        Command::Forward { config, batch_size, seed } => {
            info!("Loading layer configuration from: {}", config);
            let layer_config = LayerConfig::load(&config)?;

            let mut rng = StdRng::seed_from_u64(seed);
            let layer = TensorTrainLayer::new(layer_config, &mut rng)?;
            let width = layer.config().input_width();
            let input = Array2::<f32>::from_shape_simple_fn((batch_size, width), || {
                StandardNormal.sample(&mut rng)
            });

            let output = Module::forward(&layer, input)?;
            println!("cores: {}", layer.num_cores());
            println!("parameters: {}", layer.num_parameters());
            println!("output shape: {:?}", output.shape());
            Ok(())
        }
    }
}
