use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::info;

use refineml::{
    logging::verbosity_filter, reinforcement::OptimizationEngine, CodeArtifact, EngineConfig,
};

#[derive(Parser)]
#[command(author, version, about = "RefineML - adaptive code optimization advisor", long_about = None)]
struct Cli {
    /// Source file to optimize (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Where to write the optimized code (prints to stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Engine configuration file (json, yaml or toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of episodes to run over the input
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    episodes: u64,

    /// Seed for reproducible runs (overrides the configuration)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Source language of the input (overrides the configuration)
    #[arg(short, long)]
    language: Option<String>,

    /// Checkpoint file, restored when present and saved after the run
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Only list the transformations that apply to the input
    #[arg(long)]
    hints: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let default_path = EngineConfig::default_config_path();
            if default_path.exists() {
                EngineConfig::load(&default_path).with_context(|| {
                    format!("Failed to load configuration from {}", default_path.display())
                })?
            } else {
                EngineConfig::default()
            }
        }
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    Ok(config)
}

fn read_input(cli: &Cli) -> Result<CodeArtifact> {
    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read code from stdin")?;
            buffer
        }
    };
    Ok(CodeArtifact::from(text))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", verbosity_filter(cli.verbose));
    }
    refineml::init_with_logger(true).context("Failed to initialize logging")?;

    let config = load_config(&cli)?;
    let artifact = read_input(&cli)?;
    let mut engine =
        OptimizationEngine::from_config(config).context("Failed to create optimization engine")?;

    if cli.hints {
        let hints = engine.applicable_actions(&artifact);
        if hints.is_empty() {
            println!("No known optimization patterns found");
        }
        for name in hints {
            let hint = refineml::BuiltinRewrite::from_name(&name)
                .map(|rewrite| rewrite.hint())
                .unwrap_or("");
            println!("{}: {}", name, hint);
        }
        return Ok(());
    }

    if let Some(path) = &cli.checkpoint {
        if path.exists() {
            engine
                .restore_checkpoint(path)
                .with_context(|| format!("Failed to restore checkpoint {}", path.display()))?;
        } else {
            info!("No checkpoint at {}, starting fresh", path.display());
        }
    }

    let mut outcome = engine
        .optimize(artifact.clone())
        .context("Optimization episode failed")?;
    for _ in 1..cli.episodes {
        outcome = engine
            .optimize(artifact.clone())
            .context("Optimization episode failed")?;
    }

    if let Some(path) = &cli.checkpoint {
        engine
            .save_checkpoint(path)
            .with_context(|| format!("Failed to save checkpoint {}", path.display()))?;
    }

    if outcome.suggestions.is_empty() {
        eprintln!("No optimizations applied");
    } else {
        eprintln!("Applied optimizations:");
        for name in &outcome.suggestions {
            eprintln!("  - {}", name);
        }
    }

    match &cli.output {
        Some(path) => {
            fs::write(path, outcome.artifact.as_str())
                .with_context(|| format!("Failed to write output file {}", path.display()))?;
            info!("Optimized code saved to {}", path.display());
        }
        None => print!("{}", outcome.artifact),
    }

    Ok(())
}
