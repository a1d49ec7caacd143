use std::path::Path;
use std::time::Instant;

use clap::Parser;
use env_logger::Env;
use log::info;

use organoid_morph::config::Config;
use organoid_morph::errors::Result;
use organoid_morph::pipeline::run_analysis;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Organoid morphology analysis pipeline")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Analysis plugin, as "name" or "type.name" (overwrites config)
    #[clap(short, long)]
    plugin: Option<String>,

    /// Worker count for batch execution (overwrites config)
    #[clap(short, long)]
    workers: Option<usize>,

    /// Analyze the input set as an ordered time series
    #[clap(long)]
    time_series: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Missing config file falls back to defaults so CLI-only runs work.
    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };

    // Override config with command-line arguments
    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(plugin) = args.plugin {
        match plugin.split_once('.') {
            Some((plugin_type, plugin_name)) => {
                config.plugin_type = plugin_type.to_string();
                config.plugin_name = plugin_name.to_string();
            }
            None => config.plugin_name = plugin,
        }
    }
    if args.workers.is_some() {
        config.num_workers = args.workers;
    }
    if args.time_series {
        config.time_series_enabled = true;
    }
    if args.debug {
        config.log_level = "debug".to_string();
    }
    if !config.use_parallel {
        config.num_workers = Some(1);
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(&config.log_level)).init();

    config.validate()?;

    let start_time = Instant::now();
    info!("analyzing {} with plugin {}.{}", config.input_path, config.plugin_type, config.plugin_name);

    let summary = run_analysis(&config)?;

    let elapsed = start_time.elapsed();
    println!(
        "Analyzed {} images ({} succeeded, {} failed) in {:.2} seconds",
        summary.total,
        summary.succeeded,
        summary.failed,
        elapsed.as_secs_f64()
    );
    println!("Results written to {}", config.output_dir);

    Ok(())
}
