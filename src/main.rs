use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context as _;
use chrono::Local;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use fds_rust::{
    config::SimConfig,
    dispatch::{
        external::ExternalDispatcher, insertion::InsertionDispatcher, nearest::NearestDispatcher,
        wire, Dispatcher,
    },
    instance,
    simulation::{scorer::Score, simulator::SimulateEnvironment},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Reference insertion heuristic with randomized candidate choice.
    Insertion,
    /// Earlier greedy nearest-driver policy.
    Nearest,
    /// Dispatch process run out-of-process over the json exchange files.
    External,
}

#[derive(Debug, Parser)]
#[command(about = "Tick-driven simulator and dispatcher for a meal-delivery fleet")]
struct Args {
    /// Directory holding customers.csv, restaurants.csv, routes.csv and the
    /// instance folders
    #[arg(long, default_value = "data/benchmark")]
    data_dir: PathBuf,
    /// Instance folder to simulate; repeat for a batch
    #[arg(long = "instance", default_values_t = [String::from("instance_1")])]
    instances: Vec<String>,
    /// Minutes of virtual time per tick
    #[arg(long, default_value_t = 10)]
    interval_minutes: i64,
    /// Wall-clock bound on one dispatch invocation, in seconds
    #[arg(long, default_value_t = 600)]
    max_runtime: u64,
    /// Weight of lateness against driven distance in the objective
    #[arg(long, default_value_t = 10.0)]
    lamda: f64,
    #[arg(long, default_value_t = 10_000)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = Policy::Insertion)]
    policy: Policy,
    /// Command starting the external dispatch process (with --policy external)
    #[arg(long)]
    algorithm_cmd: Option<String>,
    /// Directory the external policy exchanges its json files in
    #[arg(long)]
    exchange_dir: Option<PathBuf>,
    /// Write both history streams here after each instance
    #[arg(long)]
    history_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config = SimConfig {
        alg_run_frequency: args.interval_minutes,
        max_runtime_of_algorithm: args.max_runtime,
        lamda: args.lamda,
        random_seed: args.seed,
        ..SimConfig::default()
    };

    let mut scores = Vec::new();
    let mut failed = false;
    for instance_name in &args.instances {
        info!("start to run {instance_name}");
        match run_instance(&args, &config, instance_name) {
            Ok(score) => {
                info!("score of {instance_name}: {:.3}", score.value);
                scores.push(score.value);
            }
            Err(err) => {
                error!("failed to run {instance_name}: {err:?}");
                scores.push(f64::INFINITY);
                failed = true;
            }
        }
    }

    let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
    println!("{scores:?}");
    println!("mean score: {mean}");
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_instance(args: &Args, config: &SimConfig, instance_name: &str) -> anyhow::Result<Score> {
    // the simulated day starts at 06:00 local
    let initial_time = Local::now()
        .date_naive()
        .and_hms_opt(6, 0, 0)
        .expect("valid start of day");
    let data = instance::load_instance(&args.data_dir, instance_name, initial_time, config.random_seed)?;

    let dispatcher: Box<dyn Dispatcher> = match args.policy {
        Policy::Insertion => Box::new(InsertionDispatcher::new(config.random_seed)),
        Policy::Nearest => Box::new(NearestDispatcher),
        Policy::External => {
            let command = args
                .algorithm_cmd
                .clone()
                .context("--algorithm-cmd is required with --policy external")?;
            let exchange_dir = args
                .exchange_dir
                .clone()
                .unwrap_or_else(|| args.data_dir.join("exchange"));
            std::fs::create_dir_all(&exchange_dir)?;
            Box::new(ExternalDispatcher::new(
                command,
                exchange_dir,
                Duration::from_secs(config.max_runtime_of_algorithm),
                config.algorithm_success_flag.clone(),
            ))
        }
    };

    let mut environment = SimulateEnvironment::new(
        initial_time,
        config.tick_interval(),
        data.orders,
        data.drivers,
        data.locations,
        Arc::new(data.travel_map),
        dispatcher,
        config.dispatch_runtime_bound(),
        config.lamda,
    )?;
    let score = environment.run()?;

    if let Some(history_dir) = &args.history_dir {
        wire::write_json_to_file(
            history_dir.join(format!("{instance_name}_driver_position_history.json")),
            environment.history().driver_positions(),
        )?;
        wire::write_json_to_file(
            history_dir.join(format!("{instance_name}_order_status_history.json")),
            environment.history().order_statuses(),
        )?;
    }
    Ok(score)
}
