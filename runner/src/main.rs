use clap::Parser;
use itertools::Itertools;
use seqfleet_runner::{
    comm::{self, fs::FsComm, memory::MemoryBus, Communicator},
    config::{FleetLayout, RunConfig},
    report::RunTotals,
    run_rank, PipelineError,
};
use std::{path::PathBuf, process::exit, thread};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::OptionExt;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run configuration, YAML
    config: PathBuf,

    /// Override the configured input file
    #[arg(long)]
    input: Option<PathBuf>,

    /// Rank of this process within the fleet
    #[arg(long)]
    rank: Option<usize>,

    /// Total number of fleet members
    #[arg(long)]
    fleet_size: Option<usize>,

    /// Job id this run accounts under
    #[arg(long)]
    job_id: Option<u64>,

    /// Run the whole fleet as threads inside this process
    #[arg(long, conflicts_with_all = ["rank", "fleet_size"])]
    local_workers: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match RunConfig::load(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            error!(
                error = ?error,
                "Failed to load the configuration from {}",
                cli.config.display()
            );
            exit(1);
        }
    };

    if let Some(input) = cli.input {
        config.input = input;
    }
    if cli.rank.is_some() {
        config.fleet.rank = cli.rank;
    }
    if cli.fleet_size.is_some() {
        config.fleet.size = cli.fleet_size;
    }
    if cli.job_id.is_some() {
        config.fleet.job_id = cli.job_id;
    }

    if config.preflight_checks() {
        error!("Aborting due to configuration errors");
        exit(1);
    }

    let outcome = match cli.local_workers {
        Some(workers) => run_local_fleet(&config, workers),
        None => run_process_rank(&config),
    };

    match outcome {
        Ok(totals) => info!(remaining = totals.remaining(), "Run finished"),
        Err(error) => {
            error!(error = ?error, "Run failed");
            exit(1);
        }
    }
}

/// This process is one fleet member; siblings are reached over the shared
/// filesystem unless the fleet turns out to be a fleet of one.
fn run_process_rank(config: &RunConfig) -> Result<RunTotals, PipelineError> {
    let layout = config.fleet.resolve()?;

    let communicator = if layout.size == 1 {
        Communicator::Single
    } else {
        let session = config.result_dir(layout.job_id).join(comm::fs::COMM_DIR);
        let fs_comm = FsComm::new(session, layout.rank, layout.size)?
            .with_timeout(config.fleet.collective_timeout());
        Communicator::SharedFs(fs_comm)
    };

    run_rank(config, layout, &communicator)
}

/// The whole fleet runs as threads of this process, coordinated in memory.
fn run_local_fleet(config: &RunConfig, workers: usize) -> Result<RunTotals, PipelineError> {
    if workers == 0 {
        error!("--local-workers cannot be 0");
        return Err(PipelineError::LocalFleet);
    }

    let job_id = config.fleet.resolve_job_id()?;
    let bus = MemoryBus::new(workers);

    let results = thread::scope(|scope| {
        let handles = (0..workers)
            .map(|rank| {
                let bus = &bus;
                scope.spawn(move || {
                    let member = bus.attach(rank);
                    let communicator = Communicator::Memory(member.clone());
                    let layout = FleetLayout {
                        rank,
                        size: workers,
                        job_id,
                    };

                    let result = run_rank(config, layout, &communicator);
                    if result.is_err() {
                        // unblock the members still waiting in a collective
                        member.abandon();
                    }

                    result
                })
            })
            .collect_vec();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect_vec()
    });

    let mut totals = None;
    let mut failed = false;

    for (rank, joined) in results.into_iter().enumerate() {
        match joined {
            Ok(Ok(rank_totals)) => totals = Some(rank_totals),
            Ok(Err(error)) => {
                error!(rank = rank, error = ?error, "Local fleet member failed");
                failed = true;
            }
            Err(_) => {
                error!(rank = rank, "Local fleet member panicked");
                failed = true;
            }
        }
    }

    if failed {
        return Err(PipelineError::LocalFleet);
    }

    // every member returned the same reduced totals
    Ok(totals.unwrap_or_log())
}
