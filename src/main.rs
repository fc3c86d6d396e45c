use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uxf_core::{DataType, Settings};
use uxf_data::{FileSaver, HttpUploader, MemoryHandler, MemoryStore, WebSaver};
use uxf_session::{Session, SystemClock};

mod experiment;
use experiment::{build_blocks, simulate_trials, ExperimentDescription};

#[derive(Parser)]
#[command(name = "uxf", version, about = "Run experiment sessions and export their data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session with a simulated participant.
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        ppid: String,
        #[arg(long, default_value_t = 1)]
        session: u32,
        /// Overrides the output directory from the description.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run even if data for this session already exists.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        seed: Option<u64>,
        /// Keep everything in memory and print the results table.
        #[arg(long)]
        dry_run: bool,
    },
    /// Report whether a session would overwrite existing data.
    Check {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        ppid: String,
        #[arg(long, default_value_t = 1)]
        session: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn build_session(
    desc: &ExperimentDescription,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<(Session<SystemClock>, Option<MemoryStore>)> {
    let mut session = Session::new(desc.session.clone());

    if dry_run {
        let memory = MemoryHandler::new();
        let store = memory.store();
        session.add_data_handler(memory)?;
        return Ok((session, Some(store)));
    }

    let directory = output.unwrap_or_else(|| desc.output.directory.clone());
    session.add_data_handler(
        FileSaver::new(directory).with_sort_into_folders(desc.output.sort_into_folders),
    )?;

    if let Some(web) = &desc.web {
        let mut uploader = HttpUploader::new(&web.endpoint)?;
        if let Some(var) = &web.token_env {
            let token = std::env::var(var).with_context(|| format!("reading ${}", var))?;
            uploader = uploader.with_bearer_token(token);
        }
        session.add_data_handler(WebSaver::new(uploader))?;
    }

    Ok((session, None))
}

fn run(
    config: PathBuf,
    ppid: String,
    number: u32,
    output: Option<PathBuf>,
    force: bool,
    seed: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let desc = ExperimentDescription::load(&config)?;
    let (mut session, memory) = build_session(&desc, output, dry_run)?;

    if session.check_session_exists(None, &desc.experiment, &ppid, number) {
        if !force {
            bail!(
                "data for {} / {} / session {} already exists (use --force to overwrite)",
                desc.experiment,
                ppid,
                number
            );
        }
        tracing::warn!(ppid = %ppid, session = number, "overwriting existing session data");
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let details = (!desc.participant_details.is_empty()).then(|| desc.participant_details.clone());
    session.begin(
        desc.experiment.clone(),
        ppid,
        number,
        details,
        Some(Settings::new(desc.settings.clone())),
    )?;
    build_blocks(&mut session, &desc, &mut rng)?;
    println!(
        "Session {} began: {} block(s), {} trial(s)",
        session.number(),
        session.blocks().len(),
        session.num_trials()
    );

    let summary = simulate_trials(
        &mut session,
        Duration::from_millis(desc.inter_trial_interval_ms),
        &mut rng,
    )?;
    session.save_text(
        &format!("trials={} correct={}\n", summary.trials, summary.correct),
        "summary",
        DataType::Other,
    );
    session.end();

    println!(
        "Completed {} trial(s), {} correct",
        summary.trials, summary.correct
    );
    if let Some(store) = memory {
        if let Some(table) = store.table("trial_results") {
            print!("{}", table.to_csv());
        }
    }
    Ok(())
}

fn check(config: PathBuf, ppid: String, number: u32, output: Option<PathBuf>) -> Result<()> {
    let desc = ExperimentDescription::load(&config)?;
    let (session, _) = build_session(&desc, output, false)?;
    if session.check_session_exists(None, &desc.experiment, &ppid, number) {
        println!("session {} for {} already has data", number, ppid);
    } else {
        println!("session {} for {} is free", number, ppid);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            ppid,
            session,
            output,
            force,
            seed,
            dry_run,
        } => run(config, ppid, session, output, force, seed, dry_run),
        Commands::Check {
            config,
            ppid,
            session,
            output,
        } => check(config, ppid, session, output),
    }
}
