//! TripWeaver - trip planning worker
//!
//! CLI entry point for running the queue worker and inspecting single turns.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use memorystore::MemoryStore;
use serde_json::Value;
use tracing::{debug, info, warn};

use tripweaver::cli::{Cli, Command, MemoryCommand, OutputFormat, get_log_path};
use tripweaver::config::Config;
use tripweaver::domain::TripPlan;
use tripweaver::{
    AnchorExtractor, ChannelQueue, ContextAssembler, HistoryClient, HttpIntentExecutor, LocalGroundingStore,
    LocalLongTermMemory, LongTermMemory, PlanGenerator, PromptLoader, RequestNormalizer, Retriever, TripOrchestrator,
    Worker, create_client, create_history,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Collaborators shared by the pipeline and maintenance commands
struct Services {
    history: Arc<dyn HistoryClient>,
    long_term: Arc<dyn LongTermMemory>,
    grounding: Arc<LocalGroundingStore>,
}

async fn open_services(config: &Config) -> Result<Services> {
    debug!(store_dir = %config.memory.store_dir.display(), "open_services: called");
    let store = Arc::new(
        MemoryStore::open(&config.memory.store_dir)
            .context(format!("Failed to open store at {}", config.memory.store_dir.display()))?,
    );
    let permits = config.memory.blocking_threads;

    let history = create_history(&config.history).context("Failed to create history client")?;
    let long_term: Arc<dyn LongTermMemory> = Arc::new(LocalLongTermMemory::new(
        store.clone(),
        config.memory.collection.clone(),
        permits,
    ));
    let grounding = Arc::new(LocalGroundingStore::new(store, config.retrieval.collection.clone(), permits));

    if let Some(seed) = &config.retrieval.seed_file {
        let seeded = grounding
            .seed_from_file(seed)
            .await
            .context(format!("Failed to seed grounding from {}", seed.display()))?;
        info!(seeded, "open_services: grounding corpus seeded");
    }

    Ok(Services {
        history,
        long_term,
        grounding,
    })
}

fn build_orchestrator(config: &Config, services: &Services) -> Result<TripOrchestrator> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    if llm.is_none() {
        warn!("build_orchestrator: no generation model, plans come from the fallback planner");
    }
    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut retriever = Retriever::new(services.grounding.clone(), config);
    if config.lookups.enabled {
        let executor = HttpIntentExecutor::new(&config.lookups).context("Failed to create lookup client")?;
        retriever = retriever.with_lookups(Arc::new(executor));
        info!("build_orchestrator: live lookups enabled");
    }

    Ok(TripOrchestrator::new(
        RequestNormalizer::new(config),
        ContextAssembler::new(services.history.clone(), services.long_term.clone(), config),
        retriever,
        PlanGenerator::new(llm, PromptLoader::new(root), config),
        services.history.clone(),
    ))
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context(format!("Failed to parse JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { requests, follow } => cmd_run(&config, &requests, follow).await,
        Command::Plan { request, format } => cmd_plan(&config, &request, format).await,
        Command::Anchors { messages, format } => cmd_anchors(&messages, format),
        Command::Normalize { request } => cmd_normalize(&config, &request),
        Command::Memory { command } => cmd_memory(&config, command).await,
    }
}

/// Feed a JSONL file into the queue and work through it
async fn cmd_run(config: &Config, requests: &Path, follow: bool) -> Result<()> {
    debug!(requests = %requests.display(), follow, "cmd_run: called");
    let services = open_services(config).await?;
    let orchestrator = Arc::new(build_orchestrator(config, &services)?);
    let queue = Arc::new(ChannelQueue::new(config.worker.queue_name.clone()));

    let file = fs::File::open(requests).context(format!("Failed to open {}", requests.display()))?;
    let mut queued = 0usize;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read requests file")?;
        if line.trim().is_empty() {
            continue;
        }
        // Non-JSON lines go through as strings so the pipeline records the validation error
        let payload = serde_json::from_str(&line).unwrap_or_else(|e| {
            warn!(line = n + 1, error = %e, "cmd_run: line is not JSON");
            Value::String(line.clone())
        });
        queue.push_payload(payload).await.context("Failed to queue request")?;
        queued += 1;
    }
    info!(queued, queue = %queue.name(), "cmd_run: requests queued");

    let mut worker = Worker::new(queue, orchestrator, &config.worker);
    let stats = if follow {
        worker
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cmd_run: could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await
    } else {
        worker.drain().await
    };

    println!(
        "Processed {} request(s): {} planned, {} retried, {} dropped",
        queued, stats.processed, stats.retried, stats.dropped
    );
    Ok(())
}

/// Run one turn and print the plan
async fn cmd_plan(config: &Config, request: &Path, format: OutputFormat) -> Result<()> {
    debug!(request = %request.display(), ?format, "cmd_plan: called");
    let payload = read_json(request)?;
    let services = open_services(config).await?;
    let orchestrator = build_orchestrator(config, &services)?;

    let plan = orchestrator.process(&payload).await.context("Turn failed")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print_plan(&plan),
    }
    Ok(())
}

fn print_plan(plan: &TripPlan) {
    let destination = plan.destination.as_deref().unwrap_or("(no destination)");
    println!("{} - {} day(s) [{:?}]", destination, plan.days, plan.mode);
    if let Some(intro) = &plan.intro_text {
        println!("{}", intro);
    }
    if let Some(lodging) = &plan.lodging {
        println!("Stay: {}", lodging.name);
    }
    for day in &plan.itinerary {
        println!("\n{}", day.title);
        for activity in &day.activities {
            println!("  - {}", activity.name);
        }
    }
    if let Some(tips) = &plan.closing_tips {
        println!("\n{}", tips);
    }
}

fn cmd_anchors(messages: &[String], format: OutputFormat) -> Result<()> {
    debug!(count = messages.len(), "cmd_anchors: called");
    let anchors = AnchorExtractor::new().extract(messages);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&anchors)?),
        OutputFormat::Text => {
            let show = |v: Option<&str>| v.unwrap_or("-").to_string();
            println!("origin:          {}", show(anchors.origin_name.as_deref()));
            println!("destination:     {}", show(anchors.destination_name.as_deref()));
            println!(
                "duration_days:   {}",
                anchors.duration_days.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
            );
            println!("depart_time:     {}", show(anchors.depart_time_hhmm.as_deref()));
            println!("return_same_day: {}", anchors.return_same_day);
            println!("travel_mode:     {}", show(anchors.travel_mode.as_deref()));
        }
    }
    Ok(())
}

fn cmd_normalize(config: &Config, request: &Path) -> Result<()> {
    debug!(request = %request.display(), "cmd_normalize: called");
    let payload = read_json(request)?;
    let intent = RequestNormalizer::new(config)
        .normalize(&payload)
        .context("Request is not valid")?;
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}

async fn cmd_memory(config: &Config, command: MemoryCommand) -> Result<()> {
    debug!(?command, "cmd_memory: called");
    let memory = LocalLongTermMemory::open(&config.memory.store_dir, config.memory.collection.clone(), 1)
        .context("Failed to open memory store")?;

    match command {
        MemoryCommand::DeleteThread { thread_id } => {
            let deleted = memory.delete_thread(&thread_id).await?;
            println!("Deleted {} memory record(s) for thread {}", deleted, thread_id);
        }
        MemoryCommand::Purge { yes } => {
            if !yes && !confirm("Delete ALL long-term memories?")? {
                println!("Aborted");
                return Ok(());
            }
            let deleted = memory.delete_all().await?;
            println!("Deleted {} memory record(s)", deleted);
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
