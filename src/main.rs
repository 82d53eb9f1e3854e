use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use task_runtime::domain::runtime::runtime::{Runtime, ShutdownMode, ShutdownReport};
use task_runtime::domain::simulator::simulated_adaptor::SimulatedAdaptor;
use task_runtime::domain::task::outcome::TaskOutcome;
use task_runtime::domain::utils::id::TaskId;
use task_runtime::{load_application, load_config, logger};

/// Runs an application description on simulated workers.
#[derive(Debug, Parser)]
#[command(name = "task_runtime", version)]
struct Cli {
    /// Runtime configuration (scheduler, checkpoint, trace, workers).
    #[arg(short, long, default_value = "data/runtime.json")]
    config: PathBuf,

    /// Application description (inputs, tasks, simulated behaviour).
    #[arg(short, long, default_value = "data/application.json")]
    application: PathBuf,

    /// `drain` waits for pending tasks, `cancel` kills them.
    #[arg(long, default_value = "drain", value_parser = ShutdownMode::from_str)]
    shutdown_mode: ShutdownMode,
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| format!("cannot load configuration '{}'", cli.config.display()))?;
    let application =
        load_application(&cli.application).with_context(|| format!("cannot load application '{}'", cli.application.display()))?;

    let adaptor = application.configure(SimulatedAdaptor::new(config.workers.iter().map(|w| w.name.to_string())));
    let runtime = Runtime::start(config, Arc::new(adaptor)).await?;

    for input in &application.inputs {
        runtime.register_data(input.name.as_str(), input.data_type, input.location.clone()).await?;
    }

    let mut handles = Vec::with_capacity(application.tasks.len());
    for task in application.tasks.iter().cloned() {
        handles.push(runtime.submit_task(task).await?);
    }

    for name in &application.main_accesses {
        match runtime.main_access(name.as_str()).await {
            Ok(locations) => println!("{} '{}' at {:?}", "read".cyan(), name, locations),
            Err(e) => println!("{} '{}': {}", "read".red(), name, e),
        }
    }

    let report = runtime.shutdown(cli.shutdown_mode).await?;
    for handle in handles {
        let (id, signature) = (handle.id(), handle.signature().to_string());
        print_outcome(id, &signature, &handle.wait().await);
    }
    print_summary(&application.name, &report);

    match report.failure {
        Some(reason) => Err(anyhow::anyhow!("application failed: {}", reason)),
        None => Ok(()),
    }
}

fn print_outcome(id: TaskId, signature: &str, outcome: &TaskOutcome) {
    let status = match outcome {
        TaskOutcome::Completed => "COMPLETED".green(),
        TaskOutcome::Recovered => "RECOVERED".blue(),
        TaskOutcome::Failed { ignored: true, .. } => "IGNORED".yellow(),
        TaskOutcome::Failed { .. } => "FAILED".red(),
        TaskOutcome::Cancelled => "CANCELLED".magenta(),
    };
    match outcome {
        TaskOutcome::Failed { error, .. } => println!("  {:>5} {:<30} {} ({})", id, signature, status, error),
        _ => println!("  {:>5} {:<30} {}", id, signature, status),
    }
}

fn print_summary(name: &str, report: &ShutdownReport) {
    let counters = &report.counters;
    println!("{}", format!("--- {} ---", name).bold());
    println!("  submitted  {}", counters.submitted);
    println!("  completed  {}", counters.completed.to_string().green());
    println!("  recovered  {}", counters.recovered.to_string().blue());
    println!("  ignored    {}", counters.ignored.to_string().yellow());
    println!("  failed     {}", counters.failed.to_string().red());
    println!("  cancelled  {}", counters.cancelled.to_string().magenta());
    if report.discarded_notifications > 0 {
        println!("  late job notifications discarded: {}", report.discarded_notifications);
    }
    if let Some(reason) = &report.failure {
        println!("{} {}", "application failed:".red().bold(), reason);
    }
}
