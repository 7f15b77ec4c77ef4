//! MotionView DST Simulator CLI
//!
//! Run deterministic simulation tests with chaos engineering scenarios, or
//! replay a captured console log through the engine.

use clap::Parser;
use motionview_core::EngineConfig;
use motionview_sim::scenarios::ScenarioId;
use motionview_sim::{replay_log, ScenarioResult, ScenarioRunner, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// MotionView Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "motionview-sim")]
#[command(about = "Run deterministic simulation tests for MotionView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady_stream, burst_overflow, session_restart,
    /// duplicate_lines, garbage_lines, control_timeout, kill_fallback,
    /// plan_editing, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Streaming duration per scenario in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Engine settings file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Replay a captured console log instead of running scenarios
    #[arg(long)]
    replay: Option<String>,

    /// Lines per integration step when replaying
    #[arg(long, default_value = "200")]
    batch: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the run (document + summary) to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn load_config(path: Option<&str>) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    match EngineConfig::from_file(path) {
        Ok(config) => {
            info!("Loaded engine config from {}", path);
            config
        }
        Err(e) => {
            eprintln!("Error: cannot load config {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn write_export(export: &SimExport, path: &str) {
    match export.write_to_file(path) {
        Ok(()) => info!("Exported run to {}", path),
        Err(e) => error!("Failed to write export: {}", e),
    }
}

fn run_replay(path: &str, args: &Args, config: &EngineConfig) -> ! {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let report = replay_log(&text, config, args.batch);
    let export = report.to_export(path);
    if let Some(export_path) = &args.export {
        write_export(&export, export_path);
    }

    if args.json {
        match export.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode report: {}", e),
        }
    } else if report.passed() {
        info!(
            "✓ replay {} PASSED: {} lines, {} poses, {} events, {} out-of-order, {} malformed",
            path,
            report.lines,
            report.stats.poses_added,
            report.stats.events_added,
            report.stats.out_of_order,
            report.stats.malformed
        );
    } else {
        error!(
            "✗ replay {} FAILED: {}",
            path,
            report.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    std::process::exit(if report.passed() { 0 } else { 1 });
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("MotionView DST Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = load_config(args.config.as_deref());

    if let Some(path) = &args.replay {
        run_replay(path, &args, &config);
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        eprintln!("Error: --export only supports a single scenario and seed");
        std::process::exit(1);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if let Some(export_path) = &args.export {
                write_export(&SimExport::from_result(&result), export_path);
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: cannot encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
