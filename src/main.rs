mod cli;

use anyhow::{anyhow, Context, Result};
use cf_int::config::HarnessConfig;
use cf_int::fixtures::{NameGenerator, ResourceKind};
use cf_int::runner::{self, Filter};
use cf_int::scenario::{self, LeafKind, Step, Suite, DEFAULT_SUITE_DIR};
use clap::Parser;
use cli::{Cli, Commands, NamesArgs, RunArgs, ShowArgs};
use std::path::{Path, PathBuf};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first to get debug flag
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.command {
        Commands::Run(args) => {
            if !run_command(cli.config.as_deref(), args).await? {
                std::process::exit(1);
            }
        }
        Commands::Show(args) => show_command(args)?,
        Commands::Names(args) => names_command(cli.config.as_deref(), args)?,
    }

    Ok(())
}

/// Run suites; `Ok(false)` when any scenario failed
async fn run_command(config_path: Option<&Path>, args: &RunArgs) -> Result<bool> {
    let config = HarnessConfig::load(config_path).context("Failed to load harness config")?;
    let paths = if args.suites.is_empty() {
        vec![PathBuf::from(DEFAULT_SUITE_DIR)]
    } else {
        args.suites.clone()
    };
    let suites = scenario::load_suites(&paths).context("Failed to load suites")?;
    let filter = Filter::new(args.focus.as_deref(), args.skip.as_deref())?;

    println!("🎯 cf-int started");
    println!("📂 Suites: {}", suites.len());
    match &config.api {
        Some(api) => println!("🌐 Platform: {}", api),
        None => println!("💡 No platform configured, offline scenarios only"),
    }

    let interrupted = async {
        let _ = signal::ctrl_c().await;
        println!("\n🛑 Received Ctrl+C, removing fixtures and stopping...");
    };
    let Some(report) = runner::run(&config, suites, &filter, args.workers, interrupted).await?
    else {
        return Ok(false);
    };

    print!("{}", report.render());
    if let Some(path) = &args.report {
        report.write_json(path)?;
        println!("📝 Report written to {}", path.display());
    }
    Ok(report.success())
}

/// Print the leaves a suite expands to
fn show_command(args: &ShowArgs) -> Result<()> {
    let suite = Suite::from_file(&args.suite)?;

    println!("Command: {}", suite.command);
    println!("  login: {}", suite.login);
    println!(
        "  fixtures: org={} space={} app={}",
        suite.fixtures.org, suite.fixtures.space, suite.fixtures.app
    );
    if !suite.names.is_empty() {
        println!("  names:");
        for (name, kind) in &suite.names {
            println!("    {}: {}", name, kind);
        }
    }

    println!("\nScenarios:");
    for (i, leaf) in suite.leaves.iter().enumerate() {
        let marker = if leaf.pending { " (pending)" } else { "" };
        println!("  {}: {}{}", i + 1, leaf.name, marker);
        match &leaf.kind {
            LeafKind::Steps {
                before,
                steps,
                after,
            } => {
                for step in before.iter().chain(steps).chain(after) {
                    println!("       {}", describe_step(step));
                }
            }
            LeafKind::Help(help) => println!("       help: {:?}", help.description),
            LeafKind::MissingArgument(argument) => println!("       missing: {}", argument),
            LeafKind::Environment { args, .. } => {
                println!("       cf {} {}", suite.command, args.join(" "))
            }
        }
    }
    Ok(())
}

fn describe_step(step: &Step) -> String {
    match step {
        Step::Cli(cli) => {
            let mut out = format!("cf {}", cli.args.join(" "));
            if !cli.say.is_empty() {
                out.push_str(&format!(" → say {:?}", cli.say));
            }
            if !cli.say_err.is_empty() {
                out.push_str(&format!(" → say_err {:?}", cli.say_err));
            }
            if let Some(code) = cli.exit {
                out.push_str(&format!(" → exit {}", code));
            }
            out
        }
        Step::Fixture(fixture) => format!("{:?} {:?}", fixture.action, fixture.args),
    }
}

fn names_command(config_path: Option<&Path>, args: &NamesArgs) -> Result<()> {
    let config = HarnessConfig::load(config_path).context("Failed to load harness config")?;
    let kind: ResourceKind = args.kind.parse().map_err(|e: String| anyhow!(e))?;
    let names = NameGenerator::new(config.name_prefix);
    for _ in 0..args.count {
        println!("{}", names.name(kind));
    }
    Ok(())
}
