//! npm-bisect - find the registry publication that broke your install.

mod driver;
mod oracle;
mod probe;
mod prompt;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use npm_bisect_common::{PackageFilter, Timestamp};
use npm_bisect_proxy::DEFAULT_REGISTRY;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use driver::{BisectOptions, Oracle};
use probe::{PackageManager, ProbeContext, RealProbe};

#[derive(Parser)]
#[command(name = "npm-bisect")]
#[command(
    author,
    version,
    about = "Bisect registry publications to find the one that broke your install"
)]
struct Cli {
    /// Instant when the project last worked (e.g. 2024-05-01 or RFC 3339).
    /// Prompted if omitted, defaulting to the HEAD commit time.
    #[arg(long)]
    good: Option<String>,

    /// Instant when the project was first broken. Prompted if omitted,
    /// defaulting to now.
    #[arg(long)]
    bad: Option<String>,

    /// Shell command whose exit code answers "does it work?" after each
    /// probe. If omitted, a yes/no prompt is shown instead.
    #[arg(long)]
    run: Option<String>,

    /// Exclude matching publications (name or name@range, repeatable)
    #[arg(long)]
    ignore: Vec<String>,

    /// Restrict the search to matching publications (name or name@range,
    /// repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// Use yarn instead of npm
    #[arg(long)]
    yarn: bool,

    /// Print the candidate list after the first probe and exit
    #[arg(long)]
    candidates: bool,

    /// Print the interval table before each probe
    #[arg(long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Upstream registry base URL
    #[arg(long, default_value = DEFAULT_REGISTRY)]
    registry: String,

    /// Project directory containing package.json
    #[arg(long, default_value = ".")]
    project: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let good = match &cli.good {
        Some(raw) => {
            Timestamp::parse(raw).with_context(|| format!("Invalid --good instant: {raw}"))?
        }
        None => {
            let default = head_commit_time(&cli.project)
                .await
                .unwrap_or_else(Timestamp::now);
            prompt::prompt_timestamp("When did the project last work?", default)?
        }
    };
    let bad = match &cli.bad {
        Some(raw) => {
            Timestamp::parse(raw).with_context(|| format!("Invalid --bad instant: {raw}"))?
        }
        None => prompt::prompt_timestamp("When was the project first broken?", Timestamp::now())?,
    };
    if bad <= good {
        anyhow::bail!("--bad ({bad}) must be after --good ({good})");
    }

    let only = parse_filters(&cli.only)?;
    let ignore = parse_filters(&cli.ignore)?;

    let ctx = ProbeContext {
        project_dir: cli.project.clone(),
        package_manager: if cli.yarn {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        },
        registry: cli.registry.clone(),
    };
    let opts = BisectOptions {
        good,
        bad,
        only,
        ignore,
        debug: cli.debug,
    };
    let mut probe = RealProbe::new(ctx);

    let mut candidates = driver::collect_candidates(&mut probe, &opts).await?;

    // With no filters configured and several suspects, let the user narrow
    // the search by hand. A plain candidate listing stays non-interactive.
    if !cli.candidates && opts.only.is_empty() && opts.ignore.is_empty() {
        let names: BTreeSet<String> = candidates.iter().map(|e| e.package_name.clone()).collect();
        if names.len() > 1 {
            let names: Vec<String> = names.into_iter().collect();
            let excluded = prompt::select_exclusions(&names)?;
            if !excluded.is_empty() {
                candidates.retain(|e| !excluded.contains(&e.package_name));
            }
        }
    }

    if candidates.is_empty() {
        println!("No relevant packages were published between {good} and {bad}.");
        return Ok(());
    }

    if cli.candidates {
        println!("Candidate publications between {good} and {bad}:");
        for event in &candidates {
            println!("  {event} (published {})", event.time);
        }
        return Ok(());
    }

    info!("Bisecting over {} candidate publication(s)", candidates.len());
    let mut oracle: Box<dyn Oracle> = match &cli.run {
        Some(command) => Box::new(oracle::CommandOracle::new(command.clone())),
        None => Box::new(oracle::PromptOracle),
    };
    let culprit = driver::bisect_candidates(&mut probe, oracle.as_mut(), &candidates, &opts).await?;

    println!(
        "The regression was introduced by {culprit}, published at {}.",
        culprit.time
    );
    Ok(())
}

/// Commit time of HEAD in the project directory, when it is a git checkout.
async fn head_commit_time(project_dir: &Path) -> Option<Timestamp> {
    let output = tokio::process::Command::new("git")
        .args(["show", "-s", "--format=%cI", "HEAD"])
        .current_dir(project_dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8_lossy(&output.stdout);
    Timestamp::parse(raw.trim()).ok()
}

fn parse_filters(specs: &[String]) -> anyhow::Result<Vec<PackageFilter>> {
    specs
        .iter()
        .map(|spec| spec.parse::<PackageFilter>().map_err(Into::into))
        .collect()
}
