//! Bisection driver over the publication timeline.

use async_trait::async_trait;
use npm_bisect_common::{Error, PackageFilter, Result, Timestamp};
use npm_bisect_registry_schema::TimelineEvent;
use tracing::info;

use crate::probe::ProbeRequest;

/// One reinstall cycle. Implemented by the real probe runner and by
/// scripted probes in tests.
#[async_trait]
pub trait InstallProbe: Send {
    /// Returns the collected timeline for first probes, `None` otherwise.
    async fn run(&mut self, request: &ProbeRequest) -> Result<Option<Vec<TimelineEvent>>>;
}

/// Answers "does the project work now?" after a probe.
#[async_trait]
pub trait Oracle: Send {
    async fn works(&mut self) -> Result<bool>;
}

/// Search configuration collected from arguments and prompts.
#[derive(Debug)]
pub struct BisectOptions {
    /// The project worked at this instant.
    pub good: Timestamp,
    /// The project was broken at this instant.
    pub bad: Timestamp,
    pub only: Vec<PackageFilter>,
    pub ignore: Vec<PackageFilter>,
    /// Print the interval table before each probe.
    pub debug: bool,
}

/// Run the first probe at the known-good cutoff and narrow its timeline to
/// the candidate publications in (good, bad] that pass the user's filters.
pub async fn collect_candidates<P>(probe: &mut P, opts: &BisectOptions) -> Result<Vec<TimelineEvent>>
where
    P: InstallProbe + ?Sized,
{
    info!(
        "Running first probe at the last known-good instant {}",
        opts.good
    );
    let timeline = probe
        .run(&ProbeRequest {
            cutoff: opts.good,
            compute_timeline: true,
        })
        .await?
        .ok_or_else(|| Error::Other("first probe produced no timeline".to_string()))?;

    let windowed: Vec<TimelineEvent> = timeline
        .into_iter()
        .filter(|e| e.time > opts.good && e.time <= opts.bad)
        .collect();
    Ok(apply_filters(windowed, &opts.only, &opts.ignore))
}

/// Apply `--only` then `--ignore` filters.
pub fn apply_filters(
    events: Vec<TimelineEvent>,
    only: &[PackageFilter],
    ignore: &[PackageFilter],
) -> Vec<TimelineEvent> {
    events
        .into_iter()
        .filter(|e| {
            only.is_empty() || only.iter().any(|f| f.matches(&e.package_name, &e.version))
        })
        .filter(|e| !ignore.iter().any(|f| f.matches(&e.package_name, &e.version)))
        .collect()
}

/// Binary-search the candidate list down to the culprit publication.
///
/// The invariant is that the culprit index always lies in the closed
/// interval [good_before, bad_after]: hiding the probed candidate and seeing
/// the project work means the culprit is that candidate or something newer;
/// seeing it still broken means the culprit is strictly older.
pub async fn bisect_candidates<P, O>(
    probe: &mut P,
    oracle: &mut O,
    candidates: &[TimelineEvent],
    opts: &BisectOptions,
) -> Result<TimelineEvent>
where
    P: InstallProbe + ?Sized,
    O: Oracle + ?Sized,
{
    if candidates.is_empty() {
        return Err(Error::Config(
            "cannot bisect an empty candidate list".to_string(),
        ));
    }

    let mut good_before = 0usize;
    let mut bad_after = candidates.len() - 1;

    while bad_after > good_before {
        let span = bad_after - good_before;
        info!(
            "Estimated remaining steps: {}",
            (span as f64).log2().ceil() as u32
        );
        if opts.debug {
            print_interval(candidates, good_before, bad_after);
        }

        // Half-up midpoint: always strictly above good_before, so the
        // interval shrinks on either verdict.
        let try_idx = (good_before + bad_after + 1) / 2;
        let candidate = &candidates[try_idx];
        // One millisecond under the publish time hides the candidate itself.
        let cutoff = candidate.time.minus_millis(1);
        info!("Hiding {candidate} and everything newer (cutoff {cutoff})");
        probe
            .run(&ProbeRequest {
                cutoff,
                compute_timeline: false,
            })
            .await?;

        if oracle.works().await? {
            good_before = try_idx;
        } else {
            bad_after = try_idx - 1;
        }
    }

    Ok(candidates[good_before].clone())
}

fn print_interval(candidates: &[TimelineEvent], good_before: usize, bad_after: usize) {
    println!("  idx  candidate                                published");
    for (idx, event) in candidates.iter().enumerate() {
        let marker = if idx == good_before && idx == bad_after {
            "  <- good_before/bad_after"
        } else if idx == good_before {
            "  <- good_before"
        } else if idx == bad_after {
            "  <- bad_after"
        } else {
            ""
        };
        println!("  {idx:>3}  {:<40} {}{marker}", event.to_string(), event.time);
    }
}
