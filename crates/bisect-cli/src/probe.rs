//! Probe runner: one hermetic reinstall at a given cutoff.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use npm_bisect_common::{Error, Result, Timestamp};
use npm_bisect_proxy::ProxyConfig;
use npm_bisect_registry_schema::{merge_timeline, TimelineEvent};
use tracing::{debug, info, warn};

use crate::driver::InstallProbe;

/// Environment variable carrying the probe cutoff, RFC 3339.
pub const CUTOFF_ENV: &str = "NPM_BISECT_IGNORE_NEWER_THAN";
/// Environment variable naming the timeline fragment directory in
/// first-probe mode.
pub const TIMELINE_ENV: &str = "NPM_BISECT_COMPUTE_TIMELINE";

/// Which package manager performs the install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Fixed per-run probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub project_dir: PathBuf,
    pub package_manager: PackageManager,
    pub registry: String,
}

/// One probe: the cutoff plus whether to collect the publication timeline.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub cutoff: Timestamp,
    pub compute_timeline: bool,
}

/// Run one reinstall cycle under the intercept proxy.
///
/// The dependency tree is wiped, a fresh cache directory is allocated, the
/// package manager runs with its registry pointed at a per-probe proxy, and
/// proxy plus cache are released on every exit path. Ordinary probes return
/// `None`; first probes return the sorted, de-duplicated timeline.
pub async fn run_probe(
    ctx: &ProbeContext,
    request: &ProbeRequest,
) -> Result<Option<Vec<TimelineEvent>>> {
    clear_dir_contents(&ctx.project_dir.join("node_modules"))?;

    let cache_dir = fresh_cache_dir(request.cutoff)?;
    let timeline_dir = request
        .compute_timeline
        .then(|| cache_dir.path().join("timeline"));
    if let Some(dir) = &timeline_dir {
        std::fs::create_dir_all(dir)?;
    }

    let proxy = npm_bisect_proxy::start(ProxyConfig {
        cutoff: request.cutoff,
        upstream: ctx.registry.clone(),
        timeline_dir: timeline_dir.clone(),
    })
    .await?;
    let registry_url = proxy.registry_url();

    let outcome = install(ctx, request, &registry_url, cache_dir.path(), timeline_dir.as_deref()).await;
    // Tear the proxy down before inspecting the outcome so it is released on
    // the failure paths too.
    let events = proxy.shutdown().await;

    let status = outcome?;
    if !status.success() {
        return Err(Error::InstallFailed(format!(
            "{} install exited with {status}",
            ctx.package_manager
        )));
    }

    if !request.compute_timeline {
        return Ok(None);
    }
    let mut events = events;
    if let Some(dir) = &timeline_dir {
        events.extend(read_timeline_fragments(dir)?);
    }
    Ok(Some(merge_timeline(events)))
    // `cache_dir` drops here, removing the per-probe cache.
}

async fn install(
    ctx: &ProbeContext,
    request: &ProbeRequest,
    registry_url: &str,
    cache_dir: &Path,
    timeline_dir: Option<&Path>,
) -> Result<std::process::ExitStatus> {
    info!(
        "Installing with {} at cutoff {}",
        ctx.package_manager, request.cutoff
    );

    let mut command = tokio::process::Command::new(ctx.package_manager.program());
    command
        .arg("install")
        .current_dir(&ctx.project_dir)
        .env("npm_config_registry", registry_url)
        .env(CUTOFF_ENV, request.cutoff.to_rfc3339())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    match ctx.package_manager {
        PackageManager::Npm => {
            command.env("npm_config_cache", cache_dir);
        }
        PackageManager::Yarn => {
            command.env("YARN_REGISTRY", registry_url);
            command.env("YARN_CACHE_FOLDER", cache_dir);
        }
    }
    if let Some(dir) = timeline_dir {
        command.env(TIMELINE_ENV, dir);
    }

    Ok(command.status().await?)
}

/// Remove everything inside `dir`, preserving the directory itself.
fn clear_dir_contents(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    debug!("Clearing {:?}", dir);
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// A fresh cache directory in the system temp area, name embedding the
/// cutoff so leftover directories from aborted runs are identifiable.
fn fresh_cache_dir(cutoff: Timestamp) -> Result<tempfile::TempDir> {
    let tag = cutoff.to_rfc3339().replace(':', "-");
    let dir = tempfile::Builder::new()
        .prefix(&format!("npm-bisect-cache-{tag}-"))
        .tempdir()?;
    debug!("Per-probe cache at {:?}", dir.path());
    Ok(dir)
}

/// Merge timeline fragment files an external agent may have written.
fn read_timeline_fragments(dir: &Path) -> Result<Vec<TimelineEvent>> {
    let mut events = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read(&path)?;
        match serde_json::from_slice::<Vec<TimelineEvent>>(&raw) {
            Ok(batch) => events.extend(batch),
            Err(err) => warn!("Skipping unreadable timeline fragment {:?}: {err}", path),
        }
    }
    Ok(events)
}

/// The production probe: runs real installs through `run_probe`.
pub struct RealProbe {
    ctx: ProbeContext,
}

impl RealProbe {
    pub fn new(ctx: ProbeContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl InstallProbe for RealProbe {
    async fn run(&mut self, request: &ProbeRequest) -> Result<Option<Vec<TimelineEvent>>> {
        run_probe(&self.ctx, request).await
    }
}
