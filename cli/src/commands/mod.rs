pub mod ls;
pub mod snapshots;

use crate::Cli;
use crate::config::CliConfig;
use anyhow::{Result, anyhow, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tidesnap_backends::{LocalBackend, RetryConfig, RetryingBackend, S3Backend};
use tidesnap_core::{Backend, Repository, Session};
use tracing::{debug, info};

/// Where a repository lives, as written on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
}

impl Location {
    pub fn parse(location: &str) -> Result<Self> {
        let Some(rest) = location.strip_prefix("s3:") else {
            return Ok(Location::Local(PathBuf::from(location)));
        };

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            bail!("S3 location {:?} has no bucket name", location);
        }
        Ok(Location::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }
}

async fn open_backend(location: &Location, retry: RetryConfig) -> Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match location {
        Location::Local(path) => Arc::new(RetryingBackend::new(LocalBackend::new(path), retry)),
        Location::S3 { bucket, prefix } => {
            let s3 = S3Backend::new(bucket.clone(), prefix.clone()).await?;
            Arc::new(RetryingBackend::new(s3, retry))
        }
    };
    Ok(backend)
}

fn password(cli: &Cli, config: &CliConfig) -> Result<String> {
    if let Some(password) = &cli.password {
        return Ok(password.clone());
    }
    if let Some(password) = config.read_password_file()? {
        return Ok(password);
    }
    rpassword::prompt_password("Enter repository password: ").map_err(|e| anyhow!("Password required: {}", e))
}

fn spinner(quiet: bool, message: &'static str) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Opens the repository named by flags or config and loads its index.
pub async fn open_session(cli: &Cli, config: &CliConfig) -> Result<Session> {
    let location = cli
        .repo
        .clone()
        .or_else(|| config.repo.clone())
        .ok_or_else(|| anyhow!("Repository path required (--repo, TIDESNAP_REPO or config file)"))?;
    let password = password(cli, config)?;

    info!("Opening repository at: {}", location);
    let backend = open_backend(&Location::parse(&location)?, config.retry.to_retry_config()).await?;
    let repo = Repository::open(backend, &password).await?;

    let pb = spinner(cli.quiet, "Loading index...")?;
    let session = Session::open(repo).await;
    pb.finish_and_clear();
    let session = session?;

    debug!(
        blobs = session.index().len(),
        packs = session.index().pack_ids().count(),
        conflicts = session.index().conflicts(),
        "Index loaded"
    );
    Ok(session)
}
