use super::open_session;
use crate::config::CliConfig;
use anyhow::{Result, anyhow};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tidesnap_core::{Snapshot, SnapshotFilter, SnapshotID};

#[derive(Args)]
pub struct SnapshotsCommand {
    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,

    #[arg(short = 'H', long, help = "Filter by hostname")]
    host: Option<String>,

    #[arg(long = "path", value_name = "PATH", help = "Filter by path")]
    paths: Vec<PathBuf>,

    #[arg(long, help = "Show latest N snapshots")]
    latest: Option<usize>,
}

#[derive(Serialize)]
struct SnapshotRecord<'a> {
    id: &'a SnapshotID,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

impl SnapshotsCommand {
    pub async fn run(&self, cli: &crate::Cli, config: &CliConfig) -> Result<()> {
        let format = self.format.as_deref().unwrap_or("table");
        if format != "table" && format != "json" {
            return Err(anyhow!("Unsupported format: {}", format));
        }

        let session = open_session(cli, config).await?;
        let mut filter = SnapshotFilter::new();
        if let Some(host) = &self.host {
            filter = filter.with_host(host);
        }
        for path in &self.paths {
            filter = filter.with_path(path);
        }

        let mut snapshots = session.snapshots().await?;
        snapshots.retain(|(_, snapshot)| filter.matches(snapshot));
        if let Some(latest) = self.latest {
            snapshots.truncate(latest);
        }

        if format == "json" {
            let records: Vec<_> = snapshots
                .iter()
                .map(|(id, snapshot)| SnapshotRecord { id, snapshot })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        if snapshots.is_empty() {
            println!("No snapshots found");
            return Ok(());
        }

        print!("{}", render_table(&snapshots));
        Ok(())
    }
}

fn render_table(snapshots: &[(SnapshotID, Snapshot)]) -> String {
    let mut out = format!(
        "{:<10} {:<20} {:<15} {:<20} {}\n",
        "ID", "Date", "Host", "Tags", "Paths"
    );
    out.push_str(&format!("{:-<90}\n", ""));

    for (id, snapshot) in snapshots {
        let paths = snapshot
            .paths
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!(
            "{:<10} {:<20} {:<15} {:<20} {}\n",
            id.short_string(),
            snapshot.time.format("%Y-%m-%d %H:%M:%S"),
            snapshot.hostname,
            snapshot.tags.join(","),
            paths
        ));
    }
    out
}
