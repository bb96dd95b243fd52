use super::open_session;
use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tidesnap_core::{NodeType, Snapshot, SnapshotFilter, SnapshotID, WalkEntry, WalkOptions};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Args)]
pub struct LsCommand {
    #[arg(short, long, help = "Use a long listing format showing size and mode")]
    long: bool,

    #[arg(short = 'H', long, help = "Only consider snapshots for this host when the snapshot ID is \"latest\"")]
    host: Option<String>,

    #[arg(
        long = "path",
        value_name = "PATH",
        help = "Only consider snapshots which include this (absolute) path when the snapshot ID is \"latest\""
    )]
    paths: Vec<PathBuf>,

    #[arg(help = "Snapshot ID, a unique prefix of one, or \"latest\"")]
    snapshot_id: String,
}

impl LsCommand {
    fn filter(&self) -> SnapshotFilter {
        let mut filter = SnapshotFilter::new();
        if let Some(host) = &self.host {
            filter = filter.with_host(host);
        }
        for path in &self.paths {
            filter = filter.with_path(path);
        }
        filter
    }

    pub async fn run(&self, cli: &crate::Cli, config: &CliConfig) -> Result<()> {
        let session = open_session(cli, config).await?;

        let id = session
            .resolve_snapshot(&self.snapshot_id, &self.filter())
            .await
            .with_context(|| format!("Cannot resolve snapshot {:?}", self.snapshot_id))?;
        let snapshot = session.load_snapshot(&id).await?;

        if !cli.quiet {
            eprintln!("{}", header(&id, &snapshot));
        }

        let options = WalkOptions {
            max_depth: config.max_depth(),
        };
        let mut walker = session.walk_snapshot(&snapshot, options);
        let mut out = BufWriter::new(io::stdout());
        while let Some(entry) = walker.next_entry().await? {
            writeln!(out, "{}", format_entry(&entry, self.long))?;
        }
        out.flush()?;

        Ok(())
    }
}

fn header(id: &SnapshotID, snapshot: &Snapshot) -> String {
    let paths = snapshot
        .paths
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "snapshot {} of [{}] at {}:",
        id.short_string(),
        paths,
        snapshot.time.format(TIME_FORMAT)
    )
}

fn format_entry(entry: &WalkEntry, long: bool) -> String {
    let path = entry.path();
    if !long {
        return path;
    }

    let node = &entry.node;
    let mtime = node.mtime.format(TIME_FORMAT);
    match &node.node_type {
        NodeType::File | NodeType::Dir => format!(
            "{} {:5} {:5} {:6} {} {}",
            node.mode_string(),
            node.uid,
            node.gid,
            node.size,
            mtime,
            path
        ),
        NodeType::Symlink => format!(
            "{} {:5} {:5} {:6} {} {} -> {}",
            node.mode_string(),
            node.uid,
            node.gid,
            node.size,
            mtime,
            path,
            node.linktarget.as_deref().unwrap_or_default()
        ),
        NodeType::Other(kind) => format!("<Node({}) {}>", kind, node.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tidesnap_core::{Node, ObjectID};

    fn entry(parent: &str, node: Node) -> WalkEntry {
        WalkEntry {
            parent: parent.to_string(),
            node,
        }
    }

    #[test]
    fn short_format_is_the_joined_path() {
        let mtime = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_entry(&entry("", Node::file("a.txt", 3, mtime)), false), "a.txt");
        assert_eq!(
            format_entry(&entry("home/docs", Node::file("a.txt", 3, mtime)), false),
            "home/docs/a.txt"
        );
    }

    #[test]
    fn long_format_per_node_type() {
        let mtime = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();

        let mut file = Node::file("a.txt", 1234, mtime);
        file.uid = 1000;
        file.gid = 100;
        assert_eq!(
            format_entry(&entry("docs", file), true),
            "-rw-r--r--  1000   100   1234 2024-05-01 12:30:05 docs/a.txt"
        );

        let dir = Node::dir("docs", Some(ObjectID::from_data(b"t")), mtime);
        assert_eq!(
            format_entry(&entry("", dir), true),
            "drwxr-xr-x     0     0      0 2024-05-01 12:30:05 docs"
        );

        let link = Node::symlink("current", "releases/7", mtime);
        assert_eq!(
            format_entry(&entry("srv", link), true),
            "lrwxrwxrwx     0     0      0 2024-05-01 12:30:05 srv/current -> releases/7"
        );

        let fifo = Node::with_type("pipe", NodeType::Other("fifo".to_string()), 0o600, 0, mtime);
        assert_eq!(format_entry(&entry("run", fifo), true), "<Node(fifo) pipe>");
    }

    #[test]
    fn header_names_short_id_paths_and_time() {
        let tree = ObjectID::from_data(b"root");
        let snapshot = Snapshot::new(vec!["/home".into(), "/etc".into()], tree)
            .with_time(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let id = ObjectID::from_data(b"snapshot");

        assert_eq!(
            header(&id, &snapshot),
            format!("snapshot {} of [/home /etc] at 2024-05-01 08:00:00:", id.short_string())
        );
    }

    #[test]
    fn filter_collects_host_and_paths() {
        let cmd = LsCommand {
            long: false,
            host: Some("web1".to_string()),
            paths: vec![PathBuf::from("/srv")],
            snapshot_id: "latest".to_string(),
        };
        assert_eq!(
            cmd.filter(),
            SnapshotFilter::new().with_host("web1").with_path("/srv")
        );
    }
}
