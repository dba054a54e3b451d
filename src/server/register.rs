//! Bootstrap registration and the heartbeat sender.
//!
//! On startup every daemon publishes its root tree: the tracker writes rows
//! locally after purging its previous ones, everyone else issues one `ln`
//! round-trip per entry. Non-trackers then heartbeat every second; the reply
//! is the current roster.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::client::TrackerClient;
use crate::config::Config;
use crate::context::ServerContext;
use crate::error::Result;
use crate::hostfs::HostFs;
use crate::membership::HEARTBEAT_PERIOD;
use crate::path;
use crate::record::Category;

/// Publishes this host's root tree, then returns; the daemon serves after.
pub async fn bootstrap(ctx: &Arc<ServerContext>) -> Result<()> {
    let root = ctx.config.root_path().to_path_buf();
    match ctx.store() {
        Some(store) => {
            store.purge_addr(&ctx.config.self_addr()).await?;
            let stat = ctx.fs.stat(&root).await?;
            let category = if stat.is_dir { Category::Directory } else { Category::File };
            store
                .insert_physical_stamped(
                    "/",
                    category,
                    &stat.ctime,
                    &stat.mtime,
                    stat.size,
                    &ctx.config.self_addr(),
                    &ctx.config.name,
                )
                .await?;
            tracing::info!(root = %root.display(), "loading tracker root");

            let mut stack = vec![root];
            while let Some(dir) = stack.pop() {
                if !ctx.fs.is_dir(&dir).await {
                    continue;
                }
                for entry in ctx.fs.list_dir(&dir).await? {
                    let stat = ctx.fs.stat(&entry).await?;
                    let category =
                        if stat.is_dir { Category::Directory } else { Category::File };
                    let rel = root_relative(&ctx.config, &entry);
                    store
                        .insert_physical_stamped(
                            &rel,
                            category,
                            &stat.ctime,
                            &stat.mtime,
                            stat.size,
                            &ctx.config.self_addr(),
                            &ctx.config.name,
                        )
                        .await?;
                    tracing::info!(path = %rel, "loaded");
                    if stat.is_dir {
                        stack.push(entry);
                    }
                }
            }
        }
        None => {
            link_one(&ctx.config, ctx.fs.as_ref(), &root, None, true).await?;
            link_tree(&ctx.config, ctx.fs.as_ref(), &root, None, true).await?;
        }
    }
    Ok(())
}

/// This host's path under its root, `/`-prefixed; the root itself is `/`.
pub(crate) fn root_relative(config: &Config, local: &Path) -> String {
    let full = local.to_string_lossy();
    if let Some(rel) = full.strip_prefix(config.root.as_str()) {
        if rel.is_empty() {
            "/".to_string()
        } else {
            rel.to_string()
        }
    } else {
        full.into_owned()
    }
}

/// Physical-path spelling of a local path, directory marked by trailing `/`.
pub(crate) fn to_physical(config: &Config, local: &Path, in_root: bool, is_dir: bool) -> String {
    let mut tail = if in_root {
        root_relative(config, local)
    } else {
        format!("/{}", local.display())
    };
    if is_dir && !tail.ends_with('/') {
        tail.push('/');
    }
    format!("//{}{}", config.self_addr(), tail)
}

/// One `ln` round-trip for one local path.
pub(crate) async fn link_one(
    config: &Config,
    fs: &dyn HostFs,
    local: &Path,
    logical: Option<&str>,
    in_root: bool,
) -> Result<()> {
    let stat = fs.stat(local).await?;
    let physical = to_physical(config, local, in_root, stat.is_dir);
    let command = match logical {
        Some(logical) => format!("ln {physical} {logical}"),
        None => format!("ln {physical}"),
    };
    TrackerClient::new(config).round_trip_sized(&command, stat.size).await?;
    tracing::info!(path = %local.display(), "linked");
    Ok(())
}

/// Links every entry below `dir`, extending `logical_root` into
/// subdirectories when a logical prefix is being built.
pub(crate) async fn link_tree(
    config: &Config,
    fs: &dyn HostFs,
    dir: &Path,
    logical_root: Option<&str>,
    in_root: bool,
) -> Result<()> {
    let seed_logical = logical_root.map(|root| path::trim_trailing_slash(root).to_string());
    let mut stack: Vec<(PathBuf, Option<String>)> = vec![(dir.to_path_buf(), seed_logical)];
    while let Some((dir, logical_dir)) = stack.pop() {
        if !fs.is_dir(&dir).await {
            continue;
        }
        for entry in fs.list_dir(&dir).await? {
            let leaf = entry
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let logical = logical_dir.as_ref().map(|prefix| format!("{prefix}/{leaf}"));
            link_one(config, fs, &entry, logical.as_deref(), in_root).await?;
            if fs.is_dir(&entry).await {
                stack.push((entry, logical));
            }
        }
    }
    Ok(())
}

/// Periodic heartbeat of a non-tracker daemon.
pub struct HeartbeatTask;

impl HeartbeatTask {
    pub fn spawn(config: Config) -> JoinHandle<()> {
        tokio::spawn(Self::run(config))
    }

    async fn run(config: Config) {
        let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let client = TrackerClient::new(&config);
            match client.heartbeat().await {
                Ok(roster) => {
                    let living: Vec<&str> = roster.iter().map(|h| h.name.as_str()).collect();
                    tracing::debug!(?living, "heartbeat acknowledged");
                }
                Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
            }
        }
    }
}
