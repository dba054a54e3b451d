//! Tracker metadata handlers: `ln`, `ls`, `md`, `rm`.

use tokio::net::TcpStream;

use crate::error::Result;
use crate::path::{self, Target};
use crate::record::Category;
use crate::store::MetaStore;
use crate::wire::Status;

use super::{reply, reply_with_body};

/// `ln <src_physical> [<dst_logical>]`
pub async fn ln(
    store: &MetaStore,
    src: &str,
    dst: Option<&str>,
    host_name: &str,
    length: Option<u64>,
    socket: &mut TcpStream,
) -> Result<()> {
    let Target::Physical { location, tail } = Target::parse(src) else {
        return reply(socket, Status::IllegalCommand).await;
    };
    let size = length.unwrap_or(0);

    match dst {
        Some(dst) => {
            let dst = path::trim_trailing_slash(dst);
            if !store.logical_exists(path::parent(dst)).await? {
                return reply(socket, Status::ParentPathMissing).await;
            }
            if store.logical_exists(dst).await? {
                return reply(socket, Status::PathAlreadyExist).await;
            }
            let stored = path::trim_trailing_slash(&tail);
            store.insert_link(dst, stored, size, &location, host_name).await?;
            tracing::info!(src, dst, "linked");
        }
        None => {
            // a trailing slash on the tail marks a directory
            let category =
                if tail.ends_with('/') { Category::Directory } else { Category::File };
            let stored = path::trim_trailing_slash(&tail);
            store.insert_physical(stored, category, size, &location, host_name).await?;
            tracing::info!(host = host_name, path = stored, "recorded physical path");
        }
    }
    reply(socket, Status::Ok).await
}

/// `ls <dst>` — host roster, physical listing or logical listing.
pub async fn ls(store: &MetaStore, dst: &str, socket: &mut TcpStream) -> Result<()> {
    let dst =
        if dst.starts_with("//") { path::trim_trailing_slash(dst) } else { dst };

    match Target::parse(dst) {
        Target::HostRoster => {
            let hosts = store.hosts().await?;
            if hosts.is_empty() {
                return reply(socket, Status::NoHostDetected).await;
            }
            reply_with_body(socket, &serde_json::to_vec(&hosts)?).await
        }
        Target::Physical { location, tail } => {
            let entries = store.list_physical(&location, &tail).await?;
            if entries.is_empty() {
                return reply(socket, Status::PathNotFound).await;
            }
            reply_with_body(socket, &serde_json::to_vec(&entries)?).await
        }
        Target::Logical(logical) => {
            let entries = store.list_logical(&logical).await?;
            if entries.is_empty() {
                return reply(socket, Status::PathNotFound).await;
            }
            reply_with_body(socket, &serde_json::to_vec(&entries)?).await
        }
    }
}

/// `md <dst_logical>` — a purely-logical directory.
pub async fn md(store: &MetaStore, dst: &str, socket: &mut TcpStream) -> Result<()> {
    let dst = path::trim_trailing_slash(dst);
    if !store.logical_exists(path::parent(dst)).await? {
        return reply(socket, Status::ParentPathMissing).await;
    }
    if store.logical_exists(dst).await? {
        return reply(socket, Status::PathAlreadyExist).await;
    }
    store.insert_logical_dir(dst).await?;
    tracing::info!(dst, "made logical directory");
    reply(socket, Status::Ok).await
}

/// `rm <dst>` — subtree delete, link detach, or physical-row delete.
pub async fn rm(store: &MetaStore, dst: &str, socket: &mut TcpStream) -> Result<()> {
    let dst = path::trim_trailing_slash(dst);
    match Target::parse(dst) {
        Target::Logical(logical) => {
            // the namespace root is permanent
            if logical == "/" {
                return reply(socket, Status::IllegalCommand).await;
            }
            let Some(physical) = store.physical_of(&logical).await? else {
                return reply(socket, Status::PathNotFound).await;
            };
            match physical {
                Some(physical) if !path::outside_root(&physical) => {
                    store.detach_logical(&logical).await?;
                    tracing::info!(path = %logical, "detached logical path");
                }
                _ => {
                    store.remove_logical_tree(&logical).await?;
                    tracing::info!(path = %logical, "deleted logical subtree");
                }
            }
            reply(socket, Status::Ok).await
        }
        Target::Physical { location, tail } => {
            store.remove_physical(&location, &tail).await?;
            tracing::info!(host = %location, path = %tail, "deleted physical path");
            reply(socket, Status::Ok).await
        }
        Target::HostRoster => reply(socket, Status::IllegalCommand).await,
    }
}
