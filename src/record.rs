//! Row and reply-body types of the metadata table.

use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp rendering used across the store and the wire.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a filesystem timestamp the way records carry it.
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIME_FORMAT).to_string()
}

/// Current wall-clock time in record format.
pub fn now_stamp() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Row category: what the physical side of a record denotes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Category {
    Directory = 0,
    File = 1,
    /// A logical name bound to a physical location, including purely-logical
    /// directories created by `md`.
    Link = 2,
}

impl Category {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Category {
        match value {
            0 => Category::Directory,
            1 => Category::File,
            _ => Category::Link,
        }
    }

    /// One-letter type tag used in physical `ls` listings.
    pub fn type_tag(self) -> &'static str {
        match self {
            Category::Directory => "d",
            _ => "f",
        }
    }
}

/// One row of the `filesystem` table.
#[derive(Debug, Clone, PartialEq)]
pub struct FsRecord {
    pub logical_path: Option<String>,
    pub physical_path: Option<String>,
    pub category: Category,
    pub ctime: String,
    pub mtime: String,
    pub size: u64,
    pub host_addr: Option<String>,
    pub host_name: Option<String>,
}

/// Roster element of an `ls //` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub addr: String,
}

/// Listing element of an `ls` reply.
///
/// For physical listings `kind` is a `d`/`f` tag; for logical listings it
/// carries the record's physical path, which the shell uses to derive the
/// downstream transfer target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub ctime: String,
    pub mtime: String,
    pub size: u64,
    pub host: Option<String>,
}
