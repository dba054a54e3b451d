//! Path grammar of the federation.
//!
//! Three shapes reach a handler: `//` asks for the host roster, `//<location>/<tail>`
//! names a physical path on one host, and anything starting with a single `/`
//! is a logical path resolved by the tracker. `location` is a host name or an
//! `ip:port` pair, told apart by the presence of a `.`.

/// A request target, parsed once at handler ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `//` — enumerate hosts.
    HostRoster,
    /// `//<location>/<tail>` — a path on one host. The tail keeps the exact
    /// spelling of the wire (trailing `/` included); callers trim where the
    /// operation calls for it.
    Physical { location: String, tail: String },
    /// A logical path under the unified namespace root.
    Logical(String),
}

impl Target {
    pub fn parse(raw: &str) -> Target {
        if raw == "//" {
            return Target::HostRoster;
        }
        if let Some(rest) = raw.strip_prefix("//") {
            let (location, tail) = match rest.split_once('/') {
                Some((location, tail)) => (location.to_string(), normalize_tail(tail)),
                // `//h1` — the bare host root
                None => (rest.to_string(), "/".to_string()),
            };
            return Target::Physical { location, tail };
        }
        Target::Logical(raw.to_string())
    }
}

/// A tail whose first segment carries a `:` is a drive-prefixed absolute path
/// outside the host root and is kept verbatim; everything else is
/// root-relative and gains its leading `/`.
fn normalize_tail(tail: &str) -> String {
    if tail.is_empty() {
        return "/".to_string();
    }
    let first_segment = tail.split('/').next().unwrap_or(tail);
    if first_segment.contains(':') {
        tail.to_string()
    } else {
        format!("/{tail}")
    }
}

/// Whether a location token names an `ip:port` rather than a host name.
pub fn location_is_addr(location: &str) -> bool {
    location.contains('.')
}

/// Whether a stored physical path lies outside the owning host's root.
/// Inside-root paths are `/`-prefixed relative strings; outside-root paths
/// are drive-prefixed tails kept verbatim or `//`-prefixed absolutes.
pub fn outside_root(physical: &str) -> bool {
    if physical.starts_with("//") {
        return true;
    }
    let first_segment = physical.split('/').find(|s| !s.is_empty()).unwrap_or("");
    !physical.starts_with('/') || first_segment.contains(':')
}

/// Strips trailing `/` characters, keeping `/` and `//` themselves intact.
pub fn trim_trailing_slash(path: &str) -> &str {
    if path == "/" || path == "//" {
        return path;
    }
    path.trim_end_matches('/')
}

/// Parent prefix of a logical path: the substring up to the last `/`, with
/// the empty prefix reading as the root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final component of a path, without its leading `/`.
pub fn leaf(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
