//! Host configuration loaded from a YAML file.
//!
//! Every host in the federation runs from the same config shape; the
//! `istracker` flag selects the tracker role. `ip` defaults to loopback,
//! matching the reference deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_db() -> String {
    "pns.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host name, unique across the federation.
    pub name: String,
    /// Absolute path of the directory this host exports.
    pub root: String,
    /// Listen port.
    pub port: u16,
    /// `ip:port` of the tracker; may denote this host.
    pub tracker: String,
    #[serde(default)]
    pub istracker: bool,
    /// Shared secret for the request authenticator.
    pub secret: String,
    /// Externally reachable address of this host.
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Metadata store file, used only by the tracker.
    #[serde(default = "default_db")]
    pub db: String,
}

impl Config {
    /// Reads and normalizes a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.normalize()?;
        tracing::info!(path = %path.display(), name = %config.name, "loaded config");
        Ok(config)
    }

    /// Strips the trailing `/` from `root` and validates the tracker address.
    pub fn normalize(&mut self) -> Result<()> {
        while self.root.len() > 1 && self.root.ends_with('/') {
            self.root.pop();
        }
        let port_ok = self
            .tracker
            .split_once(':')
            .map(|(_, port)| port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if !port_ok {
            return Err(Error::Config(format!(
                "tracker must be ip:port, got {:?}",
                self.tracker
            )));
        }
        Ok(())
    }

    /// `ip:port` of this host, the form stored in metadata records.
    pub fn self_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn tracker_ip(&self) -> &str {
        self.tracker.split(':').next().unwrap_or(&self.tracker)
    }

    /// Tracker port; [`Config::normalize`] guarantees it parses.
    pub fn tracker_port(&self) -> u16 {
        self.tracker.split(':').nth(1).and_then(|port| port.parse().ok()).unwrap_or(0)
    }

    pub fn root_path(&self) -> &Path {
        Path::new(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_normalizes_root_and_defaults_ip() {
        let yaml = "name: h1\nroot: /tmp/h1/\nport: 9001\ntracker: 127.0.0.1:9000\nsecret: hush\n";
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        config.normalize().unwrap();
        assert_eq!(config.root, "/tmp/h1");
        assert_eq!(config.ip, "127.0.0.1");
        assert!(!config.istracker);
        assert_eq!(config.self_addr(), "127.0.0.1:9001");
        assert_eq!(config.tracker_ip(), "127.0.0.1");
        assert_eq!(config.tracker_port(), 9000);
    }

    #[test]
    fn tracker_without_port_is_rejected() {
        let yaml = "name: h1\nroot: /tmp/h1\nport: 9001\ntracker: 127.0.0.1\nsecret: hush\n";
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.normalize().is_err());
    }
}
