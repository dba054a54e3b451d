//! Shared state of a running daemon.
//!
//! The reference implementation kept the config, the store handle and the
//! membership map as module globals; here they travel as one explicit
//! context handed to every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::hostfs::{HostFs, LocalFs};
use crate::membership::Membership;
use crate::store::MetaStore;

pub struct ServerContext {
    pub config: Config,
    store: Option<MetaStore>,
    pub membership: Membership,
    pub fs: Arc<dyn HostFs>,
}

impl ServerContext {
    /// Builds the context, opening the metadata store when this host is the
    /// tracker.
    pub fn new(config: Config) -> Result<Self> {
        let store = if config.istracker {
            Some(MetaStore::open(std::path::Path::new(&config.db))?)
        } else {
            None
        };
        Ok(Self { config, store, membership: Membership::new(), fs: Arc::new(LocalFs) })
    }

    /// Context over an in-memory store, for tests.
    pub fn with_memory_store(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            store: Some(MetaStore::memory()?),
            membership: Membership::new(),
            fs: Arc::new(LocalFs),
        })
    }

    pub fn is_tracker(&self) -> bool {
        self.config.istracker
    }

    pub fn store(&self) -> Option<&MetaStore> {
        self.store.as_ref()
    }

    /// Whether a physical-path location token denotes this host: its name,
    /// its full `ip:port`, or its bare ip. Matching on the full address keeps
    /// hosts apart when a federation shares one interface.
    pub fn is_self_location(&self, location: &str) -> bool {
        location == self.config.name
            || location == self.config.self_addr()
            || location == self.config.ip
    }
}
