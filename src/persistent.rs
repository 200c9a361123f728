//! Persistent configuration store.
//!
//! The discovery core consults the store for the initiator identity, the
//! enabled-method set, per-name parameter overrides, static targets,
//! SendTargets discovery addresses, CHAP records, and configured-session
//! counts. The file-backed implementation keeps the whole document as JSON
//! at a configurable path and rewrites it on every mutation.

use crate::addr;
use crate::error::DiscoveryError;
use crate::method::MethodSet;
use crate::params::LoginParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default store path
pub const DEFAULT_STORE_PATH: &str = "/etc/iscsi/initiator.json";

/// A stored portal address: raw address bytes, port, and portal group tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub ip: Vec<u8>,
    pub port: u16,
    #[serde(default)]
    pub tpgt: u16,
}

impl DiscoveryEntry {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        let bytes = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Self {
            ip: bytes,
            port,
            tpgt: 0,
        }
    }

    pub fn with_tpgt(mut self, tpgt: u16) -> Self {
        self.tpgt = tpgt;
        self
    }

    pub fn to_socket_addr(&self) -> std::result::Result<SocketAddr, DiscoveryError> {
        addr::to_socket_addr(&self.ip, self.port)
    }
}

/// CHAP credentials for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapRecord {
    pub user: String,
    pub secret: String,
}

/// Configured-session count for a node: how many sessions to create per
/// discovered target, and whether they are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredSessions {
    pub count: u16,
    pub bound: bool,
}

impl Default for ConfiguredSessions {
    fn default() -> Self {
        Self {
            count: 1,
            bound: true,
        }
    }
}

/// Per-name login-parameter overrides: a bitmap of which parameters are
/// overridden plus the value block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub bitmap: u16,
    pub params: LoginParams,
}

/// A statically configured target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticTarget {
    pub name: String,
    pub entry: DiscoveryEntry,
}

/// Interface the discovery core consumes.
///
/// Enumeration methods return a snapshot cloned under the store's internal
/// lock, so a walk observes a consistent document.
pub trait PersistentStore: Send + Sync {
    /// (Re-)initialize the store. `restart` means the backing document may
    /// have been replaced and must be re-read.
    fn init(&self, restart: bool) -> std::result::Result<(), DiscoveryError>;

    fn disc_methods(&self) -> MethodSet;
    fn set_disc_methods(&self, methods: MethodSet) -> std::result::Result<(), DiscoveryError>;

    fn initiator_name(&self) -> Option<String>;
    fn set_initiator_name(&self, name: &str) -> std::result::Result<(), DiscoveryError>;
    fn alias(&self) -> Option<String>;
    fn set_alias(&self, alias: &str) -> std::result::Result<(), DiscoveryError>;

    fn chap(&self, name: &str) -> Option<ChapRecord>;
    fn set_chap(&self, name: &str, record: ChapRecord)
        -> std::result::Result<(), DiscoveryError>;

    fn params(&self) -> Vec<(String, ParamRecord)>;
    fn param(&self, name: &str) -> Option<ParamRecord>;

    fn static_targets(&self) -> Vec<(String, DiscoveryEntry)>;
    fn discovery_addrs(&self) -> Vec<DiscoveryEntry>;

    fn config_session(&self, name: &str) -> Option<ConfiguredSessions>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    initiator_name: Option<String>,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    methods: MethodSet,
    #[serde(default)]
    chap: HashMap<String, ChapRecord>,
    #[serde(default)]
    params: HashMap<String, ParamRecord>,
    #[serde(default)]
    static_targets: Vec<StaticTarget>,
    #[serde(default)]
    discovery_addrs: Vec<DiscoveryEntry>,
    #[serde(default)]
    config_sessions: HashMap<String, ConfiguredSessions>,
}

/// JSON-file-backed persistent store.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Load the store from disk, or create a new one if it doesn't exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            log::info!("Creating new initiator store at {:?}", path);

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
            }

            let store = Self {
                path: path.to_path_buf(),
                data: Mutex::new(StoreData::default()),
            };
            store.save(&store.data.lock().unwrap())?;
            Ok(store)
        }
    }

    /// Load the store from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = Self::read_document(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    fn read_document(path: &Path) -> Result<StoreData> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read initiator store from {:?}", path))?;

        let data: StoreData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse initiator store JSON from {:?}", path))?;

        log::debug!(
            "Loaded initiator store with {} static target(s), {} discovery address(es)",
            data.static_targets.len(),
            data.discovery_addrs.len()
        );
        Ok(data)
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)
            .context("Failed to serialize initiator store to JSON")?;

        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write initiator store to {:?}", self.path))?;
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> std::result::Result<(), DiscoveryError>
    where
        F: FnOnce(&mut StoreData),
    {
        let mut data = self.data.lock().unwrap();
        f(&mut data);
        self.save(&data)
            .map_err(|e| DiscoveryError::StoreUnavailable(e.to_string()))
    }

    pub fn add_static_target(
        &self,
        name: &str,
        entry: DiscoveryEntry,
    ) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| {
            d.static_targets.push(StaticTarget {
                name: name.to_string(),
                entry,
            })
        })
    }

    pub fn add_discovery_addr(
        &self,
        entry: DiscoveryEntry,
    ) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| d.discovery_addrs.push(entry))
    }

    pub fn set_param(
        &self,
        name: &str,
        record: ParamRecord,
    ) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| {
            d.params.insert(name.to_string(), record);
        })
    }

    pub fn set_config_session(
        &self,
        name: &str,
        ics: ConfiguredSessions,
    ) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| {
            d.config_sessions.insert(name.to_string(), ics);
        })
    }
}

impl PersistentStore for FileStore {
    fn init(&self, restart: bool) -> std::result::Result<(), DiscoveryError> {
        if !restart {
            return Ok(());
        }
        // A restart means a new document may have been copied in place;
        // re-read it.
        let fresh = Self::read_document(&self.path)
            .map_err(|e| DiscoveryError::StoreUnavailable(e.to_string()))?;
        *self.data.lock().unwrap() = fresh;
        Ok(())
    }

    fn disc_methods(&self) -> MethodSet {
        self.data.lock().unwrap().methods
    }

    fn set_disc_methods(&self, methods: MethodSet) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| d.methods = methods)
    }

    fn initiator_name(&self) -> Option<String> {
        self.data.lock().unwrap().initiator_name.clone()
    }

    fn set_initiator_name(&self, name: &str) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| d.initiator_name = Some(name.to_string()))
    }

    fn alias(&self) -> Option<String> {
        self.data.lock().unwrap().alias.clone()
    }

    fn set_alias(&self, alias: &str) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| d.alias = Some(alias.to_string()))
    }

    fn chap(&self, name: &str) -> Option<ChapRecord> {
        self.data.lock().unwrap().chap.get(name).cloned()
    }

    fn set_chap(
        &self,
        name: &str,
        record: ChapRecord,
    ) -> std::result::Result<(), DiscoveryError> {
        self.mutate(|d| {
            d.chap.insert(name.to_string(), record);
        })
    }

    fn params(&self) -> Vec<(String, ParamRecord)> {
        let data = self.data.lock().unwrap();
        let mut records: Vec<_> = data
            .params
            .iter()
            .map(|(name, rec)| (name.clone(), rec.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    fn param(&self, name: &str) -> Option<ParamRecord> {
        self.data.lock().unwrap().params.get(name).cloned()
    }

    fn static_targets(&self) -> Vec<(String, DiscoveryEntry)> {
        let data = self.data.lock().unwrap();
        data.static_targets
            .iter()
            .map(|t| (t.name.clone(), t.entry.clone()))
            .collect()
    }

    fn discovery_addrs(&self) -> Vec<DiscoveryEntry> {
        self.data.lock().unwrap().discovery_addrs.clone()
    }

    fn config_session(&self, name: &str) -> Option<ConfiguredSessions> {
        self.data.lock().unwrap().config_sessions.get(name).copied()
    }
}
