//! Hierarchical store for bundles.
//!
//! A [`Store`] maps [`Bundle`]s onto one node file: one group per bundle
//! below the root, one group per container, one array node per data array
//! and per axis. The layout and its version history are described in
//! [`schema`].
//!
//! ```no_run
//! use acqdata::prelude::*;
//!
//! let registry = UnitRegistry::with_si();
//! let time = Axis::uniform("time", registry.parse("s")?, 0.0, 0.1, 4)?;
//! let trace = DataContainer::raw("trace", vec![NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0])])?
//!     .with_unit(registry.parse("mV")?)
//!     .with_axis(time)?;
//! let bundle = Bundle::new("frame").with(trace)?;
//!
//! let store = Store::open_or_create("run.acq", &StoreConfig::default())?;
//! store.save_bundle(&bundle, SaveMode::Overwrite)?;
//! let loaded = store.load_bundle("frame")?;
//! assert_eq!(loaded.bundle.get("trace")?.array(0), bundle.get("trace")?.array(0));
//! # Ok::<(), acqdata::Error>(())
//! ```

mod config;
mod load;
mod save;
pub mod schema;

pub use config::{StoreConfig, DATA_DIR_ENV};

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, info_span, warn};

use crate::data::Bundle;
use crate::node::{NodeFile, NodeOptions, NodeSnapshot, NodeSpec};
use crate::units::UnitRegistry;
use crate::util::{AttrValue, Attributes, Error, Result};
use load::Decoder;
use schema::{CURRENT_SCHEMA_VERSION, LOGGER_GROUP, LOG_ENTRIES, ORDER, SCHEMA_VERSION};

/// What to do when a bundle of the same name is already stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the stored bundle.
    #[default]
    Overwrite,
    /// Keep it and store under `name_001`, `name_002`, ...
    Append,
}

/// A node that could not be saved or loaded.
#[derive(Debug)]
pub struct NodeFailure {
    pub path: String,
    pub error: Error,
}

/// Outcome of [`Store::save_bundle`].
#[derive(Debug)]
pub struct SaveReport {
    /// Node path of the bundle.
    pub path: String,
    /// Node name the bundle was stored under.
    pub node_name: String,
    /// Number of containers written.
    pub saved: usize,
    /// Containers that were skipped.
    pub failures: Vec<NodeFailure>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of [`Store::load_bundle`].
#[derive(Debug)]
pub struct LoadedBundle {
    pub path: String,
    /// The containers that could be rebuilt.
    pub bundle: Bundle,
    /// Containers that could not.
    pub failures: Vec<NodeFailure>,
    /// Schema version the bundle was stored with.
    pub schema_version: u32,
}

impl LoadedBundle {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An open store file.
///
/// All operations on one `Store` are serialized through an internal lock.
/// Several read-only stores may have the same file open at once.
pub struct Store {
    path: PathBuf,
    config: StoreConfig,
    registry: UnitRegistry,
    file: Mutex<NodeFile>,
}

impl Store {
    /// Create a new, empty store file, replacing any file at `path`.
    pub fn create(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut file = NodeFile::create(path, node_options(config, true))?;
        let attrs = Attributes::new().with(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
        file.commit(&NodeSpec::group("", attrs, Vec::new()))?;
        info!(path = %path.display(), "created store");
        Ok(Self::from_file(file, config))
    }

    /// Open an existing store file for reading and writing.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        Self::open_with(path.as_ref(), config, true)
    }

    /// Open an existing store file without write access.
    pub fn open_read_only(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        Self::open_with(path.as_ref(), config, false)
    }

    pub fn open_or_create(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    /// Open (or create) the store at the configured default location.
    pub fn open_default(config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::open_or_create(config.default_path(), config)
    }

    fn open_with(path: &Path, config: &StoreConfig, writable: bool) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file = NodeFile::open(path, node_options(config, writable))?;
        let root = file.root();
        if root.attrs.contains(SCHEMA_VERSION) {
            let version = schema::stored_version(root)?;
            if version > CURRENT_SCHEMA_VERSION {
                return Err(Error::UnsupportedSchema {
                    path: root.path.clone(),
                    version,
                    supported: CURRENT_SCHEMA_VERSION,
                });
            }
        }
        info!(path = %path.display(), writable, "opened store");
        Ok(Self::from_file(file, config))
    }

    fn from_file(file: NodeFile, config: &StoreConfig) -> Self {
        Self {
            path: file.path().to_path_buf(),
            config: config.clone(),
            registry: UnitRegistry::with_si(),
            file: Mutex::new(file),
        }
    }

    /// Use `registry` to resolve stored unit strings.
    pub fn with_registry(mut self, registry: UnitRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn is_read_only(&self) -> bool {
        !self.file.lock().options().writable
    }

    /// File size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file.lock().size()
    }

    /// Write `bundle`. Containers that cannot be encoded are skipped and
    /// listed in the report; the rest are committed.
    pub fn save_bundle(&self, bundle: &Bundle, mode: SaveMode) -> Result<SaveReport> {
        let _span = info_span!("save_bundle", bundle = bundle.name()).entered();
        if bundle.name() == LOGGER_GROUP {
            return Err(Error::InvalidName(bundle.name().to_string()));
        }
        let mut file = self.file.lock();
        if !file.options().writable {
            return Err(Error::ReadOnly);
        }
        let root = file.root().clone();

        let node_name = match mode {
            SaveMode::Overwrite => bundle.name().to_string(),
            SaveMode::Append => free_name(&root, bundle.name()),
        };
        let replaced = root.children.iter().position(|c| c.error.is_none() && c.name == node_name);
        let order = match replaced {
            Some(i) => root.children[i].attrs.get_int(ORDER).unwrap_or(0).max(0) as usize,
            None => next_order(&root),
        };

        let encoded = save::encode_bundle(bundle, &node_name, order)?;
        let mut children = existing_children(&root, Some(&node_name));
        match replaced {
            Some(i) => {
                // unreadable siblings were dropped from `children`
                let at = root.children[..i].iter().filter(|c| c.error.is_none()).count();
                children.insert(at, encoded.spec);
            }
            None => children.push(encoded.spec),
        }
        commit_root(&mut file, &root.attrs, children)?;

        info!(
            node = %node_name,
            saved = encoded.saved,
            skipped = encoded.failures.len(),
            "saved bundle"
        );
        Ok(SaveReport {
            path: format!("/{}", node_name),
            node_name,
            saved: encoded.saved,
            failures: encoded.failures,
        })
    }

    /// Read the bundle stored under `name`.
    ///
    /// Containers that fail to load are listed in the result; the call
    /// itself fails only when the bundle node is unusable or was written
    /// by a newer schema.
    pub fn load_bundle(&self, name: &str) -> Result<LoadedBundle> {
        let _span = info_span!("load_bundle", bundle = name).entered();
        let file = self.file.lock();
        let node = file
            .root()
            .child(name)
            .filter(|n| n.is_group() && n.name != LOGGER_GROUP)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let loaded = self.decode(&file, node)?;
        info!(
            containers = loaded.bundle.len(),
            failed = loaded.failures.len(),
            schema_version = loaded.schema_version,
            "loaded bundle"
        );
        Ok(loaded)
    }

    /// Read every stored bundle, in save order. One unreadable bundle does
    /// not stop the others.
    pub fn load_all(&self) -> Vec<(String, Result<LoadedBundle>)> {
        let _span = info_span!("load_all").entered();
        let file = self.file.lock();
        bundle_nodes(file.root())
            .into_iter()
            .map(|node| {
                let result = match &node.error {
                    Some(reason) => Err(Error::corrupt(&node.path, 0, reason.as_str())),
                    None => self.decode(&file, node),
                };
                if let Err(error) = &result {
                    warn!(path = %node.path, %error, "bundle failed to load");
                }
                (node.name.clone(), result)
            })
            .collect()
    }

    fn decode(&self, file: &NodeFile, node: &NodeSnapshot) -> Result<LoadedBundle> {
        let decoded = Decoder::new(file, &self.registry).bundle(node)?;
        Ok(LoadedBundle {
            path: node.path.clone(),
            bundle: decoded.bundle,
            failures: decoded.failures,
            schema_version: decoded.schema_version,
        })
    }

    /// Names of the stored bundles, in save order.
    pub fn list_bundles(&self) -> Vec<String> {
        bundle_nodes(self.file.lock().root())
            .into_iter()
            .filter(|n| n.error.is_none())
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn contains_bundle(&self, name: &str) -> bool {
        self.list_bundles().iter().any(|n| n == name)
    }

    /// Drop a bundle from the tree. Its bytes stay in the file until
    /// [`compact`](Self::compact).
    pub fn remove_bundle(&self, name: &str) -> Result<()> {
        let mut file = self.file.lock();
        let root = file.root().clone();
        if name == LOGGER_GROUP || root.child(name).is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        commit_root(&mut file, &root.attrs, existing_children(&root, Some(name)))?;
        info!(bundle = name, "removed bundle");
        Ok(())
    }

    /// Set an attribute on the file's root node.
    pub fn set_file_attribute(&self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        if key == SCHEMA_VERSION {
            return Err(Error::InvalidName(key.to_string()));
        }
        let mut file = self.file.lock();
        let root = file.root().clone();
        let mut attrs = root.attrs.clone();
        attrs.set(key, value);
        commit_root(&mut file, &attrs, existing_children(&root, None))
    }

    /// Root node attributes, without the schema version.
    pub fn file_attributes(&self) -> Attributes {
        let file = self.file.lock();
        file.root()
            .attrs
            .iter()
            .filter(|(k, _)| *k != SCHEMA_VERSION)
            .map(|(k, v)| (k, v.clone()))
            .collect()
    }

    /// Append a timestamped line to the session log.
    pub fn add_log(&self, message: &str) -> Result<()> {
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| Error::other(format!("cannot format log time: {}", e)))?;
        let mut file = self.file.lock();
        let root = file.root().clone();
        let mut entries = log_entries(&root);
        entries.push(format!("{} {}", stamp, message));

        let logger = NodeSpec::group(
            LOGGER_GROUP,
            Attributes::new()
                .with(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION)
                .with(LOG_ENTRIES, entries),
            Vec::new(),
        );
        let mut children = existing_children(&root, Some(LOGGER_GROUP));
        children.push(logger);
        commit_root(&mut file, &root.attrs, children)
    }

    /// Session log lines, oldest first.
    pub fn logs(&self) -> Vec<String> {
        log_entries(self.file.lock().root())
    }

    /// Rewrite the file without the blocks left behind by overwrites and
    /// removals.
    pub fn compact(&self) -> Result<()> {
        let mut file = self.file.lock();
        let before = file.size();
        file.compact()?;
        info!(before, after = file.size(), "compacted store");
        Ok(())
    }
}

fn node_options(config: &StoreConfig, writable: bool) -> NodeOptions {
    NodeOptions {
        writable,
        use_mmap: config.use_mmap,
        compression_level: config.compression_level,
    }
}

/// Commit a new root with `children`, stamping the current schema version.
fn commit_root(file: &mut NodeFile, attrs: &Attributes, children: Vec<NodeSpec>) -> Result<()> {
    let mut attrs = attrs.clone();
    attrs.set(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
    file.commit(&NodeSpec::group("", attrs, children))
}

/// References to the root's readable children, minus `except`.
fn existing_children(root: &NodeSnapshot, except: Option<&str>) -> Vec<NodeSpec> {
    root.children
        .iter()
        .filter(|c| {
            if let Some(reason) = &c.error {
                warn!(path = %c.path, reason = %reason, "dropping unreadable node");
                return false;
            }
            Some(c.name.as_str()) != except
        })
        .map(|c| NodeSpec::Existing(c.pos))
        .collect()
}

/// Bundle groups below the root, sorted by their order attribute.
fn bundle_nodes(root: &NodeSnapshot) -> Vec<&NodeSnapshot> {
    let mut nodes: Vec<&NodeSnapshot> = root
        .children
        .iter()
        .filter(|c| c.is_group() && c.name != LOGGER_GROUP)
        .collect();
    nodes.sort_by_key(|n| n.attrs.get_int(ORDER).unwrap_or(i64::MAX));
    nodes
}

fn next_order(root: &NodeSnapshot) -> usize {
    bundle_nodes(root)
        .iter()
        .filter_map(|n| n.attrs.get_int(ORDER))
        .max()
        .map_or(0, |o| o.max(0) as usize + 1)
}

/// `name` if unused, else the first free `name_NNN`.
fn free_name(root: &NodeSnapshot, name: &str) -> String {
    let taken = |candidate: &str| root.children.iter().any(|c| c.name == candidate);
    if !taken(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{}_{:03}", name, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn log_entries(root: &NodeSnapshot) -> Vec<String> {
    root.child(LOGGER_GROUP)
        .and_then(|logger| logger.attrs.get(LOG_ENTRIES))
        .and_then(AttrValue::as_str_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataContainer;
    use crate::util::NdArray;

    fn config() -> StoreConfig {
        StoreConfig::default().with_mmap(false)
    }

    fn bundle(name: &str, value: f64) -> Bundle {
        let c = DataContainer::raw("det", vec![NdArray::from_vec(vec![value; 3])]).unwrap();
        Bundle::new(name).with(c).unwrap()
    }

    #[test]
    fn test_free_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path().join("s.acq"), &config()).unwrap();
        store.save_bundle(&bundle("frame", 1.0), SaveMode::Overwrite).unwrap();
        let report = store.save_bundle(&bundle("frame", 2.0), SaveMode::Append).unwrap();
        assert_eq!(report.node_name, "frame_001");
        let report = store.save_bundle(&bundle("frame", 3.0), SaveMode::Append).unwrap();
        assert_eq!(report.node_name, "frame_002");
        assert_eq!(store.list_bundles(), vec!["frame", "frame_001", "frame_002"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path().join("s.acq"), &config()).unwrap();
        for name in ["a", "b", "c"] {
            store.save_bundle(&bundle(name, 1.0), SaveMode::Overwrite).unwrap();
        }
        store.save_bundle(&bundle("b", 5.0), SaveMode::Overwrite).unwrap();
        assert_eq!(store.list_bundles(), vec!["a", "b", "c"]);
        let loaded = store.load_bundle("b").unwrap();
        assert_eq!(loaded.bundle.get("det").unwrap().array(0).unwrap().values(), &[5.0; 3]);
    }

    #[test]
    fn test_reserved_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path().join("s.acq"), &config()).unwrap();
        assert!(matches!(
            store.save_bundle(&bundle(LOGGER_GROUP, 1.0), SaveMode::Overwrite),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            store.set_file_attribute(SCHEMA_VERSION, 7i64),
            Err(Error::InvalidName(_))
        ));
        store.add_log("started").unwrap();
        assert!(store.list_bundles().is_empty());
        assert!(matches!(store.load_bundle(LOGGER_GROUP), Err(Error::NotFound(_))));
    }
}
