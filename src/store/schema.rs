//! Persisted layout: attribute keys, schema versions and migrations.
//!
//! ```text
//! /                                root group: file attributes
//! /<bundle>                        group: created, order
//! /<bundle>/<container>            group: dimensionality, source, origin, order, extra.*
//! /<bundle>/<container>/dataNN     array: order, label, unit, shape, dtype
//! /<bundle>/<container>/axes       group
//! /<bundle>/<container>/axes/axisNN array: order, index, label, unit, size,
//!                                  monotonic, uniform, offset, scaling, irregular
//! /logger                          group: entries
//! ```
//!
//! Every group carries `schema-version`. Version history:
//!
//! - v1: dimensionality stored as `dim`, units as `units`, no `order`
//!   attribute (arrays and axes were ordered by their name suffix).
//! - v2: `dimensionality`, `unit` and explicit `order`; `source` stored as
//!   an integer (0 raw, 1 calculated).
//! - v3: `source` stored as a string.

use tracing::debug;

use crate::node::{NodeKind, NodeSnapshot};
use crate::util::{AttrValue, Error, Result};

/// Schema written by this version.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Oldest schema that can still be migrated.
pub const OLDEST_SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_VERSION: &str = "schema-version";
pub const ORDER: &str = "order";
pub const CREATED: &str = "created";
pub const DIMENSIONALITY: &str = "dimensionality";
pub const SOURCE: &str = "source";
pub const ORIGIN: &str = "origin";
pub const UNIT: &str = "unit";
pub const SHAPE: &str = "shape";
pub const DTYPE: &str = "dtype";
pub const LABEL: &str = "label";
pub const INDEX: &str = "index";
pub const SIZE: &str = "size";
pub const MONOTONIC: &str = "monotonic";
pub const UNIFORM: &str = "uniform";
pub const OFFSET: &str = "offset";
pub const SCALING: &str = "scaling";
pub const IRREGULAR: &str = "irregular";
pub const LOG_ENTRIES: &str = "entries";

/// Prefix of container metadata entries.
pub const EXTRA_PREFIX: &str = "extra.";

/// Reserved child group holding a container's axes.
pub const AXES_GROUP: &str = "axes";

/// Reserved top-level group holding the session log.
pub const LOGGER_GROUP: &str = "logger";

pub const BUNDLE_KEYS: &[&str] = &[SCHEMA_VERSION, ORDER, CREATED];
pub const CONTAINER_KEYS: &[&str] = &[SCHEMA_VERSION, ORDER, DIMENSIONALITY, SOURCE, ORIGIN];
pub const ARRAY_KEYS: &[&str] = &[ORDER, LABEL, UNIT, SHAPE, DTYPE];
pub const AXIS_KEYS: &[&str] = &[
    ORDER, INDEX, LABEL, UNIT, SIZE, MONOTONIC, UNIFORM, OFFSET, SCALING, IRREGULAR,
];

/// Node name of array `index`.
pub fn array_node_name(index: usize) -> String {
    format!("data{:02}", index)
}

/// Node name of the `index`-th stored axis.
pub fn axis_node_name(index: usize) -> String {
    format!("axis{:02}", index)
}

/// One migration step, upgrading a group (and its array children) by one
/// version.
type Migration = fn(&mut NodeSnapshot) -> Result<()>;

/// `MIGRATIONS[v - 1]` upgrades from `v` to `v + 1`.
const MIGRATIONS: [Migration; (CURRENT_SCHEMA_VERSION - OLDEST_SCHEMA_VERSION) as usize] =
    [v1_to_v2, v2_to_v3];

/// Schema version stored on a group node.
pub fn stored_version(node: &NodeSnapshot) -> Result<u32> {
    match node.attrs.get(SCHEMA_VERSION) {
        Some(AttrValue::Int(v)) if *v >= 1 && *v <= u32::MAX as i64 => Ok(*v as u32),
        Some(other) => Err(Error::corrupt(
            &node.path,
            0,
            format!("bad {} value {}", SCHEMA_VERSION, other),
        )),
        None => Err(Error::MissingAttribute {
            path: node.path.clone(),
            key: SCHEMA_VERSION.to_string(),
        }),
    }
}

/// Bring one group (and its array children) up to the current schema, in
/// place. Child groups are left alone.
///
/// Returns the version the group was stored with.
pub fn migrate_node(node: &mut NodeSnapshot) -> Result<u32> {
    let stored = stored_version(node)?;
    if stored > CURRENT_SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            path: node.path.clone(),
            version: stored,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    for version in stored..CURRENT_SCHEMA_VERSION {
        debug!(path = %node.path, from = version, to = version + 1, "migrating node");
        MIGRATIONS[(version - OLDEST_SCHEMA_VERSION) as usize](node)?;
    }
    node.attrs.set(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION as i64);
    Ok(stored)
}

/// Bring a whole group subtree up to the current schema.
///
/// Fails with `UnsupportedSchema` when any group is newer than this build.
/// Unreadable children are left for the caller to report.
pub fn migrate(node: &mut NodeSnapshot) -> Result<u32> {
    let stored = migrate_node(node)?;
    for child in &mut node.children {
        if child.error.is_none() && child.kind == NodeKind::Group {
            migrate(child)?;
        }
    }
    Ok(stored)
}

/// Trailing decimal digits of a node name.
fn name_suffix(name: &str) -> Option<i64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    name[name.len() - digits..].parse().ok()
}

fn v1_to_v2(node: &mut NodeSnapshot) -> Result<()> {
    node.attrs.rename("dim", DIMENSIONALITY);
    node.attrs.rename("units", UNIT);
    for (position, child) in node.children.iter_mut().enumerate() {
        if child.error.is_some() {
            continue;
        }
        child.attrs.rename("units", UNIT);
        if child.attrs.contains(ORDER) {
            continue;
        }
        let order = match child.kind {
            NodeKind::Array => name_suffix(&child.name).ok_or_else(|| {
                Error::corrupt(&child.path, 1, "array name has no index suffix")
            })?,
            NodeKind::Group => position as i64,
        };
        child.attrs.set(ORDER, order);
    }
    Ok(())
}

fn v2_to_v3(node: &mut NodeSnapshot) -> Result<()> {
    if let Some(AttrValue::Int(code)) = node.attrs.get(SOURCE) {
        let source = match code {
            0 => "raw",
            1 => "calculated",
            other => {
                return Err(Error::corrupt(
                    &node.path,
                    2,
                    format!("unknown source code {}", other),
                ))
            }
        };
        node.attrs.set(SOURCE, source);
    }
    Ok(())
}
