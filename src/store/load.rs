//! Node snapshots to object graph.
//!
//! Loading is best-effort per container: a container whose nodes are
//! missing, malformed or fail their checksum is reported with its path
//! while its siblings still load.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use super::schema::{self, *};
use super::NodeFailure;
use crate::axis::{Axis, AxisData, Monotonicity};
use crate::data::{Bundle, DataContainer, Dimensionality, Source};
use crate::node::{NodeFile, NodeKind, NodeSnapshot};
use crate::units::{Unit, UnitRegistry};
use crate::util::{AttrValue, Attributes, DType, Error, NdArray, Result, Shape};

/// A bundle rebuilt from its node, plus the containers that failed.
pub(crate) struct DecodedBundle {
    pub bundle: Bundle,
    pub failures: Vec<NodeFailure>,
    pub schema_version: u32,
}

/// Reads entities out of one open node file.
pub(crate) struct Decoder<'a> {
    file: &'a NodeFile,
    registry: &'a UnitRegistry,
    /// Version the current subtree was stored with, for error reports.
    version: u32,
}

impl<'a> Decoder<'a> {
    pub fn new(file: &'a NodeFile, registry: &'a UnitRegistry) -> Self {
        Self { file, registry, version: CURRENT_SCHEMA_VERSION }
    }

    /// Rebuild the bundle stored at `node`.
    ///
    /// Fails as a whole only when the bundle group itself is unusable.
    pub fn bundle(&mut self, node: &NodeSnapshot) -> Result<DecodedBundle> {
        if let Some(reason) = &node.error {
            return Err(Error::corrupt(&node.path, 0, reason.as_str()));
        }
        let mut node = node.clone();
        let schema_version = schema::migrate_node(&mut node)?;
        self.version = schema_version;

        let created = self.required_str(&node, CREATED)?;
        let created = OffsetDateTime::parse(created, &Rfc3339)
            .map_err(|e| self.corrupt(&node, format!("bad creation time '{}': {}", created, e)))?;
        let mut bundle = Bundle::with_timestamp(node.name.as_str(), created);
        bundle.preserved = unknown_attrs(&node.attrs, |k| BUNDLE_KEYS.contains(&k));

        let mut failures = Vec::new();
        let mut ordered = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let result = match &child.error {
                Some(reason) => Err(self.corrupt(child, reason)),
                None if child.kind != NodeKind::Group => {
                    Err(self.corrupt(child, "expected a container group"))
                }
                None => self.required_int(child, ORDER).map(|order| (order, child)),
            };
            match result {
                Ok(entry) => ordered.push(entry),
                Err(error) => failures.push(NodeFailure { path: child.path.clone(), error }),
            }
        }
        ordered.sort_by_key(|(order, _)| *order);

        for (_, child) in ordered {
            let result = self
                .container(child)
                .and_then(|container| bundle.append(container));
            if let Err(error) = result {
                warn!(path = %child.path, %error, "skipping container");
                failures.push(NodeFailure { path: child.path.clone(), error });
            }
        }
        self.version = schema_version;
        Ok(DecodedBundle { bundle, failures, schema_version })
    }

    /// Rebuild the container stored at `node`, migrating it first.
    pub fn container(&mut self, node: &NodeSnapshot) -> Result<DataContainer> {
        let mut node = node.clone();
        self.version = schema::migrate(&mut node)?;

        let dimensionality: Dimensionality = self.parse_attr(&node, DIMENSIONALITY)?;
        let source: Source = self.parse_attr(&node, SOURCE)?;
        let origin = match node.attrs.get(ORIGIN) {
            Some(_) => self.required_str(&node, ORIGIN)?.to_string(),
            None => String::new(),
        };

        let array_nodes = self.ordered_children(&node, NodeKind::Array)?;
        let mut arrays = Vec::with_capacity(array_nodes.len());
        let mut labels = Vec::with_capacity(array_nodes.len());
        let mut units = Vec::with_capacity(array_nodes.len());
        let mut array_preserved = Vec::with_capacity(array_nodes.len());
        for child in array_nodes {
            arrays.push(self.array(child)?);
            labels.push(self.required_str(child, LABEL)?.to_string());
            units.push(self.unit(child)?);
            array_preserved.push(unknown_attrs(&child.attrs, |k| ARRAY_KEYS.contains(&k)));
        }

        let mut container = DataContainer::new(node.name.as_str(), source, arrays)
            .and_then(|c| c.with_units(units))
            .and_then(|c| c.with_labels(labels))
            .and_then(|c| c.with_dimensionality(dimensionality))
            .map_err(|e| self.corrupt(&node, e))?
            .with_origin(origin);

        if let Some(axes) = node.child(AXES_GROUP) {
            for axis_node in self.ordered_children(axes, NodeKind::Array)? {
                let axis = self.axis(axis_node)?;
                container
                    .set_axis(axis)
                    .map_err(|e| self.corrupt(axis_node, e))?;
            }
        }

        for (key, value) in node.attrs.iter() {
            if let Some(key) = key.strip_prefix(EXTRA_PREFIX) {
                container.extra_mut().set(key, value.clone());
            }
        }
        container.preserved = unknown_attrs(&node.attrs, |k| {
            CONTAINER_KEYS.contains(&k) || k.starts_with(EXTRA_PREFIX)
        });
        container.array_preserved = array_preserved;
        Ok(container)
    }

    fn array(&self, node: &NodeSnapshot) -> Result<NdArray> {
        let dims = self.required(node, SHAPE)?;
        let dims = dims
            .as_int_list()
            .ok_or_else(|| self.wrong_type(node, SHAPE, dims, "int list"))?;
        let dims = dims
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<std::result::Result<Vec<usize>, _>>()
            .map_err(|_| self.corrupt(node, format!("negative extent in shape {:?}", dims)))?;
        let dtype: DType = self.parse_attr(node, DTYPE)?;
        let bytes = self.payload(node)?;
        NdArray::from_bytes(Shape::from_slice(&dims), dtype, &bytes).map_err(|e| self.corrupt(node, e))
    }

    fn axis(&self, node: &NodeSnapshot) -> Result<Axis> {
        let label = self.required_str(node, LABEL)?;
        let unit = self.unit(node)?;
        let index = self.required_index(node, INDEX)?;
        let size = self.required_index(node, SIZE)?;
        let uniform = self.required_bool(node, UNIFORM)?;
        let irregular = match node.attrs.get(IRREGULAR) {
            Some(_) => self.required_bool(node, IRREGULAR)?,
            None => false,
        };

        let axis = if uniform {
            let offset = self.required_float(node, OFFSET)?;
            let scaling = self.required_float(node, SCALING)?;
            Axis::new(label, unit, AxisData::Uniform { offset, scaling }, size)
        } else {
            let values = DType::Float64
                .decode(&self.payload(node)?)
                .map_err(|e| self.corrupt(node, e))?;
            if irregular {
                if values.len() != size {
                    return Err(self.corrupt(
                        node,
                        format!("axis declares {} samples, payload holds {}", size, values.len()),
                    ));
                }
                Ok(Axis::irregular(label, unit, values))
            } else {
                Axis::new(label, unit, AxisData::Explicit(values), size)
            }
        };
        let mut axis = axis.map_err(|e| self.corrupt(node, e))?.with_index(index);

        if node.attrs.contains(MONOTONIC) {
            let stored: Monotonicity = self.parse_attr(node, MONOTONIC)?;
            if stored != axis.monotonicity() {
                return Err(self.corrupt(
                    node,
                    format!("stored as {} but data is {}", stored, axis.monotonicity()),
                ));
            }
        }
        axis.preserved = unknown_attrs(&node.attrs, |k| AXIS_KEYS.contains(&k));
        Ok(axis)
    }

    fn unit(&self, node: &NodeSnapshot) -> Result<Unit> {
        let symbol = self.required_str(node, UNIT)?;
        self.registry.parse(symbol).map_err(|e| self.corrupt(node, e))
    }

    fn payload(&self, node: &NodeSnapshot) -> Result<Vec<u8>> {
        self.file.read_payload(node).map_err(|e| self.corrupt(node, e))
    }

    /// Children of `kind`, sorted by their order attribute. Any unreadable
    /// child fails the whole parent, as do duplicate or missing orders.
    fn ordered_children<'n>(&self, node: &'n NodeSnapshot, kind: NodeKind) -> Result<Vec<&'n NodeSnapshot>> {
        let mut ordered = Vec::new();
        for child in &node.children {
            if let Some(reason) = &child.error {
                return Err(self.corrupt(child, reason));
            }
            if child.kind == kind {
                ordered.push((self.required_int(child, ORDER)?, child));
            }
        }
        ordered.sort_by_key(|(order, _)| *order);
        for (expected, (order, child)) in ordered.iter().enumerate() {
            if *order != expected as i64 {
                return Err(self.corrupt(
                    child,
                    format!("order {} where {} was expected", order, expected),
                ));
            }
        }
        Ok(ordered.into_iter().map(|(_, child)| child).collect())
    }

    fn corrupt(&self, node: &NodeSnapshot, reason: impl ToString) -> Error {
        Error::corrupt(&node.path, self.version, reason.to_string())
    }

    fn wrong_type(&self, node: &NodeSnapshot, key: &str, value: &AttrValue, expected: &str) -> Error {
        self.corrupt(
            node,
            format!("attribute '{}' is a {}, expected {}", key, value.type_name(), expected),
        )
    }

    fn required<'n>(&self, node: &'n NodeSnapshot, key: &str) -> Result<&'n AttrValue> {
        node.attrs.get(key).ok_or_else(|| Error::MissingAttribute {
            path: node.path.clone(),
            key: key.to_string(),
        })
    }

    fn required_str<'n>(&self, node: &'n NodeSnapshot, key: &str) -> Result<&'n str> {
        let value = self.required(node, key)?;
        value.as_str().ok_or_else(|| self.wrong_type(node, key, value, "string"))
    }

    fn required_int(&self, node: &NodeSnapshot, key: &str) -> Result<i64> {
        let value = self.required(node, key)?;
        value.as_int().ok_or_else(|| self.wrong_type(node, key, value, "int"))
    }

    fn required_index(&self, node: &NodeSnapshot, key: &str) -> Result<usize> {
        let value = self.required_int(node, key)?;
        usize::try_from(value).map_err(|_| self.corrupt(node, format!("negative {} {}", key, value)))
    }

    fn required_float(&self, node: &NodeSnapshot, key: &str) -> Result<f64> {
        let value = self.required(node, key)?;
        value.as_float().ok_or_else(|| self.wrong_type(node, key, value, "float"))
    }

    fn required_bool(&self, node: &NodeSnapshot, key: &str) -> Result<bool> {
        let value = self.required(node, key)?;
        value.as_bool().ok_or_else(|| self.wrong_type(node, key, value, "bool"))
    }

    fn parse_attr<T>(&self, node: &NodeSnapshot, key: &str) -> Result<T>
    where
        T: std::str::FromStr<Err = Error>,
    {
        self.required_str(node, key)?
            .parse()
            .map_err(|e: Error| self.corrupt(node, e))
    }
}

/// Attributes not claimed by `known`, kept for re-emission.
fn unknown_attrs(attrs: &Attributes, known: impl Fn(&str) -> bool) -> Attributes {
    attrs
        .iter()
        .filter(|(k, _)| !known(k))
        .map(|(k, v)| (k, v.clone()))
        .collect()
}
