//! Object graph to node specs.

use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use super::schema::*;
use super::NodeFailure;
use crate::axis::{Axis, AxisData};
use crate::data::{Bundle, DataContainer};
use crate::node::{validate_name, NodeSpec};
use crate::util::{Attributes, DType, Error, Result};

/// A bundle ready to commit, plus the containers left out of it.
pub(crate) struct EncodedBundle {
    pub spec: NodeSpec,
    pub saved: usize,
    pub failures: Vec<NodeFailure>,
}

/// Encode `bundle` as a group named `node_name`.
///
/// Containers that cannot be encoded are skipped and reported; the bundle
/// itself fails only when its own node cannot be built.
pub(crate) fn encode_bundle(bundle: &Bundle, node_name: &str, order: usize) -> Result<EncodedBundle> {
    validate_name(node_name)?;
    let created = bundle
        .created()
        .format(&Rfc3339)
        .map_err(|e| Error::other(format!("cannot format creation time: {}", e)))?;

    let mut attrs = bundle.preserved.clone();
    attrs.set(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
    attrs.set(ORDER, order);
    attrs.set(CREATED, created);

    let mut children = Vec::with_capacity(bundle.len());
    let mut failures = Vec::new();
    for container in bundle {
        let path = format!("/{}/{}", node_name, container.name());
        match encode_container(container, children.len()) {
            Ok(spec) => children.push(spec),
            Err(error) => {
                warn!(%path, %error, "skipping container");
                failures.push(NodeFailure { path, error });
            }
        }
    }
    let saved = children.len();
    debug!(bundle = node_name, saved, skipped = failures.len(), "encoded bundle");
    Ok(EncodedBundle {
        spec: NodeSpec::group(node_name, attrs, children),
        saved,
        failures,
    })
}

pub(crate) fn encode_container(container: &DataContainer, order: usize) -> Result<NodeSpec> {
    validate_name(container.name())?;

    let mut attrs = container.preserved.clone();
    for (key, value) in container.extra().iter() {
        attrs.set(format!("{}{}", EXTRA_PREFIX, key), value.clone());
    }
    attrs.set(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
    attrs.set(ORDER, order);
    attrs.set(DIMENSIONALITY, container.dimensionality().as_str());
    attrs.set(SOURCE, container.source().as_str());
    attrs.set(ORIGIN, container.origin());

    let mut children = Vec::with_capacity(container.len() + 1);
    for (i, array) in container.arrays().iter().enumerate() {
        let mut attrs = container.array_preserved.get(i).cloned().unwrap_or_default();
        attrs.set(ORDER, i);
        attrs.set(LABEL, container.labels()[i].as_str());
        attrs.set(UNIT, container.units()[i].symbol());
        attrs.set(
            SHAPE,
            array.shape().dims().iter().map(|&d| d as i64).collect::<Vec<i64>>(),
        );
        attrs.set(DTYPE, array.dtype().name());
        children.push(NodeSpec::array(array_node_name(i), attrs, array.to_bytes()));
    }

    let axes = container
        .axes()
        .enumerate()
        .map(|(order, axis)| encode_axis(axis, order))
        .collect();
    let axes_attrs = Attributes::new().with(SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
    children.push(NodeSpec::group(AXES_GROUP, axes_attrs, axes));

    Ok(NodeSpec::group(container.name(), attrs, children))
}

fn encode_axis(axis: &Axis, order: usize) -> NodeSpec {
    let mut attrs = axis.preserved.clone();
    attrs.set(ORDER, order);
    attrs.set(INDEX, axis.index());
    attrs.set(LABEL, axis.label());
    attrs.set(UNIT, axis.unit().symbol());
    attrs.set(SIZE, axis.size());
    attrs.set(MONOTONIC, axis.monotonicity().as_str());
    attrs.set(UNIFORM, axis.is_uniform());
    attrs.set(IRREGULAR, axis.is_irregular());

    // uniform axes have no payload
    let payload = match axis.data() {
        AxisData::Uniform { offset, scaling } => {
            attrs.set(OFFSET, *offset);
            attrs.set(SCALING, *scaling);
            Vec::new()
        }
        AxisData::Explicit(values) => DType::Float64.encode(values),
    };
    NodeSpec::array(axis_node_name(order), attrs, payload)
}
