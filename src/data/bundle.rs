//! Bundles: the containers produced by one acquisition event.

use time::OffsetDateTime;

use super::{DataContainer, Dimensionality, Source};
use crate::util::{Attributes, Error, Result, Shape};

/// Ordered collection of uniquely named containers with a creation time.
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    name: String,
    created: OffsetDateTime,
    containers: Vec<DataContainer>,
    /// Stored attributes this version does not interpret.
    pub(crate) preserved: Attributes,
}

impl Bundle {
    /// Empty bundle stamped with the current UTC time.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timestamp(name, OffsetDateTime::now_utc())
    }

    pub fn with_timestamp(name: impl Into<String>, created: OffsetDateTime) -> Self {
        Self {
            name: name.into(),
            created,
            containers: Vec::new(),
            preserved: Attributes::new(),
        }
    }

    /// Add a container at the end. Names must be unique within the bundle.
    pub fn append(&mut self, container: DataContainer) -> Result<()> {
        if self.contains(container.name()) {
            return Err(Error::DuplicateName(container.name().to_string()));
        }
        self.containers.push(container);
        Ok(())
    }

    /// Builder form of [`append`](Self::append).
    pub fn with(mut self, container: DataContainer) -> Result<Self> {
        self.append(container)?;
        Ok(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn created(&self) -> OffsetDateTime {
        self.created
    }

    pub fn get(&self, name: &str) -> Result<&DataContainer> {
        self.containers
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut DataContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Remove a container, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Result<DataContainer> {
        let pos = self
            .containers
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(self.containers.remove(pos))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.iter().any(|c| c.name() == name)
    }

    /// Container names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.containers.iter().map(DataContainer::name).collect()
    }

    /// `origin/name` of every container.
    pub fn full_names(&self) -> Vec<String> {
        self.containers.iter().map(DataContainer::full_name).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataContainer> {
        self.containers.iter()
    }

    #[inline]
    pub fn containers(&self) -> &[DataContainer] {
        &self.containers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn filter_by_dim(&self, dimensionality: Dimensionality) -> Vec<&DataContainer> {
        self.containers
            .iter()
            .filter(|c| c.dimensionality() == dimensionality)
            .collect()
    }

    pub fn filter_by_source(&self, source: Source) -> Vec<&DataContainer> {
        self.containers.iter().filter(|c| c.source() == source).collect()
    }

    /// Container-wise sum, pairing containers by position.
    pub fn add(&self, other: &Bundle) -> Result<Bundle> {
        self.pairwise(other, DataContainer::add)
    }

    /// Container-wise difference, pairing containers by position.
    pub fn sub(&self, other: &Bundle) -> Result<Bundle> {
        self.pairwise(other, DataContainer::sub)
    }

    /// Multiply every container by `k`.
    pub fn scale(&self, k: f64) -> Bundle {
        Bundle {
            containers: self.containers.iter().map(|c| c.mul_scalar(k)).collect(),
            ..self.clone()
        }
    }

    fn pairwise(
        &self,
        other: &Bundle,
        op: impl Fn(&DataContainer, &DataContainer) -> Result<DataContainer>,
    ) -> Result<Bundle> {
        if self.len() != other.len() {
            return Err(Error::ShapeMismatch {
                left: Shape::d1(self.len()),
                right: Shape::d1(other.len()),
            });
        }
        let containers = self
            .containers
            .iter()
            .zip(&other.containers)
            .map(|(a, b)| op(a, b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Bundle { containers, ..self.clone() })
    }
}

impl<'a> IntoIterator for &'a Bundle {
    type Item = &'a DataContainer;
    type IntoIter = std::slice::Iter<'a, DataContainer>;

    fn into_iter(self) -> Self::IntoIter {
        self.containers.iter()
    }
}
