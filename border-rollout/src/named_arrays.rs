//! Observations consisting of named components.
use ndarray::{ArrayD, ArrayViewD};
use std::{
    collections::{
        hash_map::{Iter, Keys},
        HashMap,
    },
    iter::FromIterator,
};

/// Named arrays, one for each observation component.
///
/// Observations often consist of more than one array, e.g., a feature vector
/// along with an action mask. Each component is stored under its own key.
/// An observation with a single array is a map with one entry, see
/// [`NamedArrays::from_single`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamedArrays(HashMap<String, ArrayD<f32>>);

impl NamedArrays {
    /// Creates an empty set of components.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Creates a set with a single component.
    pub fn from_single(name: impl Into<String>, array: ArrayD<f32>) -> Self {
        Self(HashMap::from([(name.into(), array)]))
    }

    /// Inserts a component, returning the array previously stored under the name.
    pub fn insert(&mut self, name: impl Into<String>, array: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.0.insert(name.into(), array)
    }

    /// Returns the component with the given name.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.0.get(name)
    }

    /// Returns a view of the component with the given name.
    pub fn view(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        self.0.get(name).map(|a| a.view())
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.0.get_mut(name)
    }

    /// Returns `true` if a component with the given name exists.
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns an iterator over the component names.
    pub fn keys(&self) -> Keys<'_, String, ArrayD<f32>> {
        self.0.keys()
    }

    /// Returns an iterator over the components.
    pub fn iter(&self) -> Iter<'_, String, ArrayD<f32>> {
        self.0.iter()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no component.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies `f` to every component, keeping the names.
    pub(crate) fn try_map<F, E>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&ArrayD<f32>) -> Result<ArrayD<f32>, E>,
    {
        self.0
            .iter()
            .map(|(k, v)| Ok((k.clone(), f(v)?)))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, ArrayD<f32>)> for NamedArrays {
    fn from_iter<I: IntoIterator<Item = (K, ArrayD<f32>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for NamedArrays {
    type Item = (String, ArrayD<f32>);
    type IntoIter = std::collections::hash_map::IntoIter<String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
