//! Configuration of [`RolloutBuffer`](super::RolloutBuffer).
use crate::RolloutBufferError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutBuffer`](super::RolloutBuffer).
///
/// # Examples
///
/// ```rust
/// use border_rollout::RolloutBufferConfig;
///
/// let config = RolloutBufferConfig::default()
///     .capacity(128)
///     .num_envs(8)
///     .obs_shape("observation", vec![4])
///     .obs_shape("action_mask", vec![2])
///     .act_shape(vec![1])
///     .gamma(0.99)
///     .gae_lambda(0.95);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RolloutBufferConfig {
    /// Number of time steps stored for each environment.
    pub capacity: usize,

    /// Number of parallel environments.
    pub num_envs: usize,

    /// Shape of a single observation for each named component,
    /// excluding the environment axis.
    pub obs_shapes: HashMap<String, Vec<usize>>,

    /// Shape of a single action, excluding the environment axis.
    pub act_shape: Vec<usize>,

    /// Discount factor.
    pub gamma: f32,

    /// Mixing parameter of generalized advantage estimation.
    pub gae_lambda: f32,

    /// Random seed used to shuffle samples.
    pub seed: u64,

    /// `true` while `obs_shapes` holds the component set by [`Default`].
    #[serde(skip)]
    default_obs_shapes: bool,
}

impl Default for RolloutBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            num_envs: 1,
            obs_shapes: HashMap::from([("observation".to_string(), vec![1])]),
            act_shape: vec![1],
            gamma: 0.99,
            gae_lambda: 0.95,
            seed: 42,
            default_obs_shapes: true,
        }
    }
}

impl RolloutBufferConfig {
    /// Sets the number of time steps stored for each environment.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of parallel environments.
    pub fn num_envs(mut self, num_envs: usize) -> Self {
        self.num_envs = num_envs;
        self
    }

    /// Replaces all observation components.
    pub fn obs_shapes(mut self, obs_shapes: HashMap<String, Vec<usize>>) -> Self {
        self.obs_shapes = obs_shapes;
        self.default_obs_shapes = false;
        self
    }

    /// Adds an observation component, or replaces the shape of an existing one.
    ///
    /// The first call on the default configuration discards its
    /// placeholder `"observation"` component, so that only the components
    /// declared with this method are kept.
    pub fn obs_shape(mut self, name: impl Into<String>, shape: Vec<usize>) -> Self {
        if self.default_obs_shapes {
            self.obs_shapes.clear();
            self.default_obs_shapes = false;
        }
        self.obs_shapes.insert(name.into(), shape);
        self
    }

    /// Sets the shape of a single action.
    pub fn act_shape(mut self, act_shape: Vec<usize>) -> Self {
        self.act_shape = act_shape;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the GAE mixing parameter.
    pub fn gae_lambda(mut self, gae_lambda: f32) -> Self {
        self.gae_lambda = gae_lambda;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::Config`] if the capacity or the number of
    /// environments is zero, if no observation component is declared, if a
    /// declared shape has a zero dimension, if an array of the buffer would be
    /// too large to allocate, or if `gamma` or `gae_lambda` is not in `(0, 1]`.
    pub fn validate(&self) -> Result<(), RolloutBufferError> {
        if self.capacity == 0 {
            return Err(RolloutBufferError::Config(
                "capacity must be positive".to_string(),
            ));
        }
        if self.num_envs == 0 {
            return Err(RolloutBufferError::Config(
                "num_envs must be positive".to_string(),
            ));
        }
        if self.obs_shapes.is_empty() {
            return Err(RolloutBufferError::Config(
                "at least one observation component is required".to_string(),
            ));
        }
        for (name, shape) in self.obs_shapes.iter() {
            if shape.iter().any(|&d| d == 0) {
                return Err(RolloutBufferError::Config(format!(
                    "observation component {} has a zero dimension: {:?}",
                    name, shape
                )));
            }
        }
        if self.act_shape.iter().any(|&d| d == 0) {
            return Err(RolloutBufferError::Config(format!(
                "action shape has a zero dimension: {:?}",
                self.act_shape
            )));
        }
        for (name, shape) in self
            .obs_shapes
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(std::iter::once(("action", &self.act_shape)))
        {
            if self.storage_bytes(shape).is_none() {
                return Err(RolloutBufferError::Config(format!(
                    "storage of {} is too large: capacity = {}, num_envs = {}, shape = {:?}",
                    name, self.capacity, self.num_envs, shape
                )));
            }
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(RolloutBufferError::Config(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.gae_lambda > 0.0 && self.gae_lambda <= 1.0) {
            return Err(RolloutBufferError::Config(format!(
                "gae_lambda must be in (0, 1], got {}",
                self.gae_lambda
            )));
        }
        Ok(())
    }

    /// Size in bytes of an array of the shape `(capacity, num_envs, ...shape)`,
    /// or `None` if it exceeds `isize::MAX`.
    fn storage_bytes(&self, shape: &[usize]) -> Option<usize> {
        let n = shape
            .iter()
            .try_fold(self.capacity.checked_mul(self.num_envs)?, |n, &d| {
                n.checked_mul(d)
            })?;
        let bytes = n.checked_mul(std::mem::size_of::<f32>())?;
        if bytes > isize::MAX as usize {
            None
        } else {
            Some(bytes)
        }
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
