//! Time-major storage of rollouts.
use super::RolloutBufferConfig;
use crate::{NamedArrays, RolloutBufferError};
use log::{debug, info, trace};
use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::HashMap;

/// Prepends `(capacity, num_envs)` to the shape of a single sample.
fn storage_shape(capacity: usize, num_envs: usize, shape: &[usize]) -> Vec<usize> {
    let mut s = Vec::with_capacity(shape.len() + 2);
    s.push(capacity);
    s.push(num_envs);
    s.extend_from_slice(shape);
    s
}

/// Prepends `num_envs` to the shape of a single sample.
fn step_shape(num_envs: usize, shape: &[usize]) -> Vec<usize> {
    let mut s = Vec::with_capacity(shape.len() + 1);
    s.push(num_envs);
    s.extend_from_slice(shape);
    s
}

fn check_shape(
    name: &str,
    expected: Vec<usize>,
    actual: &[usize],
) -> Result<(), RolloutBufferError> {
    if expected.as_slice() != actual {
        return Err(RolloutBufferError::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// A buffer storing rollouts sampled from parallel environments.
///
/// All arrays have the leading shape `(capacity, num_envs)`. A rollout is
/// collected by calling [`RolloutBuffer::add`] once per time step until the
/// buffer is full. Then [`RolloutBuffer::compute_returns_and_advantages`] and
/// [`RolloutBuffer::permute_and_get_samples`] prepare the data for
/// optimization. The buffer must be cleared with [`RolloutBuffer::reset`]
/// before the next rollout is collected.
///
/// # Examples
///
/// ```rust
/// use border_rollout::{RolloutBuffer, RolloutBufferConfig};
///
/// let config = RolloutBufferConfig::default().capacity(8).num_envs(2);
/// let buffer = RolloutBuffer::build(&config).unwrap();
/// assert_eq!(buffer.len(), 0);
/// assert_eq!(buffer.rewards().shape(), &[8, 2]);
/// ```
pub struct RolloutBuffer {
    /// Number of time steps stored for each environment.
    pub(super) capacity: usize,

    /// Number of parallel environments.
    pub(super) num_envs: usize,

    /// Shape of a single observation for each component.
    pub(super) obs_shapes: HashMap<String, Vec<usize>>,

    /// Shape of a single action.
    pub(super) act_shape: Vec<usize>,

    /// Discount factor.
    pub(super) gamma: f32,

    /// GAE mixing parameter.
    pub(super) gae_lambda: f32,

    /// Number of time steps written since the last reset.
    pub(super) count: usize,

    pub(super) obs: NamedArrays,
    pub(super) act: ArrayD<f32>,
    pub(super) reward: Array2<f32>,
    pub(super) episode_start: Array2<f32>,
    pub(super) value: Array2<f32>,
    pub(super) log_prob: Array2<f32>,
    pub(super) ret: Array2<f32>,
    pub(super) advantage: Array2<f32>,

    /// Random number generator for shuffling samples.
    pub(super) rng: StdRng,
}

impl RolloutBuffer {
    /// Builds a rollout buffer with all arrays filled with zeros.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::Config`] if the configuration is invalid,
    /// see [`RolloutBufferConfig::validate`].
    pub fn build(config: &RolloutBufferConfig) -> Result<Self, RolloutBufferError> {
        config.validate()?;

        let (capacity, num_envs) = (config.capacity, config.num_envs);
        info!(
            "Build rollout buffer: capacity = {}, num_envs = {}, obs_shapes = {:?}, act_shape = {:?}",
            capacity, num_envs, config.obs_shapes, config.act_shape
        );

        let obs = config
            .obs_shapes
            .iter()
            .map(|(name, shape)| {
                let shape = storage_shape(capacity, num_envs, shape);
                (name.clone(), ArrayD::zeros(IxDyn(&shape)))
            })
            .collect();
        let act = ArrayD::zeros(IxDyn(&storage_shape(capacity, num_envs, &config.act_shape)));

        Ok(Self {
            capacity,
            num_envs,
            obs_shapes: config.obs_shapes.clone(),
            act_shape: config.act_shape.clone(),
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
            count: 0,
            obs,
            act,
            reward: Array2::zeros((capacity, num_envs)),
            episode_start: Array2::zeros((capacity, num_envs)),
            value: Array2::zeros((capacity, num_envs)),
            log_prob: Array2::zeros((capacity, num_envs)),
            ret: Array2::zeros((capacity, num_envs)),
            advantage: Array2::zeros((capacity, num_envs)),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Builds a rollout buffer from its parameters, using the default seed.
    pub fn new(
        capacity: usize,
        num_envs: usize,
        obs_shapes: HashMap<String, Vec<usize>>,
        act_shape: Vec<usize>,
        gamma: f32,
        gae_lambda: f32,
    ) -> Result<Self, RolloutBufferError> {
        let config = RolloutBufferConfig::default()
            .capacity(capacity)
            .num_envs(num_envs)
            .obs_shapes(obs_shapes)
            .act_shape(act_shape)
            .gamma(gamma)
            .gae_lambda(gae_lambda);
        Self::build(&config)
    }

    /// Fills all arrays with zeros and empties the buffer.
    pub fn reset(&mut self) {
        debug!("Reset rollout buffer ({} steps were stored)", self.count);
        self.count = 0;
        for (name, _) in self.obs_shapes.iter() {
            if let Some(obs) = self.obs.get_mut(name) {
                obs.fill(0.0);
            }
        }
        self.act.fill(0.0);
        self.reward.fill(0.0);
        self.episode_start.fill(0.0);
        self.value.fill(0.0);
        self.log_prob.fill(0.0);
        self.ret.fill(0.0);
        self.advantage.fill(0.0);
    }

    /// Adds a time step of all environments.
    ///
    /// The first axis of every argument corresponds to the environments, so its
    /// size must be `num_envs`. The data are copied into the buffer.
    ///
    /// # Arguments
    ///
    /// * `obs` - Observations, `(num_envs, ...)` for each declared component
    /// * `act` - Actions, `(num_envs, ...act_shape)`
    /// * `reward` - Rewards, `(num_envs,)`
    /// * `episode_start` - `1` if the episode of the environment began at this step, `(num_envs,)`
    /// * `value` - Value estimates of the observations, `(num_envs,)`
    /// * `log_prob` - Log-probabilities of the actions, `(num_envs,)`
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::Capacity`] if the buffer is full, and
    /// [`RolloutBufferError::ShapeMismatch`], [`RolloutBufferError::MissingKey`]
    /// or [`RolloutBufferError::UnexpectedKey`] if an argument disagrees with
    /// the declared layout. The buffer is left untouched on error.
    pub fn add(
        &mut self,
        obs: &NamedArrays,
        act: &ArrayD<f32>,
        reward: &Array1<f32>,
        episode_start: &Array1<f32>,
        value: &Array1<f32>,
        log_prob: &Array1<f32>,
    ) -> Result<(), RolloutBufferError> {
        if self.is_full() {
            return Err(RolloutBufferError::Capacity {
                capacity: self.capacity,
            });
        }
        self.check_step(obs, act, reward, episode_start, value, log_prob)?;

        let t = self.count;
        trace!("Add step {} to rollout buffer", t);

        for (name, src) in obs.iter() {
            if let Some(dst) = self.obs.get_mut(name) {
                dst.index_axis_mut(Axis(0), t).assign(src);
            }
        }
        self.act.index_axis_mut(Axis(0), t).assign(act);
        self.reward.row_mut(t).assign(reward);
        self.episode_start.row_mut(t).assign(episode_start);
        self.value.row_mut(t).assign(value);
        self.log_prob.row_mut(t).assign(log_prob);
        self.count += 1;

        Ok(())
    }

    fn check_step(
        &self,
        obs: &NamedArrays,
        act: &ArrayD<f32>,
        reward: &Array1<f32>,
        episode_start: &Array1<f32>,
        value: &Array1<f32>,
        log_prob: &Array1<f32>,
    ) -> Result<(), RolloutBufferError> {
        for (name, shape) in self.obs_shapes.iter() {
            match obs.get(name) {
                Some(o) => check_shape(name, step_shape(self.num_envs, shape), o.shape())?,
                None => return Err(RolloutBufferError::MissingKey(name.clone())),
            }
        }
        if let Some(name) = obs.keys().find(|k| !self.obs_shapes.contains_key(*k)) {
            return Err(RolloutBufferError::UnexpectedKey(name.clone()));
        }

        check_shape("act", step_shape(self.num_envs, &self.act_shape), act.shape())?;
        for (name, a) in [
            ("reward", reward),
            ("episode_start", episode_start),
            ("value", value),
            ("log_prob", log_prob),
        ] {
            check_shape(name, vec![self.num_envs], a.shape())?;
        }
        Ok(())
    }

    /// Returns an error unless all time steps have been written.
    pub(super) fn ensure_full(&self) -> Result<(), RolloutBufferError> {
        if !self.is_full() {
            return Err(RolloutBufferError::NotFull {
                count: self.count,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Number of time steps written since the last reset.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no time step has been written since the last reset.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if all time steps have been written.
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Number of time steps stored for each environment.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of parallel environments.
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// Discount factor.
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// GAE mixing parameter.
    pub fn gae_lambda(&self) -> f32 {
        self.gae_lambda
    }

    /// Shape of a single observation for each component.
    pub fn obs_shapes(&self) -> &HashMap<String, Vec<usize>> {
        &self.obs_shapes
    }

    /// Shape of a single action.
    pub fn act_shape(&self) -> &[usize] {
        &self.act_shape
    }

    /// Stored observations of a component, `(capacity, num_envs, ...)`.
    pub fn observations(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        self.obs.view(name)
    }

    /// Stored actions, `(capacity, num_envs, ...act_shape)`.
    pub fn actions(&self) -> ArrayViewD<'_, f32> {
        self.act.view()
    }

    /// Stored rewards, `(capacity, num_envs)`.
    pub fn rewards(&self) -> ArrayView2<'_, f32> {
        self.reward.view()
    }

    /// Stored episode-start flags, `(capacity, num_envs)`.
    pub fn episode_starts(&self) -> ArrayView2<'_, f32> {
        self.episode_start.view()
    }

    /// Stored value estimates, `(capacity, num_envs)`.
    pub fn values(&self) -> ArrayView2<'_, f32> {
        self.value.view()
    }

    /// Stored log-probabilities, `(capacity, num_envs)`.
    pub fn log_probs(&self) -> ArrayView2<'_, f32> {
        self.log_prob.view()
    }

    /// Returns, `(capacity, num_envs)`.
    ///
    /// Zero until [`RolloutBuffer::compute_returns_and_advantages`] is called.
    pub fn returns(&self) -> ArrayView2<'_, f32> {
        self.ret.view()
    }

    /// Advantages, `(capacity, num_envs)`.
    ///
    /// Zero until [`RolloutBuffer::compute_returns_and_advantages`] is called.
    pub fn advantages(&self) -> ArrayView2<'_, f32> {
        self.advantage.view()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn obs_shapes() -> HashMap<String, Vec<usize>> {
        HashMap::from([
            ("observation".to_string(), vec![3]),
            ("action_mask".to_string(), vec![2]),
        ])
    }

    fn buffer(capacity: usize, num_envs: usize) -> RolloutBuffer {
        RolloutBuffer::new(capacity, num_envs, obs_shapes(), vec![1], 0.99, 0.95).unwrap()
    }

    fn step_obs(num_envs: usize, v: f32) -> NamedArrays {
        vec![
            ("observation", ArrayD::from_elem(IxDyn(&[num_envs, 3]), v)),
            ("action_mask", ArrayD::from_elem(IxDyn(&[num_envs, 2]), v)),
        ]
        .into_iter()
        .collect()
    }

    fn add_step(buffer: &mut RolloutBuffer, v: f32) -> Result<(), RolloutBufferError> {
        let n = buffer.num_envs();
        let x = Array1::from_elem(n, v);
        buffer.add(
            &step_obs(n, v),
            &ArrayD::from_elem(IxDyn(&[n, 1]), v),
            &x,
            &x,
            &x,
            &x,
        )
    }

    fn zero(a: ArrayViewD<f32>) -> bool {
        a.iter().all(|&x| x == 0.0)
    }

    fn all_zero(buffer: &RolloutBuffer) -> bool {
        buffer.obs.iter().all(|(_, o)| zero(o.view()))
            && zero(buffer.actions())
            && zero(buffer.rewards().into_dyn())
            && zero(buffer.episode_starts().into_dyn())
            && zero(buffer.values().into_dyn())
            && zero(buffer.log_probs().into_dyn())
            && zero(buffer.returns().into_dyn())
            && zero(buffer.advantages().into_dyn())
    }

    #[test]
    fn test_build() {
        let buffer = buffer(5, 3);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
        assert_eq!(buffer.observations("observation").unwrap().shape(), &[5, 3, 3]);
        assert_eq!(buffer.observations("action_mask").unwrap().shape(), &[5, 3, 2]);
        assert_eq!(buffer.actions().shape(), &[5, 3, 1]);
        for a in [
            buffer.rewards(),
            buffer.episode_starts(),
            buffer.values(),
            buffer.log_probs(),
            buffer.returns(),
            buffer.advantages(),
        ] {
            assert_eq!(a.shape(), &[5, 3]);
        }
        assert!(all_zero(&buffer));
    }

    #[test]
    fn test_build_with_invalid_params() {
        let invalid = [
            (0, 1, vec![1]),
            (1, 0, vec![1]),
            (1, 1, vec![0]),
            (usize::MAX / 2, 4, vec![1]),
            (1 << 30, 1 << 30, vec![1 << 10]),
        ];
        for (capacity, num_envs, act_shape) in invalid {
            match RolloutBuffer::new(capacity, num_envs, obs_shapes(), act_shape, 0.99, 0.95) {
                Err(RolloutBufferError::Config(_)) => {}
                _ => panic!("expected a config error"),
            }
        }
    }

    #[test]
    fn test_add_until_full() {
        let mut buffer = buffer(3, 2);
        for i in 0..3 {
            add_step(&mut buffer, i as f32 + 1.0).unwrap();
            assert_eq!(buffer.len(), i + 1);
        }
        assert!(buffer.is_full());

        match add_step(&mut buffer, 9.0) {
            Err(RolloutBufferError::Capacity { capacity: 3 }) => {}
            res => panic!("expected a capacity error, got {:?}", res),
        }
        assert_eq!(buffer.len(), 3);
        assert!(buffer.rewards().iter().all(|&r| r != 9.0));

        // Rows are written in time order.
        for t in 0..3 {
            let expected = t as f32 + 1.0;
            assert!(buffer.rewards().row(t).iter().all(|&r| r == expected));
            assert!(buffer
                .observations("observation")
                .unwrap()
                .index_axis(Axis(0), t)
                .iter()
                .all(|&o| o == expected));
        }
    }

    #[test]
    fn test_add_copies_data() {
        let mut buffer = buffer(2, 2);
        let mut obs = step_obs(2, 1.0);
        let mut act = ArrayD::from_elem(IxDyn(&[2, 1]), 1.0);
        let mut reward = Array1::from_elem(2, 1.0);
        let x = Array1::zeros(2);
        buffer.add(&obs, &act, &reward, &x, &x, &x).unwrap();

        // Caller reuses its arrays for the next step.
        obs.insert("observation", ArrayD::from_elem(IxDyn(&[2, 3]), 5.0));
        act.fill(5.0);
        reward.fill(5.0);

        assert!(buffer.observations("observation").unwrap().index_axis(Axis(0), 0).iter().all(|&o| o == 1.0));
        assert!(buffer.actions().index_axis(Axis(0), 0).iter().all(|&a| a == 1.0));
        assert!(buffer.rewards().row(0).iter().all(|&r| r == 1.0));
    }

    #[test]
    fn test_add_with_wrong_shapes_leaves_buffer_unchanged() {
        let mut buffer = buffer(2, 2);
        add_step(&mut buffer, 1.0).unwrap();

        let good = Array1::from_elem(2, 7.0);
        let bad = Array1::from_elem(3, 7.0);
        let act = ArrayD::from_elem(IxDyn(&[2, 1]), 7.0);

        // Wrong env axis of a scalar signal.
        let err = buffer.add(&step_obs(2, 7.0), &act, &good, &good, &good, &bad).unwrap_err();
        assert!(matches!(err, RolloutBufferError::ShapeMismatch { ref name, .. } if name == "log_prob"));

        // Wrong trailing shape of the action.
        let err = buffer
            .add(&step_obs(2, 7.0), &ArrayD::from_elem(IxDyn(&[2, 2]), 7.0), &good, &good, &good, &good)
            .unwrap_err();
        assert!(matches!(err, RolloutBufferError::ShapeMismatch { ref name, .. } if name == "act"));

        // Wrong trailing shape of an observation component.
        let mut obs = step_obs(2, 7.0);
        obs.insert("observation", ArrayD::from_elem(IxDyn(&[2, 4]), 7.0));
        let err = buffer.add(&obs, &act, &good, &good, &good, &good).unwrap_err();
        assert!(matches!(err, RolloutBufferError::ShapeMismatch { ref name, .. } if name == "observation"));

        // Missing and unexpected components.
        let obs = NamedArrays::from_single("observation", ArrayD::from_elem(IxDyn(&[2, 3]), 7.0));
        let err = buffer.add(&obs, &act, &good, &good, &good, &good).unwrap_err();
        assert!(matches!(err, RolloutBufferError::MissingKey(ref k) if k == "action_mask"));

        let mut obs = step_obs(2, 7.0);
        obs.insert("extra", ArrayD::from_elem(IxDyn(&[2, 1]), 7.0));
        let err = buffer.add(&obs, &act, &good, &good, &good, &good).unwrap_err();
        assert!(matches!(err, RolloutBufferError::UnexpectedKey(ref k) if k == "extra"));
        assert!(err.is_shape_mismatch());

        assert_eq!(buffer.len(), 1);
        assert!(buffer.rewards().row(1).iter().all(|&r| r == 0.0));
        assert!(buffer.observations("observation").unwrap().iter().all(|&o| o != 7.0));
        assert!(buffer.actions().iter().all(|&a| a != 7.0));
    }

    #[test]
    fn test_reset() {
        let mut buffer = buffer(2, 3);
        add_step(&mut buffer, 1.0).unwrap();
        add_step(&mut buffer, 2.0).unwrap();
        buffer.compute_returns_and_advantages(&Array1::ones(3), &Array1::zeros(3)).unwrap();

        buffer.reset();
        assert_eq!(buffer.len(), 0);
        assert!(all_zero(&buffer));

        add_step(&mut buffer, 3.0).unwrap();
        assert!(buffer.rewards().row(0).iter().all(|&r| r == 3.0));
        assert!(buffer.rewards().row(1).iter().all(|&r| r == 0.0));
        assert!(buffer.observations("action_mask").unwrap().iter().all(|&o| o != 1.0 && o != 2.0));
    }
}
