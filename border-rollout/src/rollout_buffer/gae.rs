//! Generalized advantage estimation (GAE).
use super::RolloutBuffer;
use crate::RolloutBufferError;
use log::trace;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Computes advantages and returns with generalized advantage estimation.
///
/// All 2-dimensional arrays have the shape `(n_steps, n_envs)`, time-major.
/// `episode_starts[[t, e]]` is `1` if a new episode of environment `e` began at
/// step `t`. `last_values` are the value estimates of the states following the
/// last step, and `last_dones` is `1` for environments whose episode terminated
/// there. Environments are independent; the recursion runs backward in time:
///
/// ```text
/// m_t      = 1 - episode_starts[t + 1]   (1 - last_dones for the last step)
/// delta_t  = r_t + gamma * V_{t+1} * m_t - V_t
/// A_t      = delta_t + gamma * lambda * m_t * A_{t+1}
/// R_t      = A_t + V_t
/// ```
///
/// Returns `(advantages, returns)`.
///
/// # Panics
///
/// Panics if `values` or `episode_starts` does not have the shape of
/// `rewards`, or if `last_values` or `last_dones` does not have `n_envs`
/// elements. [`RolloutBuffer::compute_returns_and_advantages`] checks the
/// shapes and returns an error instead.
pub fn compute_gae(
    rewards: ArrayView2<f32>,
    values: ArrayView2<f32>,
    episode_starts: ArrayView2<f32>,
    last_values: ArrayView1<f32>,
    last_dones: ArrayView1<f32>,
    gamma: f32,
    gae_lambda: f32,
) -> (Array2<f32>, Array2<f32>) {
    let (n_steps, n_envs) = rewards.dim();
    assert_eq!(values.dim(), (n_steps, n_envs), "shape of values");
    assert_eq!(episode_starts.dim(), (n_steps, n_envs), "shape of episode_starts");
    assert_eq!(last_values.len(), n_envs, "length of last_values");
    assert_eq!(last_dones.len(), n_envs, "length of last_dones");

    let mut advantages = Array2::<f32>::zeros((n_steps, n_envs));

    let mut next_value = last_values.to_owned();
    let mut next_adv = Array1::<f32>::zeros(n_envs);

    for t in (0..n_steps).rev() {
        for e in 0..n_envs {
            // Zero if the next step starts a new episode, which cuts the bootstrap.
            let next_non_terminal = if t + 1 < n_steps {
                1.0 - episode_starts[[t + 1, e]]
            } else {
                1.0 - last_dones[e]
            };
            let delta = rewards[[t, e]] + gamma * next_value[e] * next_non_terminal
                - values[[t, e]];
            let adv = delta + gamma * gae_lambda * next_non_terminal * next_adv[e];

            advantages[[t, e]] = adv;
            next_value[e] = values[[t, e]];
            next_adv[e] = adv;
        }
    }

    let returns = &advantages + &values;
    (advantages, returns)
}

impl RolloutBuffer {
    /// Computes returns and advantages of the stored rollout in place.
    ///
    /// # Arguments
    ///
    /// * `last_values` - Value estimates of the states following the last step, `(num_envs,)`
    /// * `last_dones` - `1` if the episode terminated after the last step, `(num_envs,)`
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::NotFull`] unless the buffer is full, and
    /// [`RolloutBufferError::ShapeMismatch`] if an argument is not `(num_envs,)`.
    pub fn compute_returns_and_advantages(
        &mut self,
        last_values: &Array1<f32>,
        last_dones: &Array1<f32>,
    ) -> Result<(), RolloutBufferError> {
        self.ensure_full()?;
        for (name, a) in [("last_values", last_values), ("last_dones", last_dones)] {
            if a.len() != self.num_envs {
                return Err(RolloutBufferError::ShapeMismatch {
                    name: name.to_string(),
                    expected: vec![self.num_envs],
                    actual: a.shape().to_vec(),
                });
            }
        }
        trace!(
            "Compute returns and advantages: gamma = {}, gae_lambda = {}",
            self.gamma,
            self.gae_lambda
        );

        let (advantages, returns) = compute_gae(
            self.reward.view(),
            self.value.view(),
            self.episode_start.view(),
            last_values.view(),
            last_dones.view(),
            self.gamma,
            self.gae_lambda,
        );
        self.advantage = advantages;
        self.ret = returns;

        Ok(())
    }
}
