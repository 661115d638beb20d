//! Rollout buffer for on-policy reinforcement learning.
//!
//! This module provides a buffer that accumulates trajectories of a fixed
//! length from multiple parallel environments and prepares them for
//! actor-critic updates, e.g., PPO.
//!
//! # Key Components
//!
//! - [`RolloutBuffer`]: Time-major storage of observations, actions, rewards,
//!   episode-start flags, value estimates and log-probabilities
//! - [`compute_gae`]: Generalized advantage estimation over the stored steps
//! - [`swap_and_flatten`]: Layout transform from `(T, N, ...)` to `(N * T, ...)`
//! - [`RolloutSample`]: Shuffled, flattened samples for optimization
//! - [`RolloutBufferConfig`]: Configuration of the buffer
//!
//! # Storage layout
//!
//! Every array in the buffer has the leading shape `(capacity, num_envs)`,
//! i.e., the first axis is time and the second axis is the environment.
//! When samples are taken, the two axes are swapped and flattened, so that
//! flattened row `k` corresponds to environment `k / capacity` at time step
//! `k % capacity`.
mod base;
mod config;
mod gae;
mod sample;
pub use base::RolloutBuffer;
pub use config::RolloutBufferConfig;
pub use gae::compute_gae;
pub use sample::{swap_and_flatten, RolloutSample};
