#![warn(missing_docs)]
//! On-policy rollout buffer for actor-critic agents.
//!
//! [`RolloutBuffer`] stores fixed-length trajectories collected from `num_envs`
//! parallel environments, computes returns and advantages with generalized
//! advantage estimation (GAE), and hands the data out as a shuffled
//! [`RolloutSample`] for policy and value-function updates.
//!
//! A typical collection phase looks like this:
//!
//! ```rust
//! use border_rollout::{NamedArrays, RolloutBuffer, RolloutBufferConfig};
//! use ndarray::{Array1, ArrayD, IxDyn};
//!
//! # fn main() -> Result<(), border_rollout::RolloutBufferError> {
//! let config = RolloutBufferConfig::default()
//!     .capacity(4)
//!     .num_envs(2)
//!     .obs_shape("observation", vec![3])
//!     .act_shape(vec![1]);
//! let mut buffer = RolloutBuffer::build(&config)?;
//!
//! while !buffer.is_full() {
//!     let obs = NamedArrays::from_single("observation", ArrayD::zeros(IxDyn(&[2, 3])));
//!     let act = ArrayD::zeros(IxDyn(&[2, 1]));
//!     let ones = Array1::ones(2);
//!     let zeros = Array1::zeros(2);
//!     buffer.add(&obs, &act, &ones, &zeros, &zeros, &zeros)?;
//! }
//!
//! buffer.compute_returns_and_advantages(&Array1::zeros(2), &Array1::zeros(2))?;
//! let sample = buffer.permute_and_get_samples()?;
//! assert_eq!(sample.len(), 8);
//!
//! for minibatch in sample.minibatches(4)? {
//!     assert_eq!(minibatch.len(), 4);
//! }
//! buffer.reset();
//! # Ok(())
//! # }
//! ```
pub mod error;
mod named_arrays;
pub mod rollout_buffer;

pub use error::RolloutBufferError;
pub use named_arrays::NamedArrays;
pub use rollout_buffer::{
    compute_gae, swap_and_flatten, RolloutBuffer, RolloutBufferConfig, RolloutSample,
};
