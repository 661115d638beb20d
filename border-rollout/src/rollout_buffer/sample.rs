//! Shuffled samples taken from a full rollout buffer.
use super::RolloutBuffer;
use crate::{NamedArrays, RolloutBufferError};
use log::trace;
use ndarray::{Array, Array1, ArrayD, Axis, Dimension, Ix1, IxDyn, Slice};
use rand::seq::SliceRandom;

/// Swaps the first two axes of an array and flattens them.
///
/// An array of the shape `(T, N, ...)` is transformed into `(N * T, ...)`.
/// Row `k` of the result is the element at time `k % T` of environment `k / T`,
/// i.e., the rows of each environment are contiguous and ordered in time.
///
/// # Errors
///
/// Returns [`RolloutBufferError::TooFewAxes`] if the array has less than
/// two axes.
pub fn swap_and_flatten<D: Dimension>(
    array: &Array<f32, D>,
) -> Result<ArrayD<f32>, RolloutBufferError> {
    let shape = array.shape();
    if shape.len() < 2 {
        return Err(RolloutBufferError::TooFewAxes(shape.to_vec()));
    }
    let mut flat_shape = Vec::with_capacity(shape.len() - 1);
    flat_shape.push(shape[0] * shape[1]);
    flat_shape.extend_from_slice(&shape[2..]);

    let mut view = array.view();
    view.swap_axes(0, 1);

    // Iteration follows the logical order of the swapped view.
    let data = view.iter().cloned().collect::<Vec<_>>();
    Ok(ArrayD::from_shape_vec(IxDyn(&flat_shape), data)?)
}

/// Shuffled samples of a rollout.
///
/// Every field has a leading axis of size `capacity * num_envs`. Row `i` of
/// every field comes from the same time step of the same environment, which
/// is identified by [`RolloutSample::ix_sample`].
///
/// The arrays are copies; the sample can be kept after the buffer is reset.
#[derive(Clone, Debug)]
pub struct RolloutSample {
    obs: NamedArrays,
    act: ArrayD<f32>,
    value: Array1<f32>,
    log_prob: Array1<f32>,
    advantage: Array1<f32>,
    ret: Array1<f32>,
    ix_sample: Vec<usize>,
    capacity: usize,
}

impl RolloutSample {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ix_sample.len()
    }

    /// Returns `true` if the sample has no row.
    pub fn is_empty(&self) -> bool {
        self.ix_sample.is_empty()
    }

    /// Observations for each component, `(len, ...)`.
    pub fn observations(&self) -> &NamedArrays {
        &self.obs
    }

    /// Actions, `(len, ...act_shape)`.
    pub fn actions(&self) -> &ArrayD<f32> {
        &self.act
    }

    /// Value estimates at the time of the rollout.
    pub fn old_values(&self) -> &Array1<f32> {
        &self.value
    }

    /// Log-probabilities of the actions at the time of the rollout.
    pub fn old_log_probs(&self) -> &Array1<f32> {
        &self.log_prob
    }

    /// Advantages.
    pub fn advantages(&self) -> &Array1<f32> {
        &self.advantage
    }

    /// Returns.
    pub fn returns(&self) -> &Array1<f32> {
        &self.ret
    }

    /// Flattened index of each row, see [`swap_and_flatten`].
    pub fn ix_sample(&self) -> &[usize] {
        &self.ix_sample
    }

    /// Environment and time step of row `i`.
    pub fn env_and_step(&self, i: usize) -> Option<(usize, usize)> {
        self.ix_sample
            .get(i)
            .map(|&k| (k / self.capacity, k % self.capacity))
    }

    /// Decomposes the sample into its fields.
    ///
    /// Returns observations, actions, values, log-probabilities, advantages,
    /// returns and the flattened indices of the rows.
    pub fn unpack(
        self,
    ) -> (
        NamedArrays,
        ArrayD<f32>,
        Array1<f32>,
        Array1<f32>,
        Array1<f32>,
        Array1<f32>,
        Vec<usize>,
    ) {
        (
            self.obs,
            self.act,
            self.value,
            self.log_prob,
            self.advantage,
            self.ret,
            self.ix_sample,
        )
    }

    /// Splits the sample into minibatches of `batch_size` consecutive rows.
    ///
    /// The last minibatch is smaller if `batch_size` does not divide the
    /// number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::Config`] if `batch_size` is zero.
    pub fn minibatches(&self, batch_size: usize) -> Result<Vec<RolloutSample>, RolloutBufferError> {
        if batch_size == 0 {
            return Err(RolloutBufferError::Config(
                "batch_size must be positive".to_string(),
            ));
        }

        let len = self.len();
        let mut batches = Vec::with_capacity((len + batch_size - 1) / batch_size);
        let mut start = 0;
        while start < len {
            let end = (start + batch_size).min(len);
            batches.push(self.rows(start, end)?);
            start = end;
        }
        Ok(batches)
    }

    fn rows(&self, start: usize, end: usize) -> Result<RolloutSample, RolloutBufferError> {
        let slice = Slice::from(start..end);
        Ok(RolloutSample {
            obs: self
                .obs
                .try_map::<_, RolloutBufferError>(|o| Ok(o.slice_axis(Axis(0), slice).to_owned()))?,
            act: self.act.slice_axis(Axis(0), slice).to_owned(),
            value: self.value.slice_axis(Axis(0), slice).to_owned(),
            log_prob: self.log_prob.slice_axis(Axis(0), slice).to_owned(),
            advantage: self.advantage.slice_axis(Axis(0), slice).to_owned(),
            ret: self.ret.slice_axis(Axis(0), slice).to_owned(),
            ix_sample: self.ix_sample[start..end].to_vec(),
            capacity: self.capacity,
        })
    }
}

impl RolloutBuffer {
    /// Shuffles the stored rollout and returns it as flattened samples.
    ///
    /// Arrays of the shape `(capacity, num_envs, ...)` are transformed with
    /// [`swap_and_flatten`], and the rows of all of them are gathered with a
    /// single random permutation. Rewards and episode-start flags are not
    /// included. The buffer stays full, so calling this method again gives
    /// another shuffle of the same data.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutBufferError::NotFull`] unless the buffer is full.
    pub fn permute_and_get_samples(&mut self) -> Result<RolloutSample, RolloutBufferError> {
        self.ensure_full()?;

        let mut ixs = (0..self.capacity * self.num_envs).collect::<Vec<_>>();
        ixs.shuffle(&mut self.rng);
        trace!("Take {} shuffled samples from rollout buffer", ixs.len());

        let gather = |a: ArrayD<f32>| a.select(Axis(0), &ixs);
        let gather1 = |a: ArrayD<f32>| -> Result<Array1<f32>, RolloutBufferError> {
            Ok(a.into_dimensionality::<Ix1>()?.select(Axis(0), &ixs))
        };

        Ok(RolloutSample {
            obs: self
                .obs
                .try_map::<_, RolloutBufferError>(|o| Ok(gather(swap_and_flatten(o)?)))?,
            act: gather(swap_and_flatten(&self.act)?),
            value: gather1(swap_and_flatten(&self.value)?)?,
            log_prob: gather1(swap_and_flatten(&self.log_prob)?)?,
            advantage: gather1(swap_and_flatten(&self.advantage)?)?,
            ret: gather1(swap_and_flatten(&self.ret)?)?,
            ix_sample: ixs.clone(),
            capacity: self.capacity,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_swap_and_flatten_2d() {
        // (T, N) = (3, 2), element = 10 * t + e
        let a = arr2(&[[0.0, 1.0], [10.0, 11.0], [20.0, 21.0]]);
        let flat = swap_and_flatten(&a).unwrap();
        assert_eq!(flat.shape(), &[6]);
        assert_eq!(
            flat.iter().cloned().collect::<Vec<f32>>(),
            vec![0.0, 10.0, 20.0, 1.0, 11.0, 21.0]
        );
    }

    #[test]
    fn test_swap_and_flatten_keeps_trailing_axes() {
        let (t_len, n_len) = (4, 3);
        let a = Array3::from_shape_fn((t_len, n_len, 2), |(t, e, j)| {
            (100 * t + 10 * e + j) as f32
        });
        let flat = swap_and_flatten(&a).unwrap();
        assert_eq!(flat.shape(), &[12, 2]);
        for k in 0..t_len * n_len {
            let (e, t) = (k / t_len, k % t_len);
            for j in 0..2 {
                assert_eq!(flat[[k, j]], (100 * t + 10 * e + j) as f32);
            }
        }
    }

    #[test]
    fn test_swap_and_flatten_rejects_1d() {
        let a = Array1::<f32>::zeros(3);
        let err = swap_and_flatten(&a).unwrap_err();
        assert!(err.is_shape_mismatch());
        assert!(err.to_string().contains("at least 2 axes"));
        match err {
            RolloutBufferError::TooFewAxes(shape) => assert_eq!(shape, vec![3]),
            err => panic!("unexpected error: {:?}", err),
        }
    }
}
