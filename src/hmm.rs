//! Hidden state sequence sampling for a discrete Markov chain.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::error::{Error, Result};
use crate::seed::Seed;

/// Posterior sampler for the hidden path of a Markov chain.
///
/// Given an initial distribution, a row-stochastic transition matrix and
/// per-timestep emission log-likelihoods (`timesteps x states`), returns the
/// marginal log-likelihood of the emissions and one path drawn from the
/// posterior over state sequences.
pub trait PosteriorSampler {
    fn sample_posterior(
        &self,
        seed: Seed,
        initial_distribution: ArrayView1<'_, f64>,
        transition_matrix: ArrayView2<'_, f64>,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<(f64, Array1<usize>)>;
}

/// Forward filtering with per-step normalization, followed by backward sampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardFilterBackwardSample;

fn draw_categorical<R: Rng + ?Sized>(rng: &mut R, weights: ArrayView1<'_, f64>) -> usize {
    let total: f64 = weights.sum();
    let mut target = rng.random::<f64>() * total;
    for (state, &weight) in weights.iter().enumerate() {
        if target < weight {
            return state;
        }
        target -= weight;
    }
    // Only reached through rounding; fall back to the last state with mass.
    weights
        .iter()
        .rposition(|&w| w > 0.)
        .unwrap_or(weights.len() - 1)
}

impl PosteriorSampler for ForwardFilterBackwardSample {
    fn sample_posterior(
        &self,
        seed: Seed,
        initial_distribution: ArrayView1<'_, f64>,
        transition_matrix: ArrayView2<'_, f64>,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<(f64, Array1<usize>)> {
        let (num_timesteps, num_states) = log_likelihoods.dim();
        if num_timesteps == 0 {
            return Err(Error::Shape("log-likelihoods have no timesteps".to_string()));
        }
        let mut filtered = Array2::<f64>::zeros((num_timesteps, num_states));
        let mut log_norm = 0f64;

        let mut predicted = initial_distribution.to_owned();
        for (t, ll) in log_likelihoods.axis_iter(Axis(0)).enumerate() {
            let max_ll = ll.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
            let mut alpha = &predicted * &ll.mapv(|x| (x - max_ll).exp());
            let norm = alpha.sum();
            log_norm += norm.ln() + max_ll;
            alpha /= norm;
            predicted = alpha.dot(&transition_matrix);
            filtered.row_mut(t).assign(&alpha);
        }

        let mut rng = seed.rng();
        let mut states = Array1::<usize>::zeros(num_timesteps);
        let last = num_timesteps - 1;
        states[last] = draw_categorical(&mut rng, filtered.row(last));
        for t in (0..last).rev() {
            let next = states[t + 1];
            let weights = &filtered.row(t) * &transition_matrix.column(next);
            states[t] = draw_categorical(&mut rng, weights.view());
        }
        Ok((log_norm, states))
    }
}

/// Sample a hidden state sequence with a uniform initial distribution.
///
/// `mask` holds 1 for timesteps whose emission is observed and 0 for padding.
/// Masked timesteps contribute a log-likelihood of zero, so they are driven
/// by the transition structure alone.
pub fn sample_hmm_stateseq(
    seed: Seed,
    transition_matrix: ArrayView2<'_, f64>,
    log_likelihoods: ArrayView2<'_, f64>,
    mask: ArrayView1<'_, f64>,
) -> Result<(f64, Array1<usize>)> {
    sample_hmm_stateseq_with(
        &ForwardFilterBackwardSample,
        seed,
        transition_matrix,
        log_likelihoods,
        mask,
    )
}

/// [`sample_hmm_stateseq`] with a caller-supplied posterior sampler.
pub fn sample_hmm_stateseq_with<S: PosteriorSampler + ?Sized>(
    sampler: &S,
    seed: Seed,
    transition_matrix: ArrayView2<'_, f64>,
    log_likelihoods: ArrayView2<'_, f64>,
    mask: ArrayView1<'_, f64>,
) -> Result<(f64, Array1<usize>)> {
    let (rows, num_states) = transition_matrix.dim();
    if rows != num_states || num_states == 0 {
        return Err(Error::Shape(format!(
            "transition matrix must be square and non-empty, got {rows}x{num_states}"
        )));
    }
    let (num_timesteps, ll_states) = log_likelihoods.dim();
    if ll_states != num_states {
        return Err(Error::Shape(format!(
            "log-likelihoods have {ll_states} states, transition matrix has {num_states}"
        )));
    }
    if num_timesteps == 0 {
        return Err(Error::Shape("log-likelihoods have no timesteps".to_string()));
    }
    if mask.len() != num_timesteps {
        return Err(Error::Shape(format!(
            "mask has {} timesteps, log-likelihoods have {num_timesteps}",
            mask.len()
        )));
    }

    let initial_distribution = Array1::from_elem(num_states, (num_states as f64).recip());
    let masked = &log_likelihoods * &mask.insert_axis(Axis(1));

    sampler.sample_posterior(
        seed,
        initial_distribution.view(),
        transition_matrix,
        masked.view(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn sticky(num_states: usize, stay: f64) -> Array2<f64> {
        let off = (1. - stay) / (num_states - 1) as f64;
        Array2::from_shape_fn((num_states, num_states), |(i, j)| if i == j { stay } else { off })
    }

    struct Recording {
        seen: RefCell<Option<(Array1<f64>, Array2<f64>)>>,
    }

    impl PosteriorSampler for Recording {
        fn sample_posterior(
            &self,
            _seed: Seed,
            initial_distribution: ArrayView1<'_, f64>,
            _transition_matrix: ArrayView2<'_, f64>,
            log_likelihoods: ArrayView2<'_, f64>,
        ) -> Result<(f64, Array1<usize>)> {
            *self.seen.borrow_mut() = Some((
                initial_distribution.to_owned(),
                log_likelihoods.to_owned(),
            ));
            Ok((-1.5, Array1::from(vec![2, 0, 1])))
        }
    }

    #[test]
    fn masks_before_delegating() {
        let recording = Recording {
            seen: RefCell::new(None),
        };
        let ll = array![[-1., -2., -3.], [-4., -5., -6.], [-7., -8., -9.]];
        let mask = array![1., 0., 1.];
        let (log_norm, states) =
            sample_hmm_stateseq_with(&recording, Seed::new(0), sticky(3, 0.9).view(), ll.view(), mask.view())
                .unwrap();
        assert_eq!(log_norm, -1.5);
        assert_eq!(states, Array1::from(vec![2, 0, 1]));

        let (init, masked) = recording.seen.into_inner().unwrap();
        assert_eq!(init, Array1::from_elem(3, 1. / 3.));
        assert_eq!(masked, array![[-1., -2., -3.], [0., 0., 0.], [-7., -8., -9.]]);
    }

    #[test]
    fn fully_masked_ignores_likelihoods() {
        let trans = sticky(3, 0.8);
        let mask = Array1::zeros(6);
        let ll_a = Array2::from_shape_fn((6, 3), |(t, s)| -((t * 3 + s) as f64));
        let ll_b = Array2::from_shape_fn((6, 3), |(t, s)| (t as f64) - 10. * s as f64);
        for key in 0..10 {
            let a = sample_hmm_stateseq(Seed::new(key), trans.view(), ll_a.view(), mask.view()).unwrap();
            let b = sample_hmm_stateseq(Seed::new(key), trans.view(), ll_b.view(), mask.view()).unwrap();
            assert_eq!(a, b);
            assert_abs_diff_eq!(a.0, 0., epsilon = 1e-12);
        }
    }

    #[test]
    fn fully_masked_follows_transitions() {
        // Deterministic cycle 0 -> 1 -> 2 -> 0
        let trans = array![[0., 1., 0.], [0., 0., 1.], [1., 0., 0.]];
        let ll = Array2::zeros((7, 3));
        let mask = Array1::zeros(7);
        let (_, states) = sample_hmm_stateseq(Seed::new(4), trans.view(), ll.view(), mask.view()).unwrap();
        for t in 1..7 {
            assert_eq!(states[t], (states[t - 1] + 1) % 3);
        }
    }

    #[test]
    fn strong_evidence_determines_path() {
        let trans = sticky(2, 0.5);
        let path = [0usize, 1, 1, 0, 1];
        let ll = Array2::from_shape_fn((5, 2), |(t, s)| if path[t] == s { 0. } else { -50. });
        let mask = Array1::ones(5);
        let (log_norm, states) = sample_hmm_stateseq(Seed::new(1), trans.view(), ll.view(), mask.view()).unwrap();
        assert_eq!(states.to_vec(), path.to_vec());
        // one path of probability (1/2)^5 carries all the mass
        assert_abs_diff_eq!(log_norm, 5. * 0.5f64.ln(), epsilon = 1e-6);
    }

    #[test]
    fn log_norm_matches_enumeration() {
        let trans = array![[0.7, 0.3], [0.4, 0.6]];
        let ll = array![[-0.5, -1.2], [-2.0, -0.1], [-0.3, -0.9]];
        let mask = Array1::ones(3);
        let (log_norm, _) = sample_hmm_stateseq(Seed::new(0), trans.view(), ll.view(), mask.view()).unwrap();

        let mut total = 0f64;
        for z0 in 0..2 {
            for z1 in 0..2 {
                for z2 in 0..2 {
                    total += 0.5
                        * trans[[z0, z1]]
                        * trans[[z1, z2]]
                        * (ll[[0, z0]] + ll[[1, z1]] + ll[[2, z2]]).exp();
                }
            }
        }
        assert_abs_diff_eq!(log_norm, total.ln(), epsilon = 1e-10);
    }

    #[test]
    fn shape_errors() {
        let seed = Seed::new(0);
        let trans = sticky(2, 0.9);
        let ll = Array2::zeros((4, 2));
        assert!(matches!(
            sample_hmm_stateseq(seed, trans.view(), ll.view(), Array1::ones(3).view()),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            sample_hmm_stateseq(seed, Array2::zeros((2, 3)).view(), ll.view(), Array1::ones(4).view()),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            sample_hmm_stateseq(seed, sticky(3, 0.9).view(), ll.view(), Array1::ones(4).view()),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            sample_hmm_stateseq(seed, trans.view(), Array2::zeros((0, 2)).view(), Array1::ones(0).view()),
            Err(Error::Shape(_))
        ));
    }
}
