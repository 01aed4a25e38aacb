//! Harmonic restraints and the Boltzmann bias weights they impose on each sample.

use crate::errors::*;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3, Axis};

/// A harmonic restraint for every simulation window
///
/// Row `j` of `spring_constants` and `centres` holds the restraint applied in window `j`, one
/// column per collective variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Restraints {
    spring_constants: Array2<f64>,
    centres: Array2<f64>,
}

impl Restraints {
    /// Pair up spring constants and centres; both must have shape `(sims, cvs)`
    pub fn new(spring_constants: Array2<f64>, centres: Array2<f64>) -> Result<Self> {
        if spring_constants.dim() != centres.dim() {
            return Err(WhamError::RestraintShape {
                found: centres.shape().to_vec(),
                expected: spring_constants.dim(),
            });
        }

        Ok(Self {
            spring_constants,
            centres,
        })
    }

    /// Number of restrained windows
    pub fn n_sims(&self) -> usize {
        self.centres.len_of(Axis(0))
    }

    /// Number of restrained collective variables
    pub fn n_cvs(&self) -> usize {
        self.centres.len_of(Axis(1))
    }

    /// `spring_constants[j, cv]` is the force constant of window `j` along `cv`
    pub fn spring_constants(&self) -> &Array2<f64> {
        &self.spring_constants
    }

    /// `centres[j, cv]` is the restraint centre of window `j` along `cv`
    pub fn centres(&self) -> &Array2<f64> {
        &self.centres
    }

    /// Bias energy of a single sample under every window's restraint
    ///
    /// $U_j(x) = \sum_{cv} \tfrac{1}{2} k_{j,cv} (x_{0,j,cv} - x_{cv})^2$
    pub fn bias_energies(&self, sample: ArrayView1<'_, f64>) -> Array1<f64> {
        debug_assert_eq!(sample.len(), self.n_cvs());

        self.spring_constants
            .outer_iter()
            .zip(self.centres.outer_iter())
            .map(|(k, centre)| {
                k.iter()
                    .zip(centre.iter())
                    .zip(sample.iter())
                    .map(|((k, c), x)| 0.5 * k * (c - x).powi(2))
                    .sum::<f64>()
            })
            .collect()
    }

    /// The bias weight tensor for a trajectory ensemble of shape `(sims, samples, cvs)`
    ///
    /// `w[i, n, j]` is $e^{-U_j(x_{i,n}) / k_B T}$, the weight of sample `n` from window `i` under
    /// the restraint of window `j`. Weights are stored in single precision; samples far from a
    /// restraint underflow to zero.
    pub fn bias_weights(&self, trajectories: ArrayView3<'_, f64>, kbt: f64) -> Array3<f32> {
        let (n_sims, n_samples, _) = trajectories.dim();
        let mut weights = Array3::zeros((n_sims, n_samples, self.n_sims()));

        for (trajectory, mut sim_weights) in trajectories.outer_iter().zip(weights.outer_iter_mut()) {
            for (sample, mut w) in trajectory.outer_iter().zip(sim_weights.outer_iter_mut()) {
                let energies = self.bias_energies(sample);
                w.assign(&energies.mapv(|u| (-u / kbt).exp() as f32));
            }
        }

        weights
    }
}
