//! Reweighting samples with converged window free energies into unbiased profiles.

use crate::bias::Restraints;
use crate::binning::{create_bins, digitize};
use crate::errors::*;
use crate::wham::Wham;
use ndarray::{s, Array, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Dimension};

/// Number of bins used when the caller has no better idea
pub const DEFAULT_BINS: usize = 50;

/// A free energy profile along one reaction coordinate
///
/// Bin `b` starts at `edges[b]`. The last bin only ever holds samples outside the range of the
/// edges, so its population is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile1d {
    /// Lower edge of every bin
    pub edges: Array1<f64>,
    /// `populations[b]` is the unbiased weight in bin `b`, summed over all windows
    pub populations: Array1<f64>,
    /// `populations_per_sim[i, b]` is the weight contributed to bin `b` by window `i`
    pub populations_per_sim: Array2<f64>,
    /// Free energy of each bin, zero at the lowest bin in the first half of the range
    pub free_energy: Array1<f64>,
    /// `free_energy_per_sim[i, b]` is the free energy from window `i`'s samples alone, on the
    /// same reference as `free_energy`
    pub free_energy_per_sim: Array2<f64>,
}

impl Profile1d {
    fn new(
        edges: Array1<f64>,
        populations: Array1<f64>,
        populations_per_sim: Array2<f64>,
        kbt: f64,
    ) -> Self {
        let free_energy = free_energy(&populations, kbt);
        let offset = reference_offset(free_energy.view());

        Self {
            edges,
            free_energy: free_energy - offset,
            free_energy_per_sim: self::free_energy(&populations_per_sim, kbt) - offset,
            populations,
            populations_per_sim,
        }
    }
}

/// Free energy profiles along two reaction coordinates and their sum
///
/// `q12` is the sum of the two projections `q1` and `q2`. Each coordinate gets its own bin edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile2d {
    /// Lower edges of the `q12` bins
    pub edges: Array1<f64>,
    /// Lower edges of the `q1` bins
    pub edges_q1: Array1<f64>,
    /// Lower edges of the `q2` bins
    pub edges_q2: Array1<f64>,
    /// Unbiased weight in each `q12` bin
    pub populations: Array1<f64>,
    /// `populations_per_sim[i, b]` is the weight window `i` contributes to `q12` bin `b`
    pub populations_per_sim: Array2<f64>,
    /// Unbiased weight in each `q1` bin
    pub populations_q1: Array1<f64>,
    /// Unbiased weight in each `q2` bin
    pub populations_q2: Array1<f64>,
    /// `populations_2d[b1, b2]` is the joint weight of `q1` bin `b1` and `q2` bin `b2`
    pub populations_2d: Array2<f64>,
    /// Free energy along `q12`
    pub free_energy: Array1<f64>,
    /// Free energy along `q12` from each window alone
    pub free_energy_per_sim: Array2<f64>,
    /// Free energy over the `(q1, q2)` plane, on the same reference as `free_energy`
    pub free_energy_2d: Array2<f64>,
    /// Free energy along `q1`, relative to its own reference region
    pub free_energy_q1: Array1<f64>,
    /// Free energy along `q2`, relative to its own reference region
    pub free_energy_q2: Array1<f64>,
}

/// Accumulate per-sample weights into bins along one coordinate
///
/// `projections[i, n]` and `denom[i, n]` are the coordinate and weight of sample `n` from window
/// `i`. Samples that [`digitize`] places outside every bin are left out. Returns the total
/// population of each bin and its breakdown by window.
pub fn count_populations(
    projections: ArrayView2<'_, f64>,
    edges: ArrayView1<'_, f64>,
    denom: ArrayView2<'_, f64>,
) -> (Array1<f64>, Array2<f64>) {
    let mut per_sim = Array2::zeros((projections.nrows(), edges.len()));

    for ((q, d), mut p) in projections
        .outer_iter()
        .zip(denom.outer_iter())
        .zip(per_sim.outer_iter_mut())
    {
        for (&q, &d) in q.iter().zip(d.iter()) {
            if let Some(bin) = digitize(q, edges) {
                p[bin] += d;
            }
        }
    }

    (per_sim.sum_axis(Axis(0)), per_sim)
}

/// $-k_B T \ln P$ for every bin
///
/// Empty bins come out as positive infinity.
pub fn free_energy<S, D>(populations: &ArrayBase<S, D>, kbt: f64) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    populations.mapv(|p| -kbt * p.ln())
}

/// Lowest free energy in the first half of the bins
///
/// The first half of the range is taken as the reference state. At least one bin is always
/// used. NaN is ignored; if every reference bin is NaN the offset is NaN.
pub fn reference_offset(free_energy: ArrayView1<'_, f64>) -> f64 {
    let n_reference = (free_energy.len() / 2).max(1).min(free_energy.len());
    free_energy
        .slice(s![..n_reference])
        .iter()
        .copied()
        .fold(f64::NAN, f64::min)
}

/// Normalisation weight of one sample given the window free energies
///
/// $1 / \sum_j N e^{(F_j - U_j(x)) / k_B T}$, or zero if the sum is exactly zero.
fn sample_weight(
    restraints: &Restraints,
    free_energies: ArrayView1<'_, f64>,
    sample: ArrayView1<'_, f64>,
    n_samples: f64,
    kbt: f64,
) -> f64 {
    let partition: f64 = restraints
        .bias_energies(sample)
        .iter()
        .zip(free_energies.iter())
        .map(|(u, f)| n_samples * ((f - u) / kbt).exp())
        .sum();

    if partition != 0.0 {
        partition.recip()
    } else {
        0.0
    }
}

impl Wham {
    /// Compute the normalisation weight of every sample from the latest free energies
    ///
    /// Bias energies are recomputed from the restraints rather than read from the cached bias
    /// weights. The result is kept until the free energies change.
    pub fn calc_denom(&mut self) -> Result<&Array2<f64>> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or(WhamError::NotSetUp("calc_denom()"))?;
        let free_energies = self
            .progression
            .last()
            .ok_or(WhamError::NotConverged("calc_denom()"))?;

        let n_samples = ensemble.n_samples() as f64;
        let denom = Array2::from_shape_fn((ensemble.n_sims(), ensemble.n_samples()), |(i, n)| {
            sample_weight(
                &ensemble.restraints,
                free_energies.view(),
                ensemble.trajectories.slice(s![i, n, ..]),
                n_samples,
                ensemble.kbt,
            )
        });

        Ok(&*self.denom.insert(denom))
    }

    /// Free energy profile along a linear combination of collective variables
    ///
    /// # Parameters
    ///
    /// `cv` --- weight of each collective variable in the reaction coordinate
    ///
    /// `n_bins` --- number of bins; [`DEFAULT_BINS`] is a reasonable choice
    ///
    /// # Notes
    ///
    /// The profile is zero at its lowest point in the first half of the bins, so the samples
    /// there should cover a physically meaningful reference state, like one end of a path.
    pub fn project_1d(&mut self, cv: ArrayView1<'_, f64>, n_bins: usize) -> Result<&Profile1d> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or(WhamError::NotSetUp("project_1d()"))?;
        if self.progression.is_empty() {
            return Err(WhamError::NotConverged("project_1d()"));
        }
        let projections = ensemble.project(cv)?;
        let kbt = ensemble.kbt;

        if self.denom.is_none() {
            self.calc_denom()?;
        }
        let denom = self
            .denom
            .as_ref()
            .ok_or(WhamError::NotConverged("project_1d()"))?;

        let edges = create_bins(&projections, n_bins);
        let (populations, per_sim) = count_populations(projections.view(), edges.view(), denom.view());

        let profile = Profile1d::new(edges, populations, per_sim, kbt);
        Ok(&*self.profile_1d.insert(profile))
    }

    /// Free energy profiles along two linear combinations of collective variables
    ///
    /// Every sample is reweighted directly from its bias energies, then binned along `q1`, `q2`,
    /// their sum `q12` and jointly over `(q1, q2)`. The `q12`, per-window and 2D profiles share
    /// the reference offset of the `q12` profile.
    pub fn project_2d(
        &mut self,
        cv1: ArrayView1<'_, f64>,
        cv2: ArrayView1<'_, f64>,
        n_bins: usize,
    ) -> Result<&Profile2d> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or(WhamError::NotSetUp("project_2d()"))?;
        let free_energies = self
            .progression
            .last()
            .ok_or(WhamError::NotConverged("project_2d()"))?;

        let q1 = ensemble.project(cv1)?;
        let q2 = ensemble.project(cv2)?;
        let q12 = &q1 + &q2;

        let edges = create_bins(&q12, n_bins);
        let edges_q1 = create_bins(&q1, n_bins);
        let edges_q2 = create_bins(&q2, n_bins);

        let mut populations = Array1::zeros(n_bins);
        let mut populations_per_sim = Array2::zeros((ensemble.n_sims(), n_bins));
        let mut populations_q1 = Array1::zeros(n_bins);
        let mut populations_q2 = Array1::zeros(n_bins);
        let mut populations_2d = Array2::zeros((n_bins, n_bins));

        let n_samples = ensemble.n_samples() as f64;
        for (i, trajectory) in ensemble.trajectories.outer_iter().enumerate() {
            for (n, sample) in trajectory.outer_iter().enumerate() {
                let w = sample_weight(
                    &ensemble.restraints,
                    free_energies.view(),
                    sample,
                    n_samples,
                    ensemble.kbt,
                );

                let bin = digitize(q12[[i, n]], edges.view());
                let bin_q1 = digitize(q1[[i, n]], edges_q1.view());
                let bin_q2 = digitize(q2[[i, n]], edges_q2.view());

                if let Some(b) = bin {
                    populations[b] += w;
                    populations_per_sim[[i, b]] += w;
                }
                if let Some(b1) = bin_q1 {
                    populations_q1[b1] += w;
                }
                if let Some(b2) = bin_q2 {
                    populations_q2[b2] += w;
                }
                if let (Some(b1), Some(b2)) = (bin_q1, bin_q2) {
                    populations_2d[[b1, b2]] += w;
                }
            }
        }

        let kbt = ensemble.kbt;
        let f = free_energy(&populations, kbt);
        let offset = reference_offset(f.view());
        let f_q1 = free_energy(&populations_q1, kbt);
        let f_q2 = free_energy(&populations_q2, kbt);
        let offset_q1 = reference_offset(f_q1.view());
        let offset_q2 = reference_offset(f_q2.view());

        let profile = Profile2d {
            free_energy: f - offset,
            free_energy_per_sim: free_energy(&populations_per_sim, kbt) - offset,
            free_energy_2d: free_energy(&populations_2d, kbt) - offset,
            free_energy_q1: f_q1 - offset_q1,
            free_energy_q2: f_q2 - offset_q2,
            edges,
            edges_q1,
            edges_q2,
            populations,
            populations_per_sim,
            populations_q1,
            populations_q2,
            populations_2d,
        };
        Ok(&*self.profile_2d.insert(profile))
    }
}
