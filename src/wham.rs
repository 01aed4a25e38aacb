//! The self-consistent WHAM solver for window free energies.

use crate::bias::Restraints;
use crate::errors::*;
use crate::reweight::{Profile1d, Profile2d};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView, ArrayView1, ArrayView3, Axis, Dimension};
use ndarray::{Ix2, Ix3};

/// Boltzmann constant in kcal/(mol K)
pub const BOLTZMANN_KCAL_PER_MOL: f64 = 0.001987204259;

/// How the solver reacts when successive free energy updates start to grow
///
/// The strict check compares only the two most recent changes, so it can stop an iteration that
/// is noisy but would still have converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceCheck {
    /// Stop as soon as the latest change is larger than the one before it
    Strict,
    /// Keep iterating until converged or the iteration limit is reached
    Disabled,
}

impl Default for DivergenceCheck {
    fn default() -> Self {
        Self::Strict
    }
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The largest change fell to or below the threshold
    Converged,
    /// The divergence check fired; the progression ends at the last estimate before it
    Diverged,
    /// `maximum_iterations` iterations ran without converging
    IterationLimit,
}

/// Summary of a call to [`Wham::converge`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Why the solver stopped
    pub status: ConvergenceStatus,
    /// Number of self-consistent updates computed in this call
    pub iterations: usize,
    /// Largest change in any free energy during the final update, ignoring the pinned window
    ///
    /// Infinite if no change could be measured.
    pub change: f64,
}

/// The trajectories and restraints handed to [`Wham::setup`], after burn-in has been skipped
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub(crate) trajectories: Array3<f64>,
    pub(crate) restraints: Restraints,
    pub(crate) kbt: f64,
    pub(crate) skipped: usize,
}

impl Ensemble {
    /// Number of simulation windows
    pub fn n_sims(&self) -> usize {
        self.trajectories.len_of(Axis(0))
    }

    /// Number of samples per window
    pub fn n_samples(&self) -> usize {
        self.trajectories.len_of(Axis(1))
    }

    /// Number of collective variables per sample
    pub fn n_cvs(&self) -> usize {
        self.trajectories.len_of(Axis(2))
    }

    /// `trajectories[i, n, cv]` is collective variable `cv` of sample `n` from window `i`
    pub fn trajectories(&self) -> &Array3<f64> {
        &self.trajectories
    }

    /// The restraint of each window
    pub fn restraints(&self) -> &Restraints {
        &self.restraints
    }

    /// Thermal energy $k_B T$, the unit of every free energy
    pub fn kbt(&self) -> f64 {
        self.kbt
    }

    /// Number of leading samples dropped from each window as burn-in
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Project every sample onto a linear combination of collective variables
    pub(crate) fn project(&self, cv: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        if cv.len() != self.n_cvs() {
            return Err(WhamError::ArrayLengthMismatch(cv.len(), self.n_cvs()));
        }
        Ok(self.trajectories.map_axis(Axis(2), |x| x.dot(&cv)))
    }
}

/// Weighted histogram analysis method for harmonically restrained windows
///
/// Configure with [`Wham::builder`], load data with [`Wham::setup`], solve for the window free
/// energies with [`Wham::converge`], then reweight samples into profiles with
/// [`Wham::project_1d`] or [`Wham::project_2d`].
///
/// # Notes
///
/// The bias weight tensor has `sims × samples × sims` entries. It is computed on the first call
/// to `converge` and kept until the next `setup`.
///
/// # References
///
/// 1. Kumar S, Rosenberg JM, Bouzida D, Swendsen RH and Kollman PA. J. Comput. Chem. 13:1011,
/// 1992 <https://doi.org/10.1002/jcc.540130812>
#[derive(Builder, Debug)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct Wham {
    /// Boltzmann constant; sets the energy unit. Defaults to kcal/(mol K).
    #[builder(default = "BOLTZMANN_KCAL_PER_MOL")]
    boltzmann_constant: f64,

    /// Fraction of each window's samples discarded as burn-in from `(sims, samples)` input
    #[builder(default = "0.1")]
    skip_fraction: f64,

    /// Largest change in free energy, in units of $k_B T$'s energy unit, that counts as converged
    #[builder(default = "0.01")]
    threshold: f64,

    /// Set to limit the maximum number of iterations performed per call to `converge`
    #[builder(default = "10_000")]
    maximum_iterations: usize,

    /// How to react to growing updates
    #[builder(default)]
    divergence_check: DivergenceCheck,

    #[builder(setter(skip))]
    pub(crate) ensemble: Option<Ensemble>,

    #[builder(setter(skip))]
    bias_weights: Option<Array3<f32>>,

    #[builder(setter(skip))]
    pub(crate) progression: Vec<Array1<f64>>,

    #[builder(setter(skip))]
    pub(crate) denom: Option<Array2<f64>>,

    #[builder(setter(skip))]
    pub(crate) profile_1d: Option<Profile1d>,

    #[builder(setter(skip))]
    pub(crate) profile_2d: Option<Profile2d>,
}

impl WhamBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(kb) = self.boltzmann_constant {
            if !(kb > 0.0 && kb.is_finite()) {
                return Err(format!("boltzmann_constant must be positive (not {})", kb));
            }
        }

        if let Some(fraction) = self.skip_fraction {
            if !(0.0..1.0).contains(&fraction) {
                return Err(format!("skip_fraction must be in [0, 1) (not {})", fraction));
            }
        }

        if let Some(threshold) = self.threshold {
            if !(threshold >= 0.0) {
                return Err(format!("threshold must be non-negative (not {})", threshold));
            }
        }

        if let Some(0) = self.maximum_iterations {
            return Err("maximum_iterations must be at least 1".to_string());
        }

        Ok(())
    }

    /// Build the solver. No data is loaded until [`Wham::setup`] is called.
    pub fn build(&self) -> Result<Wham> {
        Ok(self.build_inner()?)
    }
}

impl Default for Wham {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Wham should not fail with default params")
    }
}

impl Wham {
    /// Get a new builder for the `Wham` struct
    pub fn builder() -> WhamBuilder {
        WhamBuilder::default()
    }

    /// Load trajectories and restraints
    ///
    /// # Parameters
    ///
    /// `trajectories` --- either `(sims, samples)` for a single collective variable or
    /// `(sims, samples, cvs)`. For the single collective variable layout the first
    /// `skip_fraction` of every window is dropped; the three dimensional layout is used as given.
    ///
    /// `temperature` --- in Kelvin; $k_B T$ is `boltzmann_constant * temperature`.
    ///
    /// `spring_constants`, `centres` --- either one value per window (single collective
    /// variable only) or `(sims, cvs)`.
    ///
    /// Any cached bias weights, free energies and profiles from a previous setup are discarded.
    /// If this returns an error, nothing is changed.
    pub fn setup<D1, D2, D3>(
        &mut self,
        trajectories: ArrayView<'_, f64, D1>,
        temperature: f64,
        spring_constants: ArrayView<'_, f64, D2>,
        centres: ArrayView<'_, f64, D3>,
    ) -> Result<()>
    where
        D1: Dimension,
        D2: Dimension,
        D3: Dimension,
    {
        let ndim = trajectories.ndim();
        let trajectories: ArrayView3<'_, f64> = match ndim {
            2 => trajectories
                .into_dimensionality::<Ix2>()
                .map(|t| t.insert_axis(Axis(2))),
            3 => trajectories.into_dimensionality::<Ix3>(),
            _ => return Err(WhamError::InvalidShape(ndim)),
        }
        .map_err(|_| WhamError::InvalidShape(ndim))?;

        let kbt = self.boltzmann_constant * temperature;
        if !(kbt > 0.0 && kbt.is_finite()) {
            return Err(WhamError::InvalidTemperature(temperature));
        }

        let (n_sims, total, n_cvs) = trajectories.dim();
        let skipped = match ndim {
            2 => (total as f64 * self.skip_fraction).floor() as usize,
            _ => 0,
        };
        if n_sims == 0 || skipped >= total {
            return Err(WhamError::EmptyEnsemble { skipped, total });
        }

        let restraints = Restraints::new(
            restraint_array(spring_constants, n_sims, n_cvs)?,
            restraint_array(centres, n_sims, n_cvs)?,
        )?;

        debug!(
            "Loaded {} windows of {} samples over {} collective variables, skipping {}",
            n_sims,
            total - skipped,
            n_cvs,
            skipped
        );

        self.ensemble = Some(Ensemble {
            trajectories: trajectories.slice(s![.., skipped.., ..]).to_owned(),
            restraints,
            kbt,
            skipped,
        });
        self.bias_weights = None;
        self.progression.clear();
        self.invalidate_reweighting();
        Ok(())
    }

    /// Seed the free energy progression from a previous run so `converge` resumes from it
    pub fn seed_progression(&mut self, progression: Vec<Array1<f64>>) -> Result<()> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or(WhamError::NotSetUp("seed_progression()"))?;

        if let Some(f) = progression.iter().find(|f| f.len() != ensemble.n_sims()) {
            return Err(WhamError::ArrayLengthMismatch(f.len(), ensemble.n_sims()));
        }

        self.progression = progression;
        self.invalidate_reweighting();
        Ok(())
    }

    /// Iterate the WHAM equations until the free energies change by at most `threshold`
    pub fn converge(&mut self) -> Result<Convergence> {
        self.converge_with_threshold(self.threshold)
    }

    /// Iterate the WHAM equations until the free energies change by at most `threshold`
    ///
    /// Each update appends the new free energies to the progression, shifted so that the last
    /// window is zero. Iteration resumes from the end of the progression if there is one, and
    /// otherwise starts from uniform free energies. The first change is measured against the
    /// last entry already in the progression, so a fresh run needs at least two updates.
    ///
    /// Stopping because of the divergence check or the iteration limit is not an error; the
    /// returned [`Convergence`] says why the solver stopped.
    pub fn converge_with_threshold(&mut self, threshold: f64) -> Result<Convergence> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or(WhamError::NotSetUp("converge()"))?;
        let kbt = ensemble.kbt;
        let n_samples = ensemble.n_samples() as f64;

        let weights = self.bias_weights.get_or_insert_with(|| {
            debug!("Computing bias weights");
            ensemble
                .restraints
                .bias_weights(ensemble.trajectories.view(), kbt)
        });

        let initial_len = self.progression.len();
        let mut f_old = match self.progression.last() {
            Some(f) => f.clone(),
            None => Array1::ones(ensemble.n_sims()),
        };
        let mut iterations = 0;
        let mut change = f64::INFINITY;

        let status = loop {
            if iterations == self.maximum_iterations {
                warn!(
                    "Free energies did not converge within {} iterations (last change {})",
                    iterations, change
                );
                break ConvergenceStatus::IterationLimit;
            }

            let f_new = self_consistent_update(weights.view(), f_old.view(), n_samples, kbt);
            iterations += 1;

            if let Some(last) = self.progression.last() {
                change = max_change(last.view(), f_new.view());

                let n = self.progression.len();
                if self.divergence_check == DivergenceCheck::Strict && n >= 2 {
                    let previous = max_change(self.progression[n - 2].view(), last.view());
                    if previous < change {
                        warn!(
                            "The iteration started to diverge (change grew from {} to {})",
                            previous, change
                        );
                        break ConvergenceStatus::Diverged;
                    }
                }
            }

            debug!("Iteration {}: largest change {}", iterations, change);
            self.progression.push(f_new.clone());
            f_old = f_new;

            if !(change > threshold) {
                info!(
                    "Free energies converged after {} iterations (largest change {})",
                    iterations, change
                );
                break ConvergenceStatus::Converged;
            }
        };

        if self.progression.len() != initial_len {
            self.invalidate_reweighting();
        }

        Ok(Convergence {
            status,
            iterations,
            change,
        })
    }

    fn invalidate_reweighting(&mut self) {
        self.denom = None;
        self.profile_1d = None;
        self.profile_2d = None;
    }

    /// The loaded ensemble, if `setup` has been called
    pub fn ensemble(&self) -> Option<&Ensemble> {
        self.ensemble.as_ref()
    }

    /// Thermal energy $k_B T$, if `setup` has been called
    pub fn kbt(&self) -> Option<f64> {
        self.ensemble.as_ref().map(Ensemble::kbt)
    }

    /// The cached bias weight tensor, if `converge` has computed it since the last `setup`
    pub fn bias_weights(&self) -> Option<&Array3<f32>> {
        self.bias_weights.as_ref()
    }

    /// Every free energy estimate so far, oldest first
    pub fn progression(&self) -> &[Array1<f64>] {
        &self.progression
    }

    /// The latest free energy estimate, relative to the last window
    pub fn free_energies(&self) -> Option<&Array1<f64>> {
        self.progression.last()
    }

    /// Per-sample normalisation weights, if computed for the latest free energies
    pub fn denom(&self) -> Option<&Array2<f64>> {
        self.denom.as_ref()
    }

    /// The result of the last call to `project_1d`
    pub fn profile_1d(&self) -> Option<&Profile1d> {
        self.profile_1d.as_ref()
    }

    /// The result of the last call to `project_2d`
    pub fn profile_2d(&self) -> Option<&Profile2d> {
        self.profile_2d.as_ref()
    }

    /// Boltzmann constant used to compute $k_B T$
    pub fn boltzmann_constant(&self) -> f64 {
        self.boltzmann_constant
    }

    /// Fraction of each window discarded as burn-in
    pub fn skip_fraction(&self) -> f64 {
        self.skip_fraction
    }

    /// Default convergence threshold used by `converge`
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Iteration limit per call to `converge`
    pub fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    /// How growing updates are handled
    pub fn divergence_check(&self) -> DivergenceCheck {
        self.divergence_check
    }
}

/// Interpret per-window restraint parameters as a `(sims, cvs)` array
fn restraint_array<D: Dimension>(
    values: ArrayView<'_, f64, D>,
    n_sims: usize,
    n_cvs: usize,
) -> Result<Array2<f64>> {
    let fits = match values.shape() {
        [len] => n_cvs == 1 && *len == n_sims,
        [sims, cvs] => *sims == n_sims && *cvs == n_cvs,
        _ => false,
    };

    if !fits {
        return Err(WhamError::RestraintShape {
            found: values.shape().to_vec(),
            expected: (n_sims, n_cvs),
        });
    }

    Array2::from_shape_vec((n_sims, n_cvs), values.iter().copied().collect()).map_err(|_| {
        WhamError::RestraintShape {
            found: values.shape().to_vec(),
            expected: (n_sims, n_cvs),
        }
    })
}

/// One self-consistent update of the window free energies
///
/// `weights[i, n, j]` is the bias weight of sample `n` from window `i` under restraint `j`. A sample
/// whose biased partition sum is exactly zero contributes nothing.
pub(crate) fn self_consistent_update(
    weights: ArrayView3<'_, f32>,
    free_energies: ArrayView1<'_, f64>,
    n_samples: f64,
    kbt: f64,
) -> Array1<f64> {
    let normalisation = free_energies.mapv(|f| n_samples * (f / kbt).exp());
    let mut populations = Array1::<f64>::zeros(free_energies.len());

    for w in weights.lanes(Axis(2)) {
        let partition: f64 = w
            .iter()
            .zip(normalisation.iter())
            .map(|(&w, &c)| f64::from(w) * c)
            .sum();
        let inverse = if partition != 0.0 {
            partition.recip()
        } else {
            partition
        };
        populations.zip_mut_with(&w, |p, &w| *p += f64::from(w) * inverse);
    }

    let mut f = populations.mapv(|p| -kbt * p.ln());
    if !f.is_empty() {
        let pinned = f[f.len() - 1];
        f -= pinned;
    }
    f
}

/// Largest absolute difference between two estimates, ignoring NaN and the pinned last window
///
/// Zero if there is nothing to compare; NaN if every difference is NaN.
pub(crate) fn max_change(previous: ArrayView1<'_, f64>, current: ArrayView1<'_, f64>) -> f64 {
    let compared = current.len().saturating_sub(1);
    if compared == 0 {
        return 0.0;
    }

    previous
        .iter()
        .zip(current.iter())
        .take(compared)
        .map(|(a, b)| (a - b).abs())
        .fold(f64::NAN, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn flat_wham(n_sims: usize, n_samples: usize) -> Wham {
        let mut wham = Wham::builder().skip_fraction(0.0).build().unwrap();
        let trajectories = Array2::from_elem((n_sims, n_samples), 0.3);
        let k = Array1::from_elem(n_sims, 1.0);
        let centres = Array1::from_elem(n_sims, 0.5);
        wham.setup(trajectories.view(), 300.0, k.view(), centres.view())
            .unwrap();
        wham
    }

    #[test]
    fn build_wham() {
        let wham = Wham::builder().build().unwrap();

        assert_eq!(wham.boltzmann_constant(), BOLTZMANN_KCAL_PER_MOL);
        assert_eq!(wham.skip_fraction(), 0.1);
        assert_eq!(wham.threshold(), 0.01);
        assert_eq!(wham.maximum_iterations(), 10_000);
        assert_eq!(wham.divergence_check(), DivergenceCheck::Strict);
        assert!(wham.ensemble().is_none());
        assert!(wham.progression().is_empty());
    }

    #[test]
    fn invalid_builder_params_are_rejected() {
        assert!(matches!(
            Wham::builder().skip_fraction(1.0).build(),
            Err(WhamError::BuilderError(_))
        ));
        assert!(matches!(
            Wham::builder().threshold(-1.0).build(),
            Err(WhamError::BuilderError(_))
        ));
        assert!(matches!(
            Wham::builder().maximum_iterations(0).build(),
            Err(WhamError::BuilderError(_))
        ));
        assert!(matches!(
            Wham::builder().boltzmann_constant(0.0).build(),
            Err(WhamError::BuilderError(_))
        ));
    }

    #[test]
    fn setup_2d_skips_a_tenth_of_each_window() {
        let mut wham = Wham::default();
        let trajectories = Array::linspace(0.0, 1.0, 60).into_shape((3, 20)).unwrap();

        wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 2.0, 3.0].view(),
            array![0.0, 0.5, 1.0].view(),
        )
        .unwrap();

        let ensemble = wham.ensemble().unwrap();
        assert_eq!(ensemble.skipped(), 2);
        assert_eq!(ensemble.trajectories().dim(), (3, 18, 1));
        assert_eq!(ensemble.trajectories()[[1, 0, 0]], trajectories[[1, 2]]);
        assert_eq!(ensemble.restraints().spring_constants(), &array![[1.0], [2.0], [3.0]]);
        assert_abs_diff_eq!(ensemble.kbt(), BOLTZMANN_KCAL_PER_MOL * 300.0);
    }

    #[test]
    fn setup_floors_the_skip_count() {
        let mut wham = Wham::default();
        let trajectories = Array2::<f64>::zeros((2, 19));

        wham.setup(
            trajectories.view(),
            300.0,
            array![[1.0], [1.0]].view(),
            array![[0.0], [1.0]].view(),
        )
        .unwrap();

        assert_eq!(wham.ensemble().unwrap().skipped(), 1);
        assert_eq!(wham.ensemble().unwrap().n_samples(), 18);
    }

    #[test]
    fn setup_3d_keeps_every_sample() {
        let mut wham = Wham::default();
        let trajectories = Array3::<f64>::zeros((2, 10, 3));
        let k = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let centres = Array2::<f64>::zeros((2, 3));

        wham.setup(trajectories.view(), 310.0, k.view(), centres.view())
            .unwrap();

        let ensemble = wham.ensemble().unwrap();
        assert_eq!(ensemble.trajectories().dim(), (2, 10, 3));
        assert_eq!(ensemble.skipped(), 0);
        assert_eq!(ensemble.restraints().spring_constants(), &k);
    }

    #[test]
    fn wrong_rank_is_an_invalid_shape() {
        let mut wham = flat_wham(2, 10);

        let flat = array![0.0, 1.0, 2.0];
        match wham.setup(flat.view(), 300.0, array![1.0].view(), array![0.0].view()) {
            Err(WhamError::InvalidShape(1)) => {}
            other => panic!("Expected InvalidShape(1), got {:?}", other),
        }

        let deep = ndarray::Array4::<f64>::zeros((2, 2, 2, 2));
        match wham.setup(deep.view(), 300.0, array![1.0].view(), array![0.0].view()) {
            Err(WhamError::InvalidShape(4)) => {}
            other => panic!("Expected InvalidShape(4), got {:?}", other),
        }

        // The previous ensemble survives a failed setup
        assert_eq!(wham.ensemble().unwrap().trajectories().dim(), (2, 10, 1));
    }

    #[test]
    fn mismatched_restraints_are_rejected() {
        let mut wham = Wham::default();
        let trajectories = Array3::<f64>::zeros((2, 10, 2));

        let result = wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 1.0].view(),
            array![0.0, 1.0].view(),
        );
        assert!(matches!(result, Err(WhamError::RestraintShape { .. })));
        assert!(wham.ensemble().is_none());
    }

    #[test]
    fn everything_skipped_is_an_error() {
        let mut wham = Wham::default();
        let trajectories = Array2::<f64>::zeros((2, 0));

        let result = wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 1.0].view(),
            array![0.0, 1.0].view(),
        );
        assert!(matches!(result, Err(WhamError::EmptyEnsemble { .. })));
    }

    #[test]
    fn converge_before_setup_is_an_error() {
        let mut wham = Wham::default();
        assert!(matches!(wham.converge(), Err(WhamError::NotSetUp(_))));
    }

    #[test]
    fn bias_weights_are_cached_until_setup() {
        let mut wham = flat_wham(2, 10);
        assert!(wham.bias_weights().is_none());

        wham.converge().unwrap();
        assert_eq!(wham.bias_weights().unwrap().dim(), (2, 10, 2));

        let trajectories = Array2::from_elem((2, 10), 0.3);
        wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 1.0].view(),
            array![0.5, 0.5].view(),
        )
        .unwrap();
        assert!(wham.bias_weights().is_none());
        assert!(wham.progression().is_empty());
    }

    #[test]
    fn flat_case_converges_with_zero_change() {
        let mut wham = flat_wham(3, 10);

        let convergence = wham.converge().unwrap();

        assert_eq!(convergence.status, ConvergenceStatus::Converged);
        assert_eq!(convergence.iterations, 2);
        assert_eq!(convergence.change, 0.0);
        assert_eq!(wham.free_energies().unwrap(), &array![0.0, 0.0, 0.0]);
    }

    #[test]
    fn seeded_flat_case_converges_on_first_update() {
        let mut wham = flat_wham(3, 10);
        wham.seed_progression(vec![array![0.0, 0.0, 0.0]]).unwrap();

        let convergence = wham.converge().unwrap();

        assert_eq!(convergence.iterations, 1);
        assert_eq!(convergence.change, 0.0);
        assert_eq!(wham.progression().len(), 2);
    }

    #[test]
    fn last_window_is_pinned_to_zero() {
        let mut wham = Wham::builder()
            .skip_fraction(0.0)
            .divergence_check(DivergenceCheck::Disabled)
            .threshold(1e-8)
            .build()
            .unwrap();
        let trajectories = array![[0.0, 0.1, 0.2, 0.4], [0.3, 0.5, 0.6, 0.7], [0.6, 0.8, 0.9, 1.0]];
        wham.setup(
            trajectories.view(),
            300.0,
            array![5.0, 10.0, 20.0].view(),
            array![0.1, 0.5, 0.9].view(),
        )
        .unwrap();

        wham.converge().unwrap();

        assert!(wham.progression().len() > 2);
        for f in wham.progression() {
            assert_eq!(f[2], 0.0);
        }
    }

    #[test]
    fn divergence_stops_without_extending_progression() {
        let mut wham = flat_wham(2, 10);
        wham.seed_progression(vec![array![1.0, 0.0], array![1.0, 0.0]])
            .unwrap();

        let convergence = wham.converge().unwrap();

        assert_eq!(convergence.status, ConvergenceStatus::Diverged);
        assert_eq!(convergence.iterations, 1);
        assert_eq!(convergence.change, 1.0);
        assert_eq!(wham.progression().len(), 2);
        assert_eq!(wham.free_energies().unwrap(), &array![1.0, 0.0]);
    }

    #[test]
    fn disabled_divergence_check_keeps_going() {
        let mut wham = Wham::builder()
            .skip_fraction(0.0)
            .divergence_check(DivergenceCheck::Disabled)
            .build()
            .unwrap();
        let trajectories = Array2::from_elem((2, 10), 0.3);
        wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 1.0].view(),
            array![0.5, 0.5].view(),
        )
        .unwrap();
        wham.seed_progression(vec![array![1.0, 0.0], array![1.0, 0.0]])
            .unwrap();

        let convergence = wham.converge().unwrap();

        assert_eq!(convergence.status, ConvergenceStatus::Converged);
        assert_eq!(convergence.iterations, 2);
        assert_eq!(wham.progression().len(), 4);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let mut wham = Wham::builder()
            .skip_fraction(0.0)
            .maximum_iterations(1)
            .build()
            .unwrap();
        let trajectories = Array2::from_elem((2, 4), 0.3);
        wham.setup(
            trajectories.view(),
            300.0,
            array![1.0, 1.0].view(),
            array![0.5, 0.5].view(),
        )
        .unwrap();

        let convergence = wham.converge().unwrap();

        assert_eq!(convergence.status, ConvergenceStatus::IterationLimit);
        assert_eq!(convergence.iterations, 1);
        assert_eq!(wham.progression().len(), 1);

        // A second call resumes where the first stopped
        let convergence = wham.converge().unwrap();
        assert_eq!(convergence.status, ConvergenceStatus::Converged);
        assert_eq!(wham.progression().len(), 2);
    }

    #[test]
    fn seeded_progression_must_match_window_count() {
        let mut wham = flat_wham(2, 10);
        assert!(matches!(
            wham.seed_progression(vec![array![0.0, 0.0, 0.0]]),
            Err(WhamError::ArrayLengthMismatch(3, 2))
        ));

        let mut fresh = Wham::default();
        assert!(matches!(
            fresh.seed_progression(vec![]),
            Err(WhamError::NotSetUp(_))
        ));
    }

    #[test]
    fn zero_partition_sums_are_skipped() {
        // The second sample has zero weight under every restraint
        let weights = array![[[1.0f32, 1.0], [0.0, 0.0]], [[1.0, 1.0], [0.0, 0.0]]];
        let f = self_consistent_update(weights.view(), array![0.0, 0.0].view(), 2.0, 0.6);

        assert!(f.iter().all(|f| f.is_finite()));
        assert_eq!(f, array![0.0, 0.0]);
    }

    #[test]
    fn change_ignores_pinned_window_and_nan() {
        let previous = array![1.0, f64::NAN, 3.0, 100.0];
        let current = array![1.5, 2.0, 2.0, 0.0];
        assert_eq!(max_change(previous.view(), current.view()), 1.0);

        assert_eq!(max_change(array![5.0].view(), array![0.0].view()), 0.0);
        assert!(max_change(array![f64::NAN, 0.0].view(), array![1.0, 0.0].view()).is_nan());
    }
}
