//! Synthetic umbrella sampling systems with known free energies.

use crate::errors::*;
use crate::wham::BOLTZMANN_KCAL_PER_MOL;
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Umbrella sampling windows on a flat free energy surface.
///
/// Window `j` restrains a single collective variable with a harmonic potential of force constant
/// `spring_constants[j]` centred on `centres[j]`. Because the underlying surface is flat, each
/// window samples a normal distribution and the window free energies are known exactly.
///
/// # Examples
///
/// Generate samples with default parameters.
///
/// ```
/// use wham_rs::testsystems::*;
///
/// let umbrella = HarmonicUmbrella::default();
/// let x_kn = umbrella.sample(100, 7).unwrap();
/// assert_eq!(x_kn.dim(), (5, 100));
/// ```
///
/// Windows with different force constants.
///
/// ```
/// use wham_rs::testsystems::*;
/// use ndarray::array;
///
/// let umbrella = HarmonicUmbrella::builder()
///     .centres(array![0.0, 0.5, 1.0])
///     .spring_constants(array![10.0, 20.0, 40.0])
///     .build()
///     .unwrap();
/// let analytical_free_energies = umbrella.analytical_free_energies();
/// assert_eq!(analytical_free_energies[2], 0.0);
/// ```
#[derive(Builder, Debug)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct HarmonicUmbrella {
    /// Restraint centre of each window.
    #[builder(default = "array![0.0, 0.25, 0.5, 0.75, 1.0]")]
    centres: Array1<f64>,

    /// Force constant of each window.
    #[builder(default = "array![50.0, 50.0, 50.0, 50.0, 50.0]")]
    spring_constants: Array1<f64>,

    /// Temperature in Kelvin
    #[builder(default = "300.0")]
    temperature: f64,

    /// Boltzmann constant; defaults to kcal/(mol K)
    #[builder(default = "BOLTZMANN_KCAL_PER_MOL")]
    boltzmann_constant: f64,
}

impl HarmonicUmbrellaBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let (Some(centres), Some(k)) = (&self.centres, &self.spring_constants) {
            if centres.len() != k.len() {
                return Err(format!(
                    "centres and spring_constants must have equal lengths (not {} and {})",
                    centres.len(),
                    k.len()
                ));
            }
        }

        if let Some(k) = &self.spring_constants {
            if k.iter().any(|&k| !(k > 0.0)) {
                return Err("spring_constants must all be positive".to_string());
            }
        }

        if let Some(t) = self.temperature {
            if !(t > 0.0) {
                return Err(format!("temperature must be positive (not {})", t));
            }
        }

        Ok(())
    }

    /// Build the test system
    pub fn build(&self) -> Result<HarmonicUmbrella> {
        Ok(self.build_inner()?)
    }
}

impl HarmonicUmbrella {
    /// Get a new builder for the `HarmonicUmbrella` struct
    pub fn builder() -> HarmonicUmbrellaBuilder {
        HarmonicUmbrellaBuilder::default()
    }

    /// Restraint centre of each window
    pub fn centres(&self) -> &Array1<f64> {
        &self.centres
    }

    /// Force constant of each window
    pub fn spring_constants(&self) -> &Array1<f64> {
        &self.spring_constants
    }

    /// Temperature in Kelvin
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Thermal energy $k_B T$
    pub fn kbt(&self) -> f64 {
        self.boltzmann_constant * self.temperature
    }

    /// Number of windows
    pub fn n_windows(&self) -> usize {
        self.centres.len()
    }

    /// Draw `n_samples` independent samples from every window
    ///
    /// `x_kn[k, n]` is sample `n` from window `k`, ready to pass to
    /// [`Wham::setup`](crate::Wham::setup). The same seed always gives the same samples.
    pub fn sample(&self, n_samples: usize, seed: u64) -> Result<Array2<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let kbt = self.kbt();
        let mut x_kn = Array2::zeros((self.n_windows(), n_samples));

        for ((&centre, &k), mut row) in self
            .centres
            .iter()
            .zip(self.spring_constants.iter())
            .zip(x_kn.outer_iter_mut())
        {
            let normal = Normal::new(centre, (kbt / k).sqrt())?;
            row.iter_mut().for_each(|x| *x = normal.sample(&mut rng));
        }

        Ok(x_kn)
    }

    /// Exact window free energies, relative to the last window
    ///
    /// $F_j = -\tfrac{k_B T}{2} \ln (k_{last} / k_j)$
    pub fn analytical_free_energies(&self) -> Array1<f64> {
        let half_kbt = 0.5 * self.kbt();
        match self.spring_constants.iter().last() {
            Some(&k_last) => self.spring_constants.mapv(|k| -half_kbt * (k_last / k).ln()),
            None => Array1::zeros(0),
        }
    }
}

impl Default for HarmonicUmbrella {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("HarmonicUmbrella should not fail with default params")
    }
}
