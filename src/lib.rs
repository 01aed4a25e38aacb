#![warn(rust_2018_idioms, missing_docs, missing_debug_implementations)]

//! The weighted histogram analysis method (WHAM) for combining biased umbrella sampling or
//! string method windows into an unbiased free energy profile.
//!
//! Each window $i$ samples a collective variable $x$ under a harmonic restraint
//! $U_i(x) = \sum_{cv} \tfrac{1}{2} k_{i,cv} (x_{0,i,cv} - x_{cv})^2$. WHAM finds the window free
//! energies $F_j$ that satisfy
//!
//! $$
//!     e^{-F_j / k_B T} = \sum_{i,n} \frac{e^{-U_j(x_{i,n}) / k_B T}}
//!         {\sum_k N e^{(F_k - U_k(x_{i,n})) / k_B T}}
//! $$
//!
//! and then reweights every sample into 1D or 2D histograms along a linear combination of the
//! collective variables.
//!
//! # Examples
//!
//! ```
//! use wham_rs::testsystems::HarmonicUmbrella;
//! use wham_rs::{Wham, DEFAULT_BINS};
//! use ndarray::array;
//!
//! let umbrella = HarmonicUmbrella::default();
//! let samples = umbrella.sample(200, 42).unwrap();
//!
//! let mut wham = Wham::builder().build().unwrap();
//! wham.setup(
//!     samples.view(),
//!     umbrella.temperature(),
//!     umbrella.spring_constants().view(),
//!     umbrella.centres().view(),
//! )
//! .unwrap();
//! wham.converge().unwrap();
//!
//! let profile = wham.project_1d(array![1.0].view(), DEFAULT_BINS).unwrap();
//! assert_eq!(profile.free_energy.len(), DEFAULT_BINS);
//! ```
//!
//! Please reference the following if you use this code in your research:
//!
//! [1] Kumar S, Rosenberg JM, Bouzida D, Swendsen RH and Kollman PA. The weighted histogram
//! analysis method for free-energy calculations on biomolecules. I. The method. J. Comput. Chem.
//! 13:1011, 1992. <https://doi.org/10.1002/jcc.540130812>

#[macro_use]
extern crate derive_builder;

pub mod bias;
pub mod binning;
pub mod errors;
pub mod reweight;
pub mod testsystems;
pub mod wham;

pub use crate::errors::{Result, WhamError};
pub use crate::reweight::{Profile1d, Profile2d, DEFAULT_BINS};
pub use crate::wham::{
    Convergence, ConvergenceStatus, DivergenceCheck, Wham, WhamBuilder, BOLTZMANN_KCAL_PER_MOL,
};
