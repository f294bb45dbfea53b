pub mod dataset;
pub mod forest;
pub mod pca;
pub mod text;
pub mod variance;

pub use pca::{CovarianceEigen, FullSvd, Pca, PcaBuilder, SpectrumBackend};
pub use variance::{components_for_target, variance_spectrum, SpectrumError, VarianceSpectrum};
