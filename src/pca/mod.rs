//! # Principal component analysis
//!
//! Dense PCA with pluggable decomposition backends. The covariance-eigen and
//! full-SVD backends are interchangeable: both report the same principal axes
//! (up to sign) and the same variance spectrum, which is the point the wine
//! walkthrough demonstrates.

use std::cmp::Ordering;

use anyhow::{bail, Result};
use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::variance::{variance_spectrum, VarianceSpectrum};

/// Seam for decomposition routines.
///
/// Input is the preprocessed (centered, optionally scaled) data matrix with
/// samples in rows. Output is the matrix of principal axes, one axis per row
/// sorted by descending variance, together with the variance spectrum
/// (covariance eigenvalues, or squared singular values over `n - 1`, which
/// coincide).
pub trait SpectrumBackend {
    fn decompose(&self, data: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)>;
}

/// Eigendecomposition of the sample covariance matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct CovarianceEigen;

impl SpectrumBackend for CovarianceEigen {
    fn decompose(&self, data: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        let (n_samples, n_features) = data.dim();
        if n_samples < 2 {
            bail!("covariance requires at least 2 samples, got {n_samples}");
        }

        let m = to_dmatrix(data);
        let cov = m.transpose() * &m / (n_samples as f64 - 1.0);
        let eigen = SymmetricEigen::new(cov);

        let mut pairs: Vec<(f64, Vec<f64>)> = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .map(|(j, &val)| (val, eigen.eigenvectors.column(j).iter().copied().collect()))
            .collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        // The covariance matrix is p x p, but only min(n, p) directions can
        // carry variance; trailing eigenvalues of a rank-deficient covariance
        // are numerical noise and are discarded so both backends report the
        // same spectrum length.
        let n_axes = n_samples.min(n_features);
        let mut axes = Array2::zeros((n_axes, n_features));
        let mut spectrum = Array1::zeros(n_axes);
        for (i, (val, vec)) in pairs.into_iter().take(n_axes).enumerate() {
            spectrum[i] = val;
            for (j, v) in vec.into_iter().enumerate() {
                axes[[i, j]] = v;
            }
        }

        Ok((axes, spectrum))
    }
}

/// Full singular value decomposition of the data matrix itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSvd;

impl SpectrumBackend for FullSvd {
    fn decompose(&self, data: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        let (n_samples, n_features) = data.dim();
        if n_samples < 2 {
            bail!("SVD variance spectrum requires at least 2 samples, got {n_samples}");
        }

        let m = to_dmatrix(data);
        let svd = m.svd(false, true);
        let v_t = match svd.v_t {
            Some(v_t) => v_t,
            None => bail!("SVD did not produce right singular vectors"),
        };

        // Right singular vectors are the principal axes; squared singular
        // values over n - 1 recover the covariance eigenvalues.
        let mut pairs: Vec<(f64, Vec<f64>)> = svd
            .singular_values
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                (
                    s * s / (n_samples as f64 - 1.0),
                    v_t.row(i).iter().copied().collect(),
                )
            })
            .collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let n_axes = pairs.len();
        let mut axes = Array2::zeros((n_axes, n_features));
        let mut spectrum = Array1::zeros(n_axes);
        for (i, (val, vec)) in pairs.into_iter().enumerate() {
            spectrum[i] = val;
            for (j, v) in vec.into_iter().enumerate() {
                axes[[i, j]] = v;
            }
        }

        Ok((axes, spectrum))
    }
}

fn to_dmatrix(data: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = data.dim();
    DMatrix::from_row_iterator(rows, cols, data.iter().copied())
}

pub struct PcaBuilder<B: SpectrumBackend> {
    n_components: Option<usize>,
    center: bool,
    scale: bool,
    backend: B,
}

impl<B: SpectrumBackend> PcaBuilder<B> {
    pub fn new(backend: B) -> Self {
        PcaBuilder {
            n_components: None,
            center: true,
            scale: false,
            backend,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// Divide each feature by its standard deviation after centering.
    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn build(self) -> Pca<B> {
        Pca {
            n_components: self.n_components,
            center: self.center,
            scale: self.scale,
            backend: self.backend,
            components: None,
            mean: None,
            std_dev: None,
            eigenvalues: None,
            spectrum: None,
        }
    }
}

pub struct Pca<B: SpectrumBackend> {
    n_components: Option<usize>,
    center: bool,
    scale: bool,
    backend: B,
    components: Option<Array2<f64>>,
    mean: Option<Array1<f64>>,
    std_dev: Option<Array1<f64>>,
    eigenvalues: Option<Array1<f64>>,
    spectrum: Option<VarianceSpectrum<f64>>,
}

impl<B: SpectrumBackend> Pca<B> {
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        let (n_samples, n_features) = x.dim();
        if n_samples < 2 {
            bail!("PCA requires at least 2 samples, got {n_samples}");
        }

        let mean = if self.center {
            Some(
                x.mean_axis(Axis(0))
                    .ok_or_else(|| anyhow::anyhow!("failed to compute feature means"))?,
            )
        } else {
            None
        };

        let std_dev = if self.scale {
            // Zero-variance features are left unscaled instead of dividing
            // by zero.
            let mut sd = x.std_axis(Axis(0), 0.0);
            sd.mapv_inplace(|s| if s > 0.0 { s } else { 1.0 });
            Some(sd)
        } else {
            None
        };

        let preprocessed = preprocess(x, mean.as_ref(), std_dev.as_ref());
        let (axes, raw_spectrum) = self.backend.decompose(preprocessed.view())?;

        let max_components = n_samples.min(n_features).min(axes.nrows());
        let n_components = self.n_components.unwrap_or(max_components);
        if n_components > max_components {
            bail!(
                "n_components={} cannot exceed min(n_samples, n_features)={} for a {}x{} matrix",
                n_components,
                max_components,
                n_samples,
                n_features
            );
        }

        // Ratios are always taken over the full spectrum, so a truncated model
        // still reports each component's share of the total variance.
        let spectrum = variance_spectrum(
            raw_spectrum
                .as_slice()
                .ok_or_else(|| anyhow::anyhow!("variance spectrum is not contiguous"))?,
        )?;

        debug!(
            "PCA fit: {} samples, {} features, keeping {} of {} components",
            n_samples,
            n_features,
            n_components,
            axes.nrows()
        );

        self.components = Some(axes.slice(ndarray::s![..n_components, ..]).to_owned());
        self.mean = mean;
        self.std_dev = std_dev;
        self.eigenvalues = Some(raw_spectrum);
        self.spectrum = Some(spectrum);
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let components = self
            .components
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("PCA has not been fitted"))?;

        if x.ncols() != components.ncols() {
            bail!(
                "input has {} features but the model was fitted on {}",
                x.ncols(),
                components.ncols()
            );
        }

        let preprocessed = preprocess(x, self.mean.as_ref(), self.std_dev.as_ref());
        Ok(preprocessed.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Principal axes, one per row, descending variance.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Full raw variance spectrum, descending.
    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.eigenvalues.as_ref()
    }

    /// Per-component share of the total variance, descending.
    pub fn explained_variance_ratio(&self) -> Option<&[f64]> {
        self.spectrum.as_ref().map(|s| s.percents.as_slice())
    }

    /// Running cumulative explained variance.
    pub fn cumulative_variance(&self) -> Option<&[f64]> {
        self.spectrum.as_ref().map(|s| s.cumulative.as_slice())
    }

    /// Components needed to explain `target` of the variance.
    ///
    /// Inherits the fallback of [`crate::variance::components_for_target`]:
    /// an unreachable target yields the full spectrum length.
    pub fn components_for_target(&self, target: f64) -> Option<usize> {
        self.spectrum
            .as_ref()
            .map(|s| s.components_for_target(target))
    }
}

fn preprocess(
    x: ArrayView2<f64>,
    mean: Option<&Array1<f64>>,
    std_dev: Option<&Array1<f64>>,
) -> Array2<f64> {
    let mut out = x.to_owned();
    if let Some(mean) = mean {
        out -= &mean.view().insert_axis(Axis(0));
    }
    if let Some(std_dev) = std_dev {
        out /= &std_dev.view().insert_axis(Axis(0));
    }
    out
}
