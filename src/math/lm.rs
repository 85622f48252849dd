//! Bounded Levenberg-Marquardt least squares.
//!
//! Minimizes `sum r_i(p)^2` for a user-supplied residual function. Bounds are
//! handled with the MINUIT variable transformation (the same one `lmfit` uses),
//! so the optimizer itself works on an unconstrained internal vector:
//!
//! ```text
//! both bounds: p_int = asin(2 (p - min) / (max - min) - 1)
//! min only:    p_int = sqrt((p - min + 1)^2 - 1)
//! max only:    p_int = sqrt((max - p + 1)^2 - 1)
//! ```
//!
//! Each iteration solves the damped system `[J; sqrt(λ) D] δ = [-r; 0]` with
//! [`solve_least_squares`]. The covariance is estimated afterwards from the
//! Jacobian in external coordinates, `(Jᵀ J)⁻¹ · χ²/(n - n_vary)`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::ols::{invert_normal_matrix, solve_least_squares};

const EPS_SQRT: f64 = 1.490_116_119_384_765_6e-8;

/// One model parameter with optional bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
}

impl Param {
    /// Unbounded, varying parameter.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = max;
        self
    }

    pub fn with_bounds(self, min: f64, max: f64) -> Self {
        self.with_min(min).with_max(max)
    }

    /// Keep the parameter at its value during the fit.
    pub fn fixed(mut self) -> Self {
        self.vary = false;
        self
    }

    fn clamped(&self) -> f64 {
        self.value.max(self.min).min(self.max)
    }

    fn to_internal(&self, value: f64) -> f64 {
        let v = value.max(self.min).min(self.max);
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => (2.0 * (v - self.min) / (self.max - self.min) - 1.0).asin(),
            (true, false) => ((v - self.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.max - v + 1.0).powi(2) - 1.0).sqrt(),
            (false, false) => v,
        }
    }

    fn to_external(&self, internal: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => self.min + (internal.sin() + 1.0) * (self.max - self.min) / 2.0,
            (true, false) => self.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => self.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (false, false) => internal,
        }
    }
}

/// Stopping rules for [`minimize`].
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative reduction of χ² below which the fit is considered converged.
    pub ftol: f64,
    /// Relative step size below which the fit is considered converged.
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

/// Best-fit estimate of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    pub init: f64,
    /// `None` when the parameter is fixed or the covariance is unavailable.
    pub stderr: Option<f64>,
    pub vary: bool,
    pub min: f64,
    pub max: f64,
    /// Correlation with every other varying parameter.
    pub correl: BTreeMap<String, f64>,
}

/// Outcome of a least squares minimization.
#[derive(Debug, Clone)]
pub struct Minimized {
    pub params: Vec<ParamEstimate>,
    pub chisqr: f64,
    pub redchi: f64,
    pub ndata: usize,
    pub nvarys: usize,
    pub nfev: usize,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

impl Minimized {
    pub fn get(&self, name: &str) -> Option<&ParamEstimate> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|p| p.value)
    }

    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|p| p.stderr)
    }

    /// Best-fit values in parameter order.
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }
}

struct Problem<'a, F> {
    params: &'a [Param],
    free: Vec<usize>,
    residual: F,
    nfev: usize,
}

impl<F> Problem<'_, F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    fn external(&self, internal: &DVector<f64>) -> Vec<f64> {
        let mut values: Vec<f64> = self.params.iter().map(Param::clamped).collect();
        for (k, &idx) in self.free.iter().enumerate() {
            values[idx] = self.params[idx].to_external(internal[k]);
        }
        values
    }

    fn eval(&mut self, values: &[f64]) -> DVector<f64> {
        self.nfev += 1;
        DVector::from_vec((self.residual)(values))
    }

    /// Forward-difference Jacobian in internal coordinates.
    fn jacobian_internal(&mut self, p: &DVector<f64>, r: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(r.len(), p.len());
        for j in 0..p.len() {
            let h = step_for(p[j]);
            let mut shifted = p.clone();
            shifted[j] += h;
            let values = self.external(&shifted);
            let r_shift = self.eval(&values);
            jac.set_column(j, &((r_shift - r) / h));
        }
        jac
    }

    /// Forward-difference Jacobian with respect to the external values of the
    /// varying parameters.
    fn jacobian_external(&mut self, values: &[f64], r: &DVector<f64>) -> DMatrix<f64> {
        let free = self.free.clone();
        let mut jac = DMatrix::zeros(r.len(), free.len());
        for (k, &idx) in free.iter().enumerate() {
            let h = step_for(values[idx]);
            let mut shifted = values.to_vec();
            shifted[idx] += h;
            let r_shift = self.eval(&shifted);
            jac.set_column(k, &((r_shift - r) / h));
        }
        jac
    }
}

fn step_for(x: f64) -> f64 {
    if x != 0.0 { EPS_SQRT * x.abs() } else { EPS_SQRT }
}

fn sum_sq(r: &DVector<f64>) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Minimize the sum of squared residuals.
///
/// `residual` receives the external value of every parameter (fixed ones
/// included, in `params` order) and returns the residual vector. Weighting is
/// the caller's job: return `w_i * (model_i - data_i)`.
pub fn minimize<F>(params: &[Param], residual: F, opts: &LmOptions) -> Result<Minimized, AppError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    for p in params {
        if !p.value.is_finite() {
            return Err(AppError::new(
                4,
                format!("Initial value of parameter `{}` is not finite.", p.name),
            ));
        }
        if p.min > p.max {
            return Err(AppError::new(
                2,
                format!("Parameter `{}` has min {} > max {}.", p.name, p.min, p.max),
            ));
        }
    }

    let free: Vec<usize> = (0..params.len()).filter(|&i| params[i].vary).collect();
    let mut prob = Problem {
        params,
        free,
        residual,
        nfev: 0,
    };

    let mut p = DVector::from_iterator(
        prob.free.len(),
        prob.free.iter().map(|&i| params[i].to_internal(params[i].value)),
    );
    let mut values = prob.external(&p);
    let mut r = prob.eval(&values);
    let ndata = r.len();
    if ndata == 0 {
        return Err(AppError::new(3, "Residual function returned no data."));
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(AppError::new(4, "Residuals are not finite at the initial guess."));
    }
    let nvarys = prob.free.len();
    let mut chi2 = sum_sq(&r);

    let mut lambda: f64 = 1e-3;
    let mut converged = nvarys == 0;
    let mut message = String::from("Maximum number of iterations reached.");
    let mut iterations = 0;

    while !converged && iterations < opts.max_iterations {
        iterations += 1;
        if chi2 == 0.0 {
            converged = true;
            message = "Residuals vanish exactly.".to_string();
            break;
        }

        let jac = prob.jacobian_internal(&p, &r);
        let scale: Vec<f64> = (0..nvarys)
            .map(|j| jac.column(j).norm().max(1e-12))
            .collect();

        // Inner loop: raise the damping until a step lowers χ².
        let mut accepted = false;
        while lambda < 1e16 {
            let mut a = DMatrix::zeros(ndata + nvarys, nvarys);
            a.view_mut((0, 0), (ndata, nvarys)).copy_from(&jac);
            for j in 0..nvarys {
                a[(ndata + j, j)] = lambda.sqrt() * scale[j];
            }
            let mut b = DVector::zeros(ndata + nvarys);
            b.rows_mut(0, ndata).copy_from(&(-&r));

            let Some(delta) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                continue;
            };
            let p_new = &p + &delta;
            let values_new = prob.external(&p_new);
            let r_new = prob.eval(&values_new);
            let chi2_new = sum_sq(&r_new);

            if chi2_new.is_finite() && chi2_new < chi2 {
                let reduction = (chi2 - chi2_new) / chi2;
                let step = delta.norm() / (p.norm() + opts.xtol);
                p = p_new;
                values = values_new;
                r = r_new;
                chi2 = chi2_new;
                lambda = (lambda / 10.0).max(1e-12);
                accepted = true;
                if reduction <= opts.ftol {
                    converged = true;
                    message = "Relative reduction of chi-square below ftol.".to_string();
                } else if step <= opts.xtol {
                    converged = true;
                    message = "Relative parameter step below xtol.".to_string();
                }
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            // No direction lowers χ² any further: we are at a minimum to
            // machine precision.
            converged = true;
            message = "Chi-square cannot be reduced further.".to_string();
        }
    }

    let redchi = if ndata > nvarys {
        chi2 / (ndata - nvarys) as f64
    } else {
        f64::NAN
    };

    let mut estimates: Vec<ParamEstimate> = params
        .iter()
        .zip(values.iter())
        .map(|(param, &value)| ParamEstimate {
            name: param.name.clone(),
            value,
            init: param.value,
            stderr: None,
            vary: param.vary,
            min: param.min,
            max: param.max,
            correl: BTreeMap::new(),
        })
        .collect();

    if converged && nvarys > 0 && ndata > nvarys {
        let jac = prob.jacobian_external(&values, &r);
        let normal = jac.transpose() * &jac;
        if let Some(inv) = invert_normal_matrix(&normal) {
            let cov = inv * redchi;
            let sigmas: Vec<Option<f64>> = (0..nvarys)
                .map(|k| {
                    let var = cov[(k, k)];
                    (var.is_finite() && var >= 0.0).then(|| var.sqrt())
                })
                .collect();
            for (k, &idx) in prob.free.iter().enumerate() {
                estimates[idx].stderr = sigmas[k];
            }
            for (k, &idx) in prob.free.iter().enumerate() {
                for (m, &other) in prob.free.iter().enumerate() {
                    if k == m {
                        continue;
                    }
                    if let (Some(sk), Some(sm)) = (sigmas[k], sigmas[m]) {
                        if sk > 0.0 && sm > 0.0 {
                            let name = params[other].name.clone();
                            estimates[idx].correl.insert(name, cov[(k, m)] / (sk * sm));
                        }
                    }
                }
            }
        }
    }

    Ok(Minimized {
        params: estimates,
        chisqr: chi2,
        redchi,
        ndata,
        nvarys,
        nfev: prob.nfev,
        iterations,
        converged,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transforms_round_trip_inside_bounds() {
        let cases = [
            Param::new("a", 0.3).with_bounds(0.0, 1.0),
            Param::new("b", 2.5).with_min(1.0),
            Param::new("c", -4.0).with_max(0.0),
            Param::new("d", 7.0),
        ];
        for p in cases {
            let back = p.to_external(p.to_internal(p.value));
            assert!((back - p.value).abs() < 1e-12, "{}: {back}", p.name);
        }
    }

    #[test]
    fn external_values_never_leave_bounds() {
        let p = Param::new("a", 0.5).with_bounds(0.0, 1.0);
        for i in [-100.0, -3.0, 0.0, 2.0, 57.0] {
            let v = p.to_external(i);
            assert!((0.0..=1.0).contains(&v));
        }
        let q = Param::new("t", 1.0).with_min(1e-9);
        assert!(q.to_external(-1e6) >= 1e-9);
    }

    #[test]
    fn fits_straight_line_with_errors() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let noise = [0.1, -0.1];
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 1.5 * v - 2.0 + noise[i % 2])
            .collect();
        let params = [Param::new("m", 1.0), Param::new("c", 0.0)];
        let fit = minimize(
            &params,
            |p| x.iter().zip(&y).map(|(xi, yi)| p[0] * xi + p[1] - yi).collect(),
            &LmOptions::default(),
        )
        .unwrap();

        assert!(fit.converged);
        assert!((fit.value("m").unwrap() - 1.5).abs() < 1e-2);
        assert!((fit.value("c").unwrap() + 2.0).abs() < 1e-1);
        assert!(fit.stderr("m").unwrap() > 0.0);
        let corr = fit.get("m").unwrap().correl["c"];
        assert!(corr < 0.0 && corr > -1.0);
    }

    #[test]
    fn fixed_parameter_keeps_value_and_has_no_error() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * (-v / 0.4f64).exp() + 0.5).collect();
        let params = [
            Param::new("a", 1.0).with_min(0.0),
            Param::new("tau", 1.0).with_min(1e-6),
            Param::new("b", 0.5).fixed(),
        ];
        let fit = minimize(
            &params,
            |p| {
                x.iter()
                    .zip(&y)
                    .map(|(xi, yi)| p[0] * (-xi / p[1]).exp() + p[2] - yi)
                    .collect()
            },
            &LmOptions::default(),
        )
        .unwrap();

        assert!(fit.converged);
        assert_eq!(fit.value("b"), Some(0.5));
        assert!(fit.stderr("b").is_none());
        assert!((fit.value("tau").unwrap() - 0.4).abs() < 1e-6);
        assert!((fit.value("a").unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn bounded_fit_stops_at_bound() {
        // Unconstrained optimum is 2.0 but the bound caps it at 1.0.
        let params = [Param::new("a", 0.5).with_bounds(0.0, 1.0)];
        let fit = minimize(
            &params,
            |p| vec![p[0] - 2.0, p[0] - 2.0],
            &LmOptions::default(),
        )
        .unwrap();
        let a = fit.value("a").unwrap();
        assert!(a <= 1.0 && a > 0.999, "{a}");
    }

    #[test]
    fn no_stderr_without_degrees_of_freedom() {
        let params = [Param::new("a", 0.0), Param::new("b", 0.0)];
        let fit = minimize(&params, |p| vec![p[0] - 1.0, p[1] - 2.0], &LmOptions::default()).unwrap();
        assert!(fit.stderr("a").is_none());
        assert!(fit.redchi.is_nan());
    }

    #[test]
    fn rejects_non_finite_start() {
        let params = [Param::new("a", f64::NAN)];
        assert!(minimize(&params, |p| vec![p[0]], &LmOptions::default()).is_err());
    }
}
