use crate::errors::{EngineError, EngineResult};

/// Golden ratio complement, (3 - sqrt(5)) / 2.
const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Bounded scalar minimization (Brent's method without derivatives).
///
/// Alternates parabolic interpolation through the three best points with
/// golden-section steps, staying inside `[lower, upper]`. Converges for
/// any unimodal objective on the bracket.
#[derive(Debug, Clone, Copy)]
pub struct BoundedMinimizer {
    /// Absolute tolerance on the abscissa
    pub x_tolerance: f64,
    /// Safety cap; unimodal objectives converge far sooner
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub fx: f64,
    pub iterations: usize,
}

impl Default for BoundedMinimizer {
    fn default() -> Self {
        Self {
            x_tolerance: 1e-10,
            max_iterations: 500,
        }
    }
}

impl BoundedMinimizer {
    pub fn minimize<F>(&self, f: F, lower: f64, upper: f64) -> EngineResult<Minimum>
    where
        F: Fn(f64) -> f64,
    {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(EngineError::Domain(format!(
                "invalid minimization bracket [{lower}, {upper}]"
            )));
        }

        let (mut a, mut b) = (lower, upper);
        let mut x = a + GOLDEN * (b - a);
        let (mut w, mut v) = (x, x);
        let mut fx = f(x);
        let (mut fw, mut fv) = (fx, fx);
        let mut d: f64 = 0.0;
        let mut e: f64 = 0.0;

        let sqrt_eps = f64::EPSILON.sqrt();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let xm = 0.5 * (a + b);
            let tol1 = sqrt_eps * x.abs() + self.x_tolerance / 3.0;
            let tol2 = 2.0 * tol1;

            if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
                break;
            }
            iterations += 1;

            let mut golden_step = true;
            if e.abs() > tol1 {
                // Parabola through x, w, v
                let r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                let e_prev = e;
                e = d;

                if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                    d = p / q;
                    let u = x + d;
                    // Keep the trial point away from the bracket ends
                    if (u - a) < tol2 || (b - u) < tol2 {
                        d = if xm >= x { tol1 } else { -tol1 };
                    }
                    golden_step = false;
                }
            }

            if golden_step {
                e = if x >= xm { a - x } else { b - x };
                d = GOLDEN * e;
            }

            let u = if d.abs() >= tol1 {
                x + d
            } else if d >= 0.0 {
                x + tol1
            } else {
                x - tol1
            };
            let fu = f(u);

            if fu <= fx {
                if u >= x {
                    a = x;
                } else {
                    b = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }

        Ok(Minimum { x, fx, iterations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_quadratic() {
        let m = BoundedMinimizer::default()
            .minimize(|x| (x - 1.3) * (x - 1.3) + 2.0, 0.0, 3.0)
            .unwrap();
        assert!((m.x - 1.3).abs() < 1e-7, "x={}", m.x);
        assert!((m.fx - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_kinked_absolute_value() {
        let m = BoundedMinimizer::default()
            .minimize(|x: f64| (x - 0.237).abs(), 0.01, 3.0)
            .unwrap();
        assert!((m.x - 0.237).abs() < 1e-8, "x={}", m.x);
    }

    #[test]
    fn test_minimum_at_bound() {
        let m = BoundedMinimizer::default()
            .minimize(|x| x, 0.01, 3.0)
            .unwrap();
        assert!((m.x - 0.01).abs() < 1e-6, "x={}", m.x);
        assert!(m.x >= 0.01);
    }

    #[test]
    fn test_bad_bracket() {
        assert!(BoundedMinimizer::default().minimize(|x| x, 3.0, 0.01).is_err());
        assert!(BoundedMinimizer::default().minimize(|x| x, f64::NAN, 1.0).is_err());
    }
}
