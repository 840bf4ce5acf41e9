//! Implied volatility solving
//!
//! Newton-Raphson on the Black-Scholes price, seeded by moneyness (or the
//! last solved IV for the contract). When vega collapses near the wings the
//! solver falls back to Brent bracketing over the full volatility range.

use crate::greeks::black_scholes as bs;
use arka_core::OptionKind;
use thiserror::Error;

/// Volatility search bounds.
pub const MIN_VOL: f64 = 0.01;
pub const MAX_VOL: f64 = 3.0;

/// Below this (per-1%) vega Newton steps explode; switch to Brent.
const MIN_VEGA_THRESHOLD: f64 = 1e-5;

#[derive(Debug, Error, PartialEq)]
pub enum IvError {
    #[error("not calculable: {0}")]
    NotCalculable(&'static str),
    #[error("no convergence after {iterations} iterations, residual {residual}")]
    NoConvergence { iterations: u32, residual: f64 },
    #[error("market price outside attainable range")]
    NoBracket,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvSolution {
    pub sigma: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct IvSolver {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for IvSolver {
    fn default() -> Self {
        Self { tolerance: 1e-6, max_iterations: 100 }
    }
}

impl IvSolver {
    pub fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self { tolerance, max_iterations }
    }

    /// Reject inputs Newton cannot work with. A market price below 99% of
    /// intrinsic is stale or crossed and has no implied volatility.
    pub fn is_calculable(
        kind: OptionKind,
        spot: f64,
        strike: f64,
        t: f64,
        market_price: f64,
    ) -> Result<(), IvError> {
        if t <= 0.0 {
            return Err(IvError::NotCalculable("expired"));
        }
        if spot <= 0.0 {
            return Err(IvError::NotCalculable("no underlying price"));
        }
        if strike <= 0.0 {
            return Err(IvError::NotCalculable("bad strike"));
        }
        if market_price <= 0.0 {
            return Err(IvError::NotCalculable("no option price"));
        }
        if market_price < bs::intrinsic(kind, spot, strike) * 0.99 {
            return Err(IvError::NotCalculable("price below intrinsic"));
        }
        Ok(())
    }

    /// Moneyness-aware starting point when no prior IV is cached. Wing
    /// strikes and short-dated contracts start higher.
    pub fn initial_guess(spot: f64, strike: f64, t: f64) -> f64 {
        let m = (spot / strike).ln().abs();
        let mut guess = if m > 0.2 {
            0.30 + m * 0.5
        } else if m > 0.1 {
            0.25
        } else {
            0.20
        };
        let days = t * 365.0;
        if days < 7.0 {
            guess *= 1.5;
        } else if days < 30.0 {
            guess *= 1.2;
        }
        guess.clamp(MIN_VOL, MAX_VOL)
    }

    /// Solve for the volatility pricing `market_price`.
    pub fn solve(
        &self,
        kind: OptionKind,
        spot: f64,
        strike: f64,
        t: f64,
        rate: f64,
        market_price: f64,
        seed: Option<f64>,
    ) -> Result<IvSolution, IvError> {
        Self::is_calculable(kind, spot, strike, t, market_price)?;

        let mut sigma =
            seed.unwrap_or_else(|| Self::initial_guess(spot, strike, t)).clamp(MIN_VOL, MAX_VOL);
        let mut diff = 0.0;

        for i in 0..self.max_iterations {
            let g = bs::greeks(kind, spot, strike, t, rate, sigma);
            diff = g.price - market_price;
            if diff.abs() < self.tolerance {
                return Ok(IvSolution { sigma, iterations: i });
            }
            if g.vega < MIN_VEGA_THRESHOLD {
                return self.brent(kind, spot, strike, t, rate, market_price, i);
            }
            // vega is per 1%; scale back to dPrice/dSigma
            let next = (sigma - diff / (g.vega * 100.0)).clamp(MIN_VOL, MAX_VOL);
            if (next - sigma).abs() < self.tolerance * 0.01 {
                // A stalled step at a clamp bound is not convergence.
                if diff.abs() < self.tolerance * 100.0 {
                    return Ok(IvSolution { sigma: next, iterations: i });
                }
                return Err(IvError::NoConvergence { iterations: i, residual: diff });
            }
            sigma = next;
        }

        // Close enough counts: the residual is still far inside the spread.
        if diff.abs() < self.tolerance * 100.0 {
            return Ok(IvSolution { sigma, iterations: self.max_iterations });
        }
        Err(IvError::NoConvergence { iterations: self.max_iterations, residual: diff })
    }

    /// Brent root search on `price(sigma) - market_price` over the full
    /// volatility range. Inverse quadratic interpolation when the three
    /// points are distinct, secant otherwise, bisection as the safeguard.
    fn brent(
        &self,
        kind: OptionKind,
        spot: f64,
        strike: f64,
        t: f64,
        rate: f64,
        market_price: f64,
        newton_iters: u32,
    ) -> Result<IvSolution, IvError> {
        let f = |sigma: f64| bs::price(kind, spot, strike, t, rate, sigma) - market_price;

        let mut a = MIN_VOL;
        let mut b = MAX_VOL;
        let mut fa = f(a);
        let mut fb = f(b);
        if fa * fb > 0.0 {
            return Err(IvError::NoBracket);
        }
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let mut c = a;
        let mut fc = fa;
        let mut d = b - a;
        let mut bisected = true;

        for i in 0..self.max_iterations {
            if fb.abs() < self.tolerance {
                return Ok(IvSolution { sigma: b, iterations: newton_iters + i });
            }
            let mut s = if (fa - fc).abs() > f64::EPSILON && (fb - fc).abs() > f64::EPSILON {
                // inverse quadratic interpolation
                a * fb * fc / ((fa - fb) * (fa - fc))
                    + b * fa * fc / ((fb - fa) * (fb - fc))
                    + c * fa * fb / ((fc - fa) * (fc - fb))
            } else {
                // secant
                b - fb * (b - a) / (fb - fa)
            };

            let mid = (3.0 * a + b) / 4.0;
            let out_of_range = !((s > mid.min(b)) && (s < mid.max(b)));
            let step_too_small = if bisected {
                (s - b).abs() >= (b - c).abs() / 2.0
            } else {
                (s - b).abs() >= (c - d).abs() / 2.0
            };
            if out_of_range || step_too_small {
                s = (a + b) / 2.0;
                bisected = true;
            } else {
                bisected = false;
            }

            let fs = f(s);
            d = c;
            c = b;
            fc = fb;
            if fa * fs < 0.0 {
                b = s;
                fb = fs;
            } else {
                a = s;
                fa = fs;
            }
            if fa.abs() < fb.abs() {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut fa, &mut fb);
            }
        }

        if fb.abs() < self.tolerance * 100.0 {
            return Ok(IvSolution { sigma: b, iterations: newton_iters + self.max_iterations });
        }
        Err(IvError::NoConvergence {
            iterations: newton_iters + self.max_iterations,
            residual: fb,
        })
    }
}
