//! Black-Scholes closed forms
//!
//! Conventions used throughout the greeks pipeline: vega is per one
//! percentage point of volatility (the analytic vega divided by 100),
//! theta is per calendar day (the annual rate divided by 365), time is in
//! years. Expired or zero-vol inputs collapse to intrinsic value with a
//! hard delta.

use arka_core::OptionKind;

/// Standard normal CDF via the complementary error function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal density.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Full greek set for one contract at one volatility.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptionGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Per 1% volatility move.
    pub vega: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1% rate move.
    pub rho: f64,
}

pub fn intrinsic(kind: OptionKind, spot: f64, strike: f64) -> f64 {
    match kind {
        OptionKind::Call => (spot - strike).max(0.0),
        OptionKind::Put => (strike - spot).max(0.0),
    }
}

fn d1(spot: f64, strike: f64, t: f64, rate: f64, sigma: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Theoretical price; degenerate inputs price at intrinsic.
pub fn price(kind: OptionKind, spot: f64, strike: f64, t: f64, rate: f64, sigma: f64) -> f64 {
    if t <= 0.0 || sigma <= 0.0 {
        return intrinsic(kind, spot, strike);
    }
    let d1 = d1(spot, strike, t, rate, sigma);
    let d2 = d1 - sigma * t.sqrt();
    let df = (-rate * t).exp();
    match kind {
        OptionKind::Call => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionKind::Put => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// Price and greeks at one volatility.
pub fn greeks(
    kind: OptionKind,
    spot: f64,
    strike: f64,
    t: f64,
    rate: f64,
    sigma: f64,
) -> OptionGreeks {
    if t <= 0.0 || sigma <= 0.0 {
        let delta = match kind {
            OptionKind::Call if spot > strike => 1.0,
            OptionKind::Put if spot < strike => -1.0,
            _ => 0.0,
        };
        return OptionGreeks {
            price: intrinsic(kind, spot, strike),
            delta,
            ..Default::default()
        };
    }

    let sqrt_t = t.sqrt();
    let d1 = d1(spot, strike, t, rate, sigma);
    let d2 = d1 - sigma * sqrt_t;
    let df = (-rate * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let (price, delta, theta_annual, rho) = match kind {
        OptionKind::Call => {
            let p = spot * norm_cdf(d1) - strike * df * norm_cdf(d2);
            let th = -spot * pdf_d1 * sigma / (2.0 * sqrt_t) - rate * strike * df * norm_cdf(d2);
            let rho = strike * t * df * norm_cdf(d2);
            (p, norm_cdf(d1), th, rho)
        }
        OptionKind::Put => {
            let p = strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1);
            let th = -spot * pdf_d1 * sigma / (2.0 * sqrt_t) + rate * strike * df * norm_cdf(-d2);
            let rho = -strike * t * df * norm_cdf(-d2);
            (p, norm_cdf(d1) - 1.0, th, rho)
        }
    };

    OptionGreeks {
        price,
        delta,
        gamma: pdf_d1 / (spot * sigma * sqrt_t),
        vega: spot * sqrt_t * pdf_d1 / 100.0,
        theta: theta_annual / 365.0,
        rho: rho / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_cdf_symmetry() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((norm_cdf(1.0) + norm_cdf(-1.0) - 1.0).abs() < 1e-12);
        assert!((norm_cdf(1.0) - 0.841_344_746).abs() < 1e-6);
    }

    #[test]
    fn test_put_call_parity() {
        let (s, k, t, r, sigma) = (22000.0, 22100.0, 30.0 / 252.0, 0.065, 0.18);
        let call = price(OptionKind::Call, s, k, t, r, sigma);
        let put = price(OptionKind::Put, s, k, t, r, sigma);
        // C - P = S - K e^{-rT}
        let parity = s - k * (-r * t).exp();
        assert!((call - put - parity).abs() < 1e-6);
    }

    #[test]
    fn test_atm_call_delta_near_half() {
        let g = greeks(OptionKind::Call, 100.0, 100.0, 0.25, 0.0, 0.20);
        assert!(g.delta > 0.5 && g.delta < 0.55);
        assert!(g.gamma > 0.0);
        assert!(g.vega > 0.0);
        assert!(g.theta < 0.0);
    }

    #[test]
    fn test_rho_signs() {
        let (s, k, t, r, sigma) = (100.0, 100.0, 0.25, 0.05, 0.20);
        let call = greeks(OptionKind::Call, s, k, t, r, sigma);
        let put = greeks(OptionKind::Put, s, k, t, r, sigma);
        assert!(call.rho > 0.0);
        assert!(put.rho < 0.0);
        // rho(call) - rho(put) = K t e^{-rt}, scaled per 1%
        let parity = k * t * (-r * t).exp() / 100.0;
        assert!((call.rho - put.rho - parity).abs() < 1e-9);
    }

    #[test]
    fn test_expired_collapses_to_intrinsic() {
        let g = greeks(OptionKind::Call, 110.0, 100.0, 0.0, 0.065, 0.2);
        assert_eq!(g.price, 10.0);
        assert_eq!(g.delta, 1.0);
        assert_eq!(g.vega, 0.0);

        let g = greeks(OptionKind::Put, 110.0, 100.0, 0.0, 0.065, 0.2);
        assert_eq!(g.price, 0.0);
        assert_eq!(g.delta, 0.0);
    }

    #[test]
    fn test_deep_itm_call_delta() {
        let g = greeks(OptionKind::Call, 150.0, 100.0, 0.1, 0.065, 0.2);
        assert!(g.delta > 0.99);
    }
}
