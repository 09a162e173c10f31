//! Significance tests for strategy experiments
//!
//! Normal approximations throughout: a pooled two-proportion z-test for rate
//! metrics and Welch's test for continuous ones. Good enough at the sample
//! sizes experiments are gated on; conservative below them.

use lead_engine_core::MetricKind;

/// Result of comparing one treatment arm to control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Two-tailed
    pub p_value: f64,
    /// Per-arm sample needed to detect the observed effect; `None` without one
    pub required_per_arm: Option<u32>,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance
pub fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Standard normal CDF (Abramowitz & Stegun 26.2.17)
pub fn normal_cdf(z: f64) -> f64 {
    let x = z.abs();
    let t = 1.0 / (1.0 + 0.2316419 * x);
    let d = 0.3989423 * (-x * x / 2.0).exp();
    let upper = d
        * t
        * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274))));
    if z >= 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

pub fn two_tailed_p(z: f64) -> f64 {
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Inverse standard normal CDF (Acklam's rational approximation)
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

fn critical_values(confidence_level: f64, power: f64) -> (f64, f64) {
    let alpha = 1.0 - confidence_level;
    (normal_quantile(1.0 - alpha / 2.0), normal_quantile(power))
}

fn ceil_count(n: f64) -> Option<u32> {
    (n.is_finite() && n > 0.0).then(|| n.ceil().min(u32::MAX as f64) as u32)
}

/// Pooled two-proportion z-test; observations are 0 or 1
pub fn two_proportion_test(
    control: &[f64],
    treatment: &[f64],
    confidence_level: f64,
    power: f64,
) -> Option<Comparison> {
    if control.is_empty() || treatment.is_empty() {
        return None;
    }
    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let p1 = mean(control);
    let p2 = mean(treatment);
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);

    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    let p_value = if se > 0.0 {
        two_tailed_p((p2 - p1) / se)
    } else {
        1.0
    };

    let delta = (p2 - p1).abs();
    let required_per_arm = if delta > 0.0 {
        let (z_alpha, z_beta) = critical_values(confidence_level, power);
        let a = z_alpha * (2.0 * pooled * (1.0 - pooled)).sqrt();
        let b = z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
        ceil_count((a + b).powi(2) / delta.powi(2))
    } else {
        None
    };

    Some(Comparison {
        p_value,
        required_per_arm,
    })
}

/// Welch's two-sample test with a normal approximation to the t tail
pub fn welch_test(
    control: &[f64],
    treatment: &[f64],
    confidence_level: f64,
    power: f64,
) -> Option<Comparison> {
    if control.len() < 2 || treatment.len() < 2 {
        return None;
    }
    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let mean1 = mean(control);
    let mean2 = mean(treatment);
    let var1 = variance(control, mean1);
    let var2 = variance(treatment, mean2);

    let se1 = var1 / n1;
    let se2 = var2 / n2;
    let se = (se1 + se2).sqrt();

    let p_value = if se > 0.0 {
        let t = (mean2 - mean1) / se;
        let df_denom = se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0);
        let df = if df_denom > 0.0 {
            (se1 + se2).powi(2) / df_denom
        } else {
            n1 + n2 - 2.0
        };
        // shrink t for small df; conservative against the true t tail
        two_tailed_p(t * (df / (df + 1.0)).sqrt())
    } else {
        1.0
    };

    let delta = (mean2 - mean1).abs();
    let required_per_arm = if delta > 0.0 {
        let (z_alpha, z_beta) = critical_values(confidence_level, power);
        let pooled_variance = (var1 + var2) / 2.0;
        ceil_count(2.0 * (z_alpha + z_beta).powi(2) * pooled_variance / delta.powi(2))
    } else {
        None
    };

    Some(Comparison {
        p_value,
        required_per_arm,
    })
}

/// Test matching the metric kind
pub fn compare(
    kind: MetricKind,
    control: &[f64],
    treatment: &[f64],
    confidence_level: f64,
    power: f64,
) -> Option<Comparison> {
    match kind {
        MetricKind::Rate => two_proportion_test(control, treatment, confidence_level, power),
        MetricKind::Continuous => welch_test(control, treatment, confidence_level, power),
    }
}
