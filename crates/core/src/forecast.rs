use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    Idle,
    Safe,
    Warning,
    Critical,
    Unknown,
}

impl ForecastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }
}

/// One burn rate projected to the reset instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub burn_rate_per_min: f64,
    pub status: ForecastStatus,
    pub projected_total: f64,
    pub time_to_limit_minutes: Option<f64>,
    pub critical: bool,
}

impl Projection {
    fn unknown(current: f64) -> Self {
        Self {
            burn_rate_per_min: 0.0,
            status: ForecastStatus::Unknown,
            projected_total: if current.is_finite() { current } else { 0.0 },
            time_to_limit_minutes: None,
            critical: false,
        }
    }
}

/// Classifies a burn rate against the limit and the time left in the window.
///
/// Never divides by a zero rate and never emits non-finite numbers.
pub fn project(
    current: f64,
    limit: Option<f64>,
    rate_per_min: f64,
    time_remaining_min: f64,
) -> Projection {
    if !current.is_finite() || !rate_per_min.is_finite() || rate_per_min < 0.0 {
        return Projection::unknown(current);
    }
    let remaining = if time_remaining_min.is_finite() {
        time_remaining_min.max(0.0)
    } else {
        0.0
    };
    if rate_per_min == 0.0 {
        return Projection {
            burn_rate_per_min: 0.0,
            status: ForecastStatus::Idle,
            projected_total: current,
            time_to_limit_minutes: None,
            critical: false,
        };
    }

    let projected = current + rate_per_min * remaining;
    let limit = match limit {
        Some(limit) if limit.is_finite() && limit > 0.0 => limit,
        _ => {
            return Projection {
                burn_rate_per_min: rate_per_min,
                projected_total: projected,
                ..Projection::unknown(current)
            };
        }
    };

    if projected < limit {
        return Projection {
            burn_rate_per_min: rate_per_min,
            status: ForecastStatus::Safe,
            projected_total: projected,
            time_to_limit_minutes: Some((limit - current).max(0.0) / rate_per_min),
            critical: false,
        };
    }

    let time_to_limit = (limit - current).max(0.0) / rate_per_min;
    let critical = time_to_limit < remaining;
    Projection {
        burn_rate_per_min: rate_per_min,
        status: if critical {
            ForecastStatus::Critical
        } else {
            ForecastStatus::Warning
        },
        projected_total: projected,
        time_to_limit_minutes: Some(time_to_limit),
        critical,
    }
}

/// Slope of the ordinary least-squares fit of `values` against their index.
pub fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|x| (x as f64) * (x as f64)).sum();
    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denominator;
    if slope.is_finite() { slope } else { 0.0 }
}

pub fn format_minutes(minutes: f64) -> String {
    if !minutes.is_finite() || minutes < 0.0 {
        return "-".to_string();
    }
    if minutes < 60.0 {
        format!("{}m", minutes.round() as u64)
    } else if minutes < 1440.0 {
        format!("{:.1}h", minutes / 60.0)
    } else {
        format!("{:.1}d", minutes / 1440.0)
    }
}
