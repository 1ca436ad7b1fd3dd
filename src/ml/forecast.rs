/*!
 * # Demand Forecasting
 *
 * Short-horizon forecast used by the tactical planner: a recent-week
 * moving average, a trend term from the difference between the most
 * recent week and the week before it, and a weekday/weekend seasonal
 * multiplier applied to the trend projection. Deliberately simple; the
 * planner re-forecasts every cycle so errors do not compound far.
 */

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Seasonal multiplier for Saturday and Sunday.
pub const WEEKEND_FACTOR: f64 = 1.2;

/// Seasonal multiplier for weekdays.
pub const WEEKDAY_FACTOR: f64 = 0.9;

/// Flat forecast level used when no history exists at all.
const NO_HISTORY_LEVEL: f64 = 10.0;

/// Forecasts daily demand for `horizon` days starting at `start`.
///
/// `history` is ordered oldest to newest, one entry per day. With fewer
/// than three observations the forecast is flat at the historical mean
/// (floored at one unit). The trend term only activates once more than
/// a week of history is available within the trailing two-week window.
pub fn forecast_demand(history: &[f64], horizon: usize, start: NaiveDate) -> Vec<f64> {
    if horizon == 0 {
        return Vec::new();
    }

    if history.len() < 3 {
        let level = if history.is_empty() {
            NO_HISTORY_LEVEL
        } else {
            mean(history).max(1.0)
        };
        return vec![level; horizon];
    }

    let window_start = history.len().saturating_sub(14);
    let window = &history[window_start..];
    let trend = if window.len() > 7 {
        let split = window.len() - 7;
        mean(&window[split..]) - mean(&window[..split])
    } else {
        0.0
    };

    let base_start = history.len().saturating_sub(7);
    let base = mean(&history[base_start..]);

    (0..horizon)
        .map(|i| {
            let date = start + Duration::days(i as i64);
            let seasonal = if is_weekend(date.weekday()) {
                WEEKEND_FACTOR
            } else {
                WEEKDAY_FACTOR
            };
            (base + trend * i as f64 * seasonal).max(0.0)
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        // 2024-06-03 is a Monday.
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn empty_history_gives_flat_default() {
        let forecast = forecast_demand(&[], 5, monday());
        assert_eq!(forecast, vec![NO_HISTORY_LEVEL; 5]);
    }

    #[test]
    fn short_history_is_flat_at_mean() {
        let forecast = forecast_demand(&[4.0, 6.0], 3, monday());
        assert_eq!(forecast, vec![5.0; 3]);
    }

    #[test]
    fn short_history_floors_at_one_unit() {
        let forecast = forecast_demand(&[0.0, 0.0], 2, monday());
        assert_eq!(forecast, vec![1.0; 2]);
    }

    #[test]
    fn flat_history_projects_weekly_average() {
        let history = vec![10.0; 14];
        let forecast = forecast_demand(&history, 7, monday());
        // Zero trend, so the seasonal multiplier never engages.
        for value in &forecast {
            assert!((value - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rising_history_produces_positive_trend() {
        // Prior week averages 10, most recent week averages 20.
        let mut history = vec![10.0; 7];
        history.extend(vec![20.0; 7]);
        let forecast = forecast_demand(&history, 7, monday());
        // Day 0 carries no trend contribution; later days grow.
        assert!((forecast[0] - 20.0).abs() < 1e-9);
        assert!(forecast[6] > forecast[0]);
    }

    #[test]
    fn weekend_scales_trend_contribution() {
        let mut history = vec![10.0; 7];
        history.extend(vec![17.0; 7]);
        // trend = 7; starting Monday, index 5 is Saturday and index 4 is Friday.
        let forecast = forecast_demand(&history, 7, monday());
        let friday = 17.0 + 7.0 * 4.0 * WEEKDAY_FACTOR;
        let saturday = 17.0 + 7.0 * 5.0 * WEEKEND_FACTOR;
        assert!((forecast[4] - friday).abs() < 1e-9);
        assert!((forecast[5] - saturday).abs() < 1e-9);
    }

    #[test]
    fn falling_demand_never_goes_negative() {
        let mut history = vec![50.0; 7];
        history.extend(vec![5.0; 7]);
        let forecast = forecast_demand(&history, 14, monday());
        assert!(forecast.iter().all(|v| *v >= 0.0));
        assert_eq!(forecast[13], 0.0);
    }

    #[test]
    fn horizon_zero_is_empty() {
        assert!(forecast_demand(&[1.0; 20], 0, monday()).is_empty());
    }
}
