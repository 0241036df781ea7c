//! Plain-text rendering of a recommendation for the terminal

use crate::optimizer::{Advice, ImprovementForecast, Recommendation, TravelWindow};

/// How many ranked windows the text report lists
const LISTED_WINDOWS: usize = 5;

/// Short headline for an advice value
pub fn advice_headline(advice: Advice) -> &'static str {
    match advice {
        Advice::LeaveNow => "Leave now",
        Advice::LeaveEarlier => "Leave earlier",
        Advice::WaitUntil => "Wait",
        Advice::Proceed => "Go as planned",
        Advice::InsufficientData => "No forecast available",
    }
}

/// Renders the full report: headline, current conditions, trend and the best windows
pub fn render_text(rec: &Recommendation) -> String {
    let mut lines = vec![
        format!("{}: {}", advice_headline(rec.advice), rec.reason),
        String::new(),
        "Planned departure".to_string(),
        build_window_line(&rec.current_conditions),
    ];

    if rec.beyond_forecast_coverage {
        lines.push(format!(
            "  ({} of {} route points had no forecast)",
            rec.current_conditions.unresolved_points,
            rec.current_conditions.resolved_points + rec.current_conditions.unresolved_points
        ));
    }

    if rec.stale_forecasts > 0 {
        lines.push(format!(
            "  (provider unavailable: {} expired forecasts were used)",
            rec.stale_forecasts
        ));
    }

    lines.push(String::new());
    lines.push(trend_line(&rec.improvement_forecast));

    if !rec.windows.is_empty() {
        lines.push(String::new());
        lines.push("Best departure windows".to_string());
        lines.extend(rec.windows.iter().take(LISTED_WINDOWS).map(build_window_line));
    }

    lines.join("\n")
}

fn build_window_line(window: &TravelWindow) -> String {
    let time_str = window.departure_time.format("%H:%M").to_string();
    let risk_str = window.risk_level.label().to_uppercase();
    let rain_str = format!("Rain: {:.1}mm/h", window.max_rain_intensity);
    let wind_str = format!("Wind: {:.0}km/h", window.max_wind_speed);

    let mut line = format!(
        "  {:<7}{:<8}{:<16}{:<14}{}",
        time_str,
        risk_str,
        rain_str,
        wind_str,
        window.primary_risk_factor.label()
    );
    if window.low_confidence {
        line.push_str(" (low confidence)");
    }
    line
}

fn trend_line(trend: &ImprovementForecast) -> String {
    match trend {
        ImprovementForecast::Improving {
            at,
            max_rain_intensity,
        } => format!(
            "Trend: improving from {} (peak rain {:.1}mm/h)",
            at.format("%H:%M"),
            max_rain_intensity
        ),
        ImprovementForecast::Worsening {
            at,
            max_rain_intensity,
        } => format!(
            "Trend: worsening from {} (peak rain {:.1}mm/h)",
            at.format("%H:%M"),
            max_rain_intensity
        ),
        ImprovementForecast::Stable => "Trend: stable".to_string(),
    }
}
