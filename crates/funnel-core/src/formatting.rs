use crate::metric::Metric;

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use funnel_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by a tiny epsilon so exact binary midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // "0.50" -> ".50"
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format an integer count with thousands separators.
///
/// ```
/// use funnel_core::formatting::format_count;
///
/// assert_eq!(format_count(1_250_000), "1,250,000");
/// ```
pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

/// Format a monetary amount with two decimal places and thousands separators.
///
/// ```
/// use funnel_core::formatting::format_currency;
///
/// assert_eq!(format_currency(1234.56), "$1,234.56");
/// assert_eq!(format_currency(-9.99), "$-9.99");
/// ```
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("$-{}", format_number(amount.abs(), 2))
    } else {
        format!("${}", format_number(amount, 2))
    }
}

/// Format a `0..=1` ratio as a percentage.
///
/// ```
/// use funnel_core::formatting::format_percent;
///
/// assert_eq!(format_percent(0.05, 1), "5.0%");
/// assert_eq!(format_percent(190.0 / 550.0, 2), "34.55%");
/// ```
pub fn format_percent(ratio: f64, decimals: u32) -> String {
    format!("{}%", format_number(ratio * 100.0, decimals))
}

/// Render a ratio metric as a percentage, or `n/a (<reason>)` when undefined.
pub fn format_metric_percent(metric: &Metric, decimals: u32) -> String {
    match metric {
        Metric::Defined { value } => format_percent(*value, decimals),
        Metric::Undefined { reason } => format!("n/a ({reason})"),
    }
}

/// Render a plain-valued metric (e.g. a mean), or `n/a (<reason>)`.
pub fn format_metric_value(metric: &Metric, decimals: u32) -> String {
    match metric {
        Metric::Defined { value } => format_number(*value, decimals),
        Metric::Undefined { reason } => format!("n/a ({reason})"),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = s.len() % 3;
    for (i, c) in s.chars().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
