/// Symbol for the handful of currencies we label specially; others print
/// their ISO code followed by a space.
fn currency_prefix(currency: &str) -> String {
    match currency {
        "EUR" => "€".to_string(),
        "USD" => "$".to_string(),
        "GBP" => "£".to_string(),
        other => format!("{other} "),
    }
}

fn group_thousands(int_part: &str) -> String {
    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    with_commas.chars().rev().collect()
}

/// Amount with thousands separators, rounded to cents: -€1,234.56
pub fn money(val: f64, currency: &str) -> String {
    let negative = val < 0.0 && format!("{:.2}", val.abs()) != "0.00";
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let sign = if negative { "-" } else { "" };
    format!("{sign}{}{}.{dec_part}", currency_prefix(currency), group_thousands(int_part))
}

/// One-decimal percentage: 80.0%
pub fn percent(val: f64) -> String {
    if val.is_finite() {
        format!("{val:.1}%")
    } else {
        "n/a".to_string()
    }
}

/// Fixed-width text bar for a 0..100+ percentage.
pub fn bar(percentage: f64, width: usize) -> String {
    let filled = if percentage.is_finite() {
        ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize
    } else {
        width
    };
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}
