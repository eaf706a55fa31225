use chrono::NaiveDate;

pub mod logging;

/// Display convention for monetary amounts: two decimals, space-separated
/// thousands, currency suffix (e.g. "2 400,00 DH").
pub fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }

    format!("{}{},{:02} DH", sign, grouped, frac)
}

/// Whole days from `from` until `until` (negative when `until` is past).
pub fn days_until(from: NaiveDate, until: NaiveDate) -> i64 {
    (until - from).num_days()
}
