/// Monetary amounts are carried as integer cents end to end.
///
/// Callers that price in floating-point dollars convert at the boundary via
/// [`cents_from_dollars`]; inside the core every sum and comparison is exact
/// integer arithmetic.
pub type Cents = i64;

/// Convert a dollar amount into cents, rounding to the nearest cent.
pub fn cents_from_dollars(dollars: f64) -> Cents {
    (dollars * 100.0).round() as Cents
}

/// Format cents as a dollar string for logs and messages.
pub fn format_cents(cents: Cents) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

/// Apply a fractional rate to an amount, rounding to the nearest cent.
pub fn apply_rate(cents: Cents, rate: f64) -> Cents {
    (cents as f64 * rate).round() as Cents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollar_conversion_rounds_to_cent() {
        assert_eq!(cents_from_dollars(99.99), 9999);
        assert_eq!(cents_from_dollars(0.105), 11);
        assert_eq!(cents_from_dollars(40.0), 4000);
    }

    #[test]
    fn test_rate_application() {
        // 8% tax on $40.00
        assert_eq!(apply_rate(4000, 0.08), 320);
        assert_eq!(apply_rate(0, 0.08), 0);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_cents(4900), "$49.00");
        assert_eq!(format_cents(5), "$0.05");
    }
}
