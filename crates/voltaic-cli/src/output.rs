//! Fixed-width table printing for analysis results.

/// Print a table header followed by a separator rule.
pub fn header(columns: &[&str]) {
    for col in columns {
        print!("{col:>14}");
    }
    println!();
    println!("{}", "-".repeat(14 * columns.len()));
}

/// Print one row of engineering-notation values.
pub fn row(values: &[f64]) {
    for v in values {
        print!("{v:>14.6e}");
    }
    println!();
}

/// Print a labeled scalar result.
pub fn scalar(label: &str, value: f64, unit: &str) {
    println!("{label:<24} {value:>14.6} {unit}");
}
