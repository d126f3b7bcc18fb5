//! Axis, badge and tooltip label formatting.

/// Fixed-decimal label.
pub fn fixed(v: f64, decimals: usize) -> String {
    format!("{v:.decimals$}")
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(v: u64) -> String {
    let digits = v.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed value, thousands shortened to `K` with `k_decimals` places.
///
/// `12000 -> "+12K"`, `-850 -> "-850"`.
pub fn signed_abbrev(v: f64, k_decimals: usize) -> String {
    let sign = if v >= 0.0 { "+" } else { "" };
    if v.abs() >= 1000.0 {
        format!("{sign}{:.k_decimals$}K", v / 1000.0)
    } else {
        format!("{sign}{v:.0}")
    }
}

/// Signed percentage with two decimals.
pub fn signed_pct(v: f64) -> String {
    let sign = if v >= 0.0 { "+" } else { "" };
    format!("{sign}{v:.2}%")
}
