//! Dark dashboard palette.

pub const BG: &str = "#0d1117";
pub const PANEL_ALT: &str = "#1c2128";
pub const BORDER: &str = "rgba(148,163,184,.12)";
pub const TEXT: &str = "#e2e8f0";
pub const TEXT_DIM: &str = "#94a3b8";
pub const TEXT_MUTED: &str = "#64748b";

pub const GREEN: &str = "#22c55e";
pub const RED: &str = "#ef4444";
pub const AMBER: &str = "#f59e0b";
pub const BLUE: &str = "#3b82f6";
pub const CYAN: &str = "#06b6d4";
pub const PURPLE: &str = "#a78bfa";

pub const CANDLE_UP: &str = GREEN;
pub const CANDLE_DOWN: &str = RED;
pub const WICK: &str = "rgba(148,163,184,.4)";

pub const GRID: &str = "rgba(148,163,184,.06)";
pub const REFERENCE_LINE: &str = "rgba(148,163,184,.2)";
pub const CROSSHAIR: &str = "rgba(148,163,184,.3)";
pub const TOOLTIP_BG: &str = "rgba(22,27,34,.95)";

pub const RSI_LINE: &str = AMBER;
pub const RSI_OVERBOUGHT: &str = "rgba(239,68,68,.3)";
pub const RSI_OVERSOLD: &str = "rgba(34,197,94,.3)";

/// Line colours for the comparison chart, cycled by selection index.
pub const COMPARE_PALETTE: [&str; 6] = [GREEN, BLUE, AMBER, RED, PURPLE, CYAN];

/// Seasonal overlay colour per year label.
pub fn season_color(label: &str) -> &'static str {
    match label {
        "2021" => "#3b82f6",
        "2022" => "#8b5cf6",
        "2023" => "#ec4899",
        "2024" => "#f59e0b",
        "2025" => "#22c55e",
        "current" => "#f59e0b",
        "average" => TEXT,
        _ => TEXT_MUTED,
    }
}

/// `#rrggbb` -> `rgba(r,g,b,alpha)`; other colour syntaxes pass through.
pub fn tint(color: &str, alpha: f64) -> String {
    let hex = color.strip_prefix('#').filter(|h| h.len() == 6);
    let channels = hex.and_then(|h| {
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(h.get(range)?, 16).ok();
        Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
    });
    match channels {
        Some((r, g, b)) => format!("rgba({r},{g},{b},{alpha})"),
        None => color.to_string(),
    }
}
