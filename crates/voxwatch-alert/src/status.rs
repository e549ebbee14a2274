//! Status token resolution.
//!
//! Tokens are matched exactly (case-insensitive) against a small table
//! first. Hex colors outside the table are classified by channel banding;
//! anything left over is [`StatusLevel::Unknown`].

use voxwatch_core::StatusLevel;

const EXACT: &[(&str, StatusLevel)] = &[
    ("#00ff00", StatusLevel::Operational),
    ("green", StatusLevel::Operational),
    ("#ffff00", StatusLevel::Warning),
    ("yellow", StatusLevel::Warning),
    ("#ffa500", StatusLevel::Degraded),
    ("orange", StatusLevel::Degraded),
    ("#ff0000", StatusLevel::Critical),
    ("red", StatusLevel::Critical),
    ("#808080", StatusLevel::Offline),
    ("gray", StatusLevel::Offline),
    ("grey", StatusLevel::Offline),
];

/// Map a color-like token to a severity.
pub fn resolve_status(token: &str) -> StatusLevel {
    let token = token.trim().to_ascii_lowercase();

    if let Some(status) = exact_match(&token) {
        return status;
    }

    parse_rgb(&token)
        .and_then(classify_rgb)
        .unwrap_or(StatusLevel::Unknown)
}

fn exact_match(token: &str) -> Option<StatusLevel> {
    EXACT
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, status)| *status)
}

/// Band an RGB triple. First matching band wins.
fn classify_rgb((r, g, b): (u8, u8, u8)) -> Option<StatusLevel> {
    if g >= 200 && r < 80 && b < 80 {
        return Some(StatusLevel::Operational);
    }
    if r >= 200 && g < 80 && b < 80 {
        return Some(StatusLevel::Critical);
    }
    if r >= 200 && g >= 200 && b < 80 {
        return Some(StatusLevel::Warning);
    }
    if r >= 200 && (100..=200).contains(&g) && b < 80 {
        return Some(StatusLevel::Degraded);
    }

    let spread = r.max(g).max(b) - r.min(g).min(b);
    if spread < 30 && (80..=180).contains(&r) {
        return Some(StatusLevel::Offline);
    }
    None
}

/// Parse `#rrggbb` or `#rgb`.
fn parse_rgb(token: &str) -> Option<(u8, u8, u8)> {
    let hex = token.strip_prefix('#')?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();

    match hex.len() {
        6 => Some((channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        3 => {
            let expand = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
            Some((expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_table() {
        assert_eq!(resolve_status("#00FF00"), StatusLevel::Operational);
        assert_eq!(resolve_status("#FF0000"), StatusLevel::Critical);
        assert_eq!(resolve_status("#808080"), StatusLevel::Offline);
        assert_eq!(resolve_status("#FFA500"), StatusLevel::Degraded);
        assert_eq!(resolve_status("#ffff00"), StatusLevel::Warning);
        assert_eq!(resolve_status("Red"), StatusLevel::Critical);
        assert_eq!(resolve_status("grey"), StatusLevel::Offline);
        assert_eq!(resolve_status(" green "), StatusLevel::Operational);
    }

    #[test]
    fn test_rgb_banding() {
        assert_eq!(resolve_status("#10E020"), StatusLevel::Operational);
        assert_eq!(resolve_status("#E01010"), StatusLevel::Critical);
        assert_eq!(resolve_status("#F0F040"), StatusLevel::Warning);
        assert_eq!(resolve_status("#FF8C00"), StatusLevel::Degraded);
        assert_eq!(resolve_status("#777777"), StatusLevel::Offline);
        assert_eq!(resolve_status("#f00"), StatusLevel::Critical);
    }

    #[test]
    fn test_band_boundaries() {
        // green of exactly 200 is Warning, not Degraded
        assert_eq!(resolve_status("#FFC800"), StatusLevel::Warning);
        assert_eq!(resolve_status("#FF6400"), StatusLevel::Degraded);
        assert_eq!(resolve_status("#FF6300"), StatusLevel::Unknown);
        // gray outside the red window
        assert_eq!(resolve_status("#4A4A4A"), StatusLevel::Unknown);
        assert_eq!(resolve_status("#C0C0C0"), StatusLevel::Unknown);
    }

    #[test]
    fn test_unknown_tokens() {
        assert_eq!(resolve_status("#123456"), StatusLevel::Unknown);
        assert_eq!(resolve_status("#0000FF"), StatusLevel::Unknown);
        assert_eq!(resolve_status("purple"), StatusLevel::Unknown);
        assert_eq!(resolve_status(""), StatusLevel::Unknown);
        assert_eq!(resolve_status("#12345"), StatusLevel::Unknown);
        assert_eq!(resolve_status("#GGGGGG"), StatusLevel::Unknown);
    }
}
