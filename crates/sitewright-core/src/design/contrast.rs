//! WCAG contrast checks and deterministic color correction.
//!
//! Every color bound to an interactive role must reach [`MIN_CONTRAST`]
//! against white. Non-compliant colors are darkened by scaling each RGB
//! channel by [`DARKEN_FACTOR`] per step, at most [`MAX_STEPS`] times.
//! Correcting a compliant color returns it unchanged.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Minimum contrast ratio against white (WCAG AA, normal text).
pub const MIN_CONTRAST: f64 = 4.5;

/// Channel multiplier applied per darkening step.
pub const DARKEN_FACTOR: f64 = 0.95;

/// Darkening steps before giving up. 0.95^60 is below 5%, so the floor is
/// effectively black.
pub const MAX_STEPS: u32 = 60;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Parse `#rgb` or `#rrggbb` (leading `#` optional).
    pub fn parse(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// WCAG relative luminance in `0.0..=1.0`.
    pub fn relative_luminance(self) -> f64 {
        fn linear(channel: u8) -> f64 {
            let c = f64::from(channel) / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }

    fn scaled(self, factor: f64) -> Self {
        let scale = |c: u8| (f64::from(c) * factor).round().clamp(0.0, 255.0) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

/// Contrast ratio between two colors, in `1.0..=21.0`.
pub fn contrast_ratio(a: Rgb, b: Rgb) -> f64 {
    let (la, lb) = (a.relative_luminance(), b.relative_luminance());
    let (light, dark) = if la >= lb { (la, lb) } else { (lb, la) };
    (light + 0.05) / (dark + 0.05)
}

/// Contrast ratio of `color` against white.
pub fn contrast_against_white(color: Rgb) -> f64 {
    contrast_ratio(color, Rgb::WHITE)
}

/// Outcome of correcting one color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorCorrection {
    /// Input as given.
    pub original: String,
    /// Compliant `#rrggbb` value, or the original text when no change was needed.
    pub corrected: String,
    pub ratio_before: f64,
    pub ratio_after: f64,
    pub steps: u32,
}

impl ColorCorrection {
    pub fn changed(&self) -> bool {
        self.steps > 0
    }
}

/// Darken `hex` until it reaches [`MIN_CONTRAST`] against white.
///
/// Returns `None` for unparsable input. A compliant color comes back
/// unchanged (same text, zero steps), so the function is idempotent.
pub fn correct_color(hex: &str) -> Option<ColorCorrection> {
    let original = Rgb::parse(hex)?;
    let ratio_before = contrast_against_white(original);

    if ratio_before >= MIN_CONTRAST {
        return Some(ColorCorrection {
            original: hex.to_string(),
            corrected: hex.to_string(),
            ratio_before,
            ratio_after: ratio_before,
            steps: 0,
        });
    }

    let mut current = original;
    let mut steps = 0;
    // Scale from the original each step so rounding does not compound.
    while steps < MAX_STEPS && contrast_against_white(current) < MIN_CONTRAST {
        steps += 1;
        current = original.scaled(DARKEN_FACTOR.powi(steps as i32));
    }

    Some(ColorCorrection {
        original: hex.to_string(),
        corrected: current.to_hex(),
        ratio_before,
        ratio_after: contrast_against_white(current),
        steps,
    })
}

/// Replace every occurrence of the hex color `from` in `text` with `to`.
///
/// Matching ignores case and only hits whole color tokens, so `#f00` does
/// not match inside `#f00d12`. A parsable `from` matches both its `#rgb`
/// and `#rrggbb` spellings.
pub fn rewrite_hex(text: &str, from: &str, to: &str) -> String {
    let spellings = hex_spellings(from);
    if spellings.is_empty() {
        return text.to_string();
    }
    let alternatives: Vec<String> = spellings.iter().map(|s| regex::escape(s)).collect();
    let pattern = format!("(?i)#(?:{})([^0-9a-f]|$)", alternatives.join("|"));
    let Ok(re) = Regex::new(&pattern) else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &Captures<'_>| format!("{to}{}", &caps[1]))
        .into_owned()
}

/// Digit spellings of a color, longest first.
fn hex_spellings(hex: &str) -> Vec<String> {
    let Some(rgb) = Rgb::parse(hex) else {
        let digits = hex.trim().trim_start_matches('#');
        return if digits.is_empty() {
            Vec::new()
        } else {
            vec![digits.to_string()]
        };
    };
    let long = rgb.to_hex().trim_start_matches('#').to_string();
    let mut spellings = vec![long.clone()];
    let pairs = long.as_bytes().chunks(2);
    if pairs.clone().all(|pair| pair[0] == pair[1]) {
        spellings.push(pairs.map(|pair| char::from(pair[0])).collect());
    }
    spellings
}

/// Whether two hex strings name the same color.
pub fn same_color(a: &str, b: &str) -> bool {
    match (Rgb::parse(a), Rgb::parse(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        assert_eq!(Rgb::parse("#FF0000"), Some(Rgb { r: 255, g: 0, b: 0 }));
        assert_eq!(Rgb::parse("f00"), Some(Rgb { r: 255, g: 0, b: 0 }));
        assert_eq!(Rgb::parse("#12345"), None);
        assert_eq!(Rgb::parse("#zzzzzz"), None);
        assert_eq!(Rgb { r: 1, g: 171, b: 255 }.to_hex(), "#01abff");
    }

    #[test]
    fn test_known_ratios() {
        let black = Rgb::parse("#000000").unwrap();
        assert!((contrast_against_white(black) - 21.0).abs() < 1e-9);
        assert!((contrast_against_white(Rgb::WHITE) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pure_red_is_darkened_to_compliance() {
        let red = Rgb::parse("#ff0000").unwrap();
        assert!(contrast_against_white(red) < MIN_CONTRAST);

        let fix = correct_color("#ff0000").unwrap();
        assert!(fix.changed());
        assert_ne!(fix.corrected, "#ff0000");
        assert!(fix.ratio_after >= MIN_CONTRAST);
        let corrected = Rgb::parse(&fix.corrected).unwrap();
        assert!(contrast_against_white(corrected) >= MIN_CONTRAST);
        assert_eq!(corrected.g, 0);
        assert_eq!(corrected.b, 0);
    }

    #[test]
    fn test_correction_is_idempotent() {
        for hex in ["#ff0000", "#facc15", "#ffffff", "#22c55e", "#1d4ed8"] {
            let once = correct_color(hex).unwrap();
            let twice = correct_color(&once.corrected).unwrap();
            assert_eq!(twice.corrected, once.corrected, "{hex}");
            assert_eq!(twice.steps, 0);
        }
    }

    #[test]
    fn test_compliant_color_unchanged() {
        let fix = correct_color("#1D4ED8").unwrap();
        assert_eq!(fix.corrected, "#1D4ED8");
        assert!(!fix.changed());
    }

    #[test]
    fn test_white_reaches_threshold() {
        let fix = correct_color("#fff").unwrap();
        assert!(fix.ratio_after >= MIN_CONTRAST);
        assert!(fix.steps <= MAX_STEPS);
    }

    #[test]
    fn test_unparsable_color() {
        assert!(correct_color("tomato").is_none());
    }

    #[test]
    fn test_rewrite_hex_whole_tokens_case_insensitive() {
        let text = "primary: '#FF0000', border: #ff0000; other: #ff00001a; end #ff0000";
        let out = rewrite_hex(text, "#ff0000", "#e60000");
        assert_eq!(
            out,
            "primary: '#e60000', border: #e60000; other: #ff00001a; end #e60000"
        );

        let out = rewrite_hex("a:#f00;b:#f00d12", "#f00", "#e60000");
        assert_eq!(out, "a:#e60000;b:#f00d12");
    }

    #[test]
    fn test_rewrite_hex_matches_short_and_long_spellings() {
        let text = ":root{--primary:#ff0000} .cta{color:#F00} .x{color:#ff00001a}";
        let expected = ":root{--primary:#e60000} .cta{color:#e60000} .x{color:#ff00001a}";
        assert_eq!(rewrite_hex(text, "#f00", "#e60000"), expected);
        assert_eq!(rewrite_hex(text, "#FF0000", "#e60000"), expected);

        // no short form exists for this one
        assert_eq!(rewrite_hex("#fa0 #ffaa01", "#ffaa01", "#000000"), "#fa0 #000000");
    }

    #[test]
    fn test_same_color_across_spellings() {
        assert!(same_color("#f00", "#FF0000"));
        assert!(!same_color("#f00", "#ff0001"));
    }
}
