//! Hex colour parsing for the field tint.
//!
//! Colours arrive as user-facing strings (`"#3b82f6"`, `"3B82F6"`). The
//! strict entry point is [`hex_to_rgb`]; the renderer itself goes through
//! [`resolve_color`], which never fails and substitutes [`DEFAULT_COLOR`] so a
//! typo in a config file cannot push `NaN` channels into the fragment program.

use tracing::warn;

/// Colour used whenever the caller does not provide one or provides garbage.
pub const DEFAULT_COLOR: &str = "#3b82f6";

/// Normalised RGB of [`DEFAULT_COLOR`].
pub const DEFAULT_RGB: [f32; 3] = [59.0 / 255.0, 130.0 / 255.0, 246.0 / 255.0];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidColorError {
    #[error("colour '{input}' must have exactly 6 hex digits (found {found})")]
    Length { input: String, found: usize },
    #[error("colour '{input}' contains non-hex character '{character}'")]
    NonHex { input: String, character: char },
}

/// Parses a `RRGGBB` string, with an optional leading `#`, into channels in `[0, 1]`.
pub fn hex_to_rgb(input: &str) -> Result<[f32; 3], InvalidColorError> {
    let digits = input.trim();
    let digits = digits.strip_prefix('#').unwrap_or(digits);

    let found = digits.chars().count();
    if found != 6 {
        return Err(InvalidColorError::Length {
            input: input.to_string(),
            found,
        });
    }
    if let Some(character) = digits.chars().find(|ch| !ch.is_ascii_hexdigit()) {
        return Err(InvalidColorError::NonHex {
            input: input.to_string(),
            character,
        });
    }

    let mut rgb = [0.0_f32; 3];
    for (index, channel) in rgb.iter_mut().enumerate() {
        let pair = &digits[index * 2..index * 2 + 2];
        // Both digits were checked above, so the radix parse cannot fail.
        let value = u8::from_str_radix(pair, 16).unwrap_or_default();
        *channel = f32::from(value) / 255.0;
    }
    Ok(rgb)
}

/// Same as [`hex_to_rgb`] but recovers from malformed input with [`DEFAULT_RGB`].
pub fn resolve_color(input: &str) -> [f32; 3] {
    match hex_to_rgb(input) {
        Ok(rgb) => rgb,
        Err(err) => {
            warn!(error = %err, fallback = DEFAULT_COLOR, "invalid colour; using default");
            DEFAULT_RGB
        }
    }
}
