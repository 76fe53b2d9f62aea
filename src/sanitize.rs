//! Text sanitization for generated documents.
//!
//! Every piece of text placed into a CSV cell or PDF line passes through
//! [`Sanitizer::sanitize`] first: NFKC normalization, removal of control
//! (Cc), format (Cf), and private-use (Co) characters plus Unicode
//! noncharacters, then a final re-check. Surrogates (Cs) cannot occur in a
//! Rust `char`.
//!
//! In [`SanitizeMode::Strict`] a character that survives the cleanup fails
//! the whole document. [`SanitizeMode::Relaxed`] drops it with a warning.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization as _;

/// How to treat characters that remain forbidden after cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    #[default]
    Strict,
    Relaxed,
}

impl std::str::FromStr for SanitizeMode {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(PackError::Config(format!("unknown sanitize mode: {other}"))),
        }
    }
}

/// Unicode general category Cf, as ranges.
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

/// Unicode general category Co.
const PRIVATE_USE_RANGES: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xF_0000, 0xF_FFFD),
    (0x10_0000, 0x10_FFFD),
];

fn in_ranges(cp: u32, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

fn is_noncharacter(cp: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}

/// True for characters that may never appear in a generated document.
pub fn is_forbidden(c: char) -> bool {
    let cp = u32::from(c);
    c.is_control()
        || in_ranges(cp, FORMAT_RANGES)
        || in_ranges(cp, PRIVATE_USE_RANGES)
        || is_noncharacter(cp)
}

/// First forbidden character in `text`, if any.
pub fn find_forbidden(text: &str) -> Option<char> {
    text.chars().find(|&c| is_forbidden(c))
}

/// Applies the sanitization policy to document text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanitizer {
    mode: SanitizeMode,
}

impl Sanitizer {
    pub fn new(mode: SanitizeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SanitizeMode {
        self.mode
    }

    /// Normalize and clean `text` destined for `field`.
    ///
    /// Whitespace controls (tab, CR, LF) become a single space so a value
    /// always stays on one CSV row or PDF line.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`PackError::Sanitization`] if a forbidden
    /// character survives cleanup.
    pub fn sanitize(&self, field: &str, text: &str) -> Result<String> {
        let normalized: String = text.nfkc().collect();

        let mut cleaned = String::with_capacity(normalized.len());
        let mut last_space = false;
        for c in normalized.chars() {
            if matches!(c, '\t' | '\n' | '\r') {
                if !last_space {
                    cleaned.push(' ');
                }
                last_space = true;
                continue;
            }
            if is_forbidden(c) {
                continue;
            }
            last_space = c == ' ';
            cleaned.push(c);
        }

        // Stripping can leave sequences that compose differently.
        let renormalized: String = cleaned.trim().nfkc().collect();
        self.check(field, renormalized)
    }

    /// Enforce the policy on text that is about to be emitted.
    ///
    /// Generators run every finished CSV cell and PDF line through this, so
    /// text that skipped [`Sanitizer::sanitize`] is still caught.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`PackError::Sanitization`] if `text` holds a
    /// forbidden character. Relaxed mode drops them with a warning.
    pub fn check(&self, field: &str, text: String) -> Result<String> {
        match find_forbidden(&text) {
            None => Ok(text),
            Some(c) if self.mode == SanitizeMode::Strict => Err(PackError::Sanitization(format!(
                "field '{field}' contains forbidden character U+{:04X}",
                u32::from(c)
            ))),
            Some(c) => {
                tracing::warn!(
                    field,
                    codepoint = %format!("U+{:04X}", u32::from(c)),
                    "dropping forbidden characters in relaxed mode"
                );
                Ok(text.chars().filter(|&c| !is_forbidden(c)).collect())
            }
        }
    }

    /// Sanitize an optional value, mapping `None` to an empty string.
    ///
    /// # Errors
    ///
    /// See [`Sanitizer::sanitize`].
    pub fn sanitize_opt(&self, field: &str, text: Option<&str>) -> Result<String> {
        text.map_or_else(|| Ok(String::new()), |t| self.sanitize(field, t))
    }
}
