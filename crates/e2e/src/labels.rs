//! Bilingual label sets
//!
//! The app renders Chinese and English copy side by side rather than
//! switching locale, so every semantic control is located by any of a small
//! set of equivalent literal texts.

/// A named set of equivalent label texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSet {
    name: &'static str,
    patterns: &'static [&'static str],
}

impl LabelSet {
    pub const fn new(name: &'static str, patterns: &'static [&'static str]) -> Self {
        Self { name, patterns }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.patterns
    }

    /// Alternation of the escaped patterns.
    ///
    /// Only literal characters and `\`-escapes are emitted, so the result is
    /// valid both for the `regex` crate and for a JavaScript `RegExp`.
    pub fn regex_source(&self) -> String {
        self.patterns
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Whether `text` contains any of the patterns.
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| text.contains(p))
    }
}

/// Toggle that switches the style input into text-description mode.
pub const STYLE_TEXT_TOGGLE: LabelSet = LabelSet::new(
    "style-text-toggle",
    &["使用文字描述风格", "Use text description for style"],
);

/// Button that only renders once the toggle is on.
pub const EXTRACT_FROM_IMAGE: LabelSet =
    LabelSet::new("extract-from-image", &["从图片提取风格", "Extract from image"]);

pub const STYLE_EXTRACT_SUCCESS: LabelSet = LabelSet::new(
    "style-extract-success",
    &["风格提取成功", "Style extracted successfully"],
);

pub const STYLE_EXTRACT_FAILURE: LabelSet = LabelSet::new(
    "style-extract-failure",
    &["风格提取失败", "Style extraction failed"],
);
