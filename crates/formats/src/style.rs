use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleSuffix {
    Categorical,
    Continuous,
    Diverging,
}

impl StyleSuffix {
    pub const ALL: [StyleSuffix; 3] = [
        StyleSuffix::Categorical,
        StyleSuffix::Continuous,
        StyleSuffix::Diverging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StyleSuffix::Categorical => "categorical",
            StyleSuffix::Continuous => "continuous",
            StyleSuffix::Diverging => "diverging",
        }
    }
}

/// A `{base}-{suffix}` visualisation style such as `polygon-diverging`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Style {
    pub base: String,
    pub suffix: StyleSuffix,
}

impl Style {
    pub fn new(base: impl Into<String>, suffix: StyleSuffix) -> Self {
        Self {
            base: base.into(),
            suffix,
        }
    }

    pub fn with_suffix(&self, suffix: StyleSuffix) -> Self {
        Self::new(self.base.clone(), suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleParseError(pub String);

impl std::fmt::Display for StyleParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid style {:?}: expected {{base}}-categorical|continuous|diverging",
            self.0
        )
    }
}

impl std::error::Error for StyleParseError {}

impl FromStr for Style {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, suffix) = s
            .rsplit_once('-')
            .ok_or_else(|| StyleParseError(s.to_string()))?;
        if base.is_empty() {
            return Err(StyleParseError(s.to_string()));
        }
        let suffix = StyleSuffix::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == suffix)
            .ok_or_else(|| StyleParseError(s.to_string()))?;
        Ok(Style::new(base, suffix))
    }
}

impl TryFrom<String> for Style {
    type Error = StyleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Style> for String {
    fn from(style: Style) -> Self {
        style.to_string()
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.base, self.suffix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Style, StyleSuffix};

    #[test]
    fn parses_on_last_hyphen() {
        let style: Style = "fill-extrusion-diverging".parse().unwrap();
        assert_eq!(style.base, "fill-extrusion");
        assert_eq!(style.suffix, StyleSuffix::Diverging);
        assert_eq!(style.to_string(), "fill-extrusion-diverging");
    }

    #[test]
    fn rejects_unknown_suffix_and_missing_base() {
        assert!("polygon-rainbow".parse::<Style>().is_err());
        assert!("-continuous".parse::<Style>().is_err());
        assert!("polygon".parse::<Style>().is_err());
    }

    #[test]
    fn serde_uses_the_hyphenated_string() {
        let style: Style = serde_json::from_str("\"line-categorical\"").unwrap();
        assert_eq!(style, Style::new("line", StyleSuffix::Categorical));
        assert_eq!(serde_json::to_string(&style).unwrap(), "\"line-categorical\"");
    }
}
