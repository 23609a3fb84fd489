use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// UI language of the drill application
///
/// Drives the recognizer locale sent to the server at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Cs,
    En,
}

impl Language {
    /// Short UI code ("cs" / "en")
    pub fn code(self) -> &'static str {
        match self {
            Language::Cs => "cs",
            Language::En => "en",
        }
    }

    /// Recognizer locale for the language directive
    pub fn locale_tag(self) -> &'static str {
        match self {
            Language::Cs => "cs-CZ",
            Language::En => "en-US",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Language::Cs => Language::En,
            Language::En => Language::Cs,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "cs" | "cs-cz" => Some(Language::Cs),
            "en" | "en-us" => Some(Language::En),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_code(s).ok_or_else(|| format!("unsupported language '{}' (expected cs or en)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_czech() {
        assert_eq!(Language::default(), Language::Cs);
        assert_eq!(Language::default().locale_tag(), "cs-CZ");
    }

    #[test]
    fn test_locale_tags() {
        assert_eq!(Language::Cs.locale_tag(), "cs-CZ");
        assert_eq!(Language::En.locale_tag(), "en-US");
    }

    #[test]
    fn test_toggle() {
        assert_eq!(Language::Cs.toggle(), Language::En);
        assert_eq!(Language::En.toggle().toggle(), Language::En);
    }

    #[test]
    fn test_parse() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!("CS".parse::<Language>().unwrap(), Language::Cs);
        assert_eq!("en-US".parse::<Language>().unwrap(), Language::En);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn test_serde_uses_short_code() {
        assert_eq!(serde_json::to_string(&Language::En).unwrap(), "\"en\"");
        let lang: Language = serde_json::from_str("\"cs\"").unwrap();
        assert_eq!(lang, Language::Cs);
    }
}
