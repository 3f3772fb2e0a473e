//! Locale identifiers used for source and target languages.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use unic_langid::LanguageIdentifier;

use crate::error::Error;

/// A BCP 47 locale identifier (`en`, `fr-CA`, `zh-Hant-TW`, ...).
///
/// Parsing canonicalizes the casing, so `EN-us` and `en-US` compare equal.
/// Underscore separators (`pt_BR`) are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocaleId(String);

impl LocaleId {
    pub fn new(tag: &str) -> Result<Self, Error> {
        tag.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn language_identifier(&self) -> LanguageIdentifier {
        // Only canonical tags are ever stored.
        self.0.parse().unwrap_or_default()
    }

    /// The primary language subtag (`en` for `en-US`).
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }

    /// Check if both locales share the same language, ignoring script and region.
    pub fn same_language(&self, other: &LocaleId) -> bool {
        self.language() == other.language()
    }
}

impl FromStr for LocaleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidLocale(s.to_string()));
        }
        let langid: LanguageIdentifier = trimmed
            .replace('_', "-")
            .parse()
            .map_err(|_| Error::InvalidLocale(s.to_string()))?;
        Ok(LocaleId(langid.to_string()))
    }
}

impl TryFrom<String> for LocaleId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocaleId> for String {
    fn from(value: LocaleId) -> Self {
        value.0
    }
}

impl Display for LocaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalizes() {
        let locale = LocaleId::new("EN-us").unwrap();
        assert_eq!(locale.as_str(), "en-US");
        assert_eq!(locale, LocaleId::new("en_US").unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(LocaleId::new("").is_err());
        assert!(LocaleId::new("1").is_err());
        assert!(LocaleId::new("en-US-??").is_err());
    }

    #[test]
    fn test_language_and_same_language() {
        let ca = LocaleId::new("fr-CA").unwrap();
        let fr = LocaleId::new("fr").unwrap();
        assert_eq!(ca.language(), "fr");
        assert!(ca.same_language(&fr));
        assert!(!ca.same_language(&LocaleId::new("de").unwrap()));
        assert_eq!(ca.language_identifier().region.unwrap().as_str(), "CA");
    }

    #[test]
    fn test_serde_as_string() {
        let locale = LocaleId::new("zh-Hant-TW").unwrap();
        let json = serde_json::to_string(&locale).unwrap();
        assert_eq!(json, "\"zh-Hant-TW\"");
        let back: LocaleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locale);
        assert!(serde_json::from_str::<LocaleId>("\"??\"").is_err());
    }
}
