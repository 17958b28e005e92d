use std::fmt::{Display, Formatter};

/// Option side code of a contract (`CE`, `PE`, or the exchange's futures filler).
///
/// There is no empty `OptionType`: blank source values normalize to `None`.
/// Codes are only trimmed, so `ce` and `CE` stay distinct contracts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionType(String);

impl OptionType {
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for OptionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_whitespace_normalize_to_none() {
        assert_eq!(OptionType::normalize(""), None);
        assert_eq!(OptionType::normalize("   "), None);
        assert_eq!(OptionType::normalize("\t"), None);
    }

    #[test]
    fn codes_are_trimmed_but_keep_their_case() {
        let lower = OptionType::normalize(" ce ").expect("present");
        let upper = OptionType::normalize("CE").expect("present");
        assert_eq!(lower.as_str(), "ce");
        assert_ne!(lower, upper);
    }
}
