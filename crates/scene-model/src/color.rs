//! `name@alpha` colour specifications.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::scene::SceneError;

/// A colour with opacity, written `name@alpha` (e.g. `black@1`, `white@0.6`).
///
/// `name` is a colour keyword or a `#RRGGBB` / `0xRRGGBB` hex value. The
/// alpha part is optional and defaults to fully opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSpec {
    name: String,
    alpha: f64,
}

impl ColorSpec {
    pub fn new(name: impl Into<String>, alpha: f64) -> Result<Self, SceneError> {
        let name = name.into();
        validate_name(&name)?;
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(SceneError::InvalidColor {
                spec: format!("{name}@{alpha}"),
                reason: "alpha must be within [0, 1]".to_string(),
            });
        }
        Ok(Self { name, alpha })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

fn validate_name(name: &str) -> Result<(), SceneError> {
    let invalid = |reason: &str| SceneError::InvalidColor {
        spec: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("colour name is empty"));
    }

    let hex = name
        .strip_prefix('#')
        .or_else(|| name.strip_prefix("0x"))
        .or_else(|| name.strip_prefix("0X"));
    match hex {
        Some(digits) => {
            if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("hex colours need 6 or 8 hex digits"));
            }
        }
        None => {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("colour names are alphanumeric"));
            }
        }
    }
    Ok(())
}

impl FromStr for ColorSpec {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('@') {
            Some((name, alpha)) => {
                let alpha = alpha.parse::<f64>().map_err(|_| SceneError::InvalidColor {
                    spec: s.to_string(),
                    reason: format!("alpha `{alpha}` is not a number"),
                })?;
                Self::new(name, alpha)
            }
            None => Self::new(s, 1.0),
        }
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.alpha)
    }
}

impl Serialize for ColorSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColorSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_name_and_alpha() {
        let color: ColorSpec = "white@0.6".parse().unwrap();
        assert_eq!(color.name(), "white");
        assert!((color.alpha() - 0.6).abs() < 1e-12);
        assert_eq!(color.to_string(), "white@0.6");
    }

    #[test]
    fn test_alpha_defaults_to_opaque() {
        let color: ColorSpec = "black".parse().unwrap();
        assert_eq!(color.to_string(), "black@1");
    }

    #[test]
    fn test_hex_names_are_accepted() {
        assert!("#ff00aa@0.5".parse::<ColorSpec>().is_ok());
        assert!("0xFF00AA".parse::<ColorSpec>().is_ok());
        assert!("#ff00a".parse::<ColorSpec>().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_alpha() {
        assert!("black@1.5".parse::<ColorSpec>().is_err());
        assert!("black@-0.1".parse::<ColorSpec>().is_err());
        assert!("black@nan".parse::<ColorSpec>().is_err());
    }

    #[test]
    fn test_rejects_filter_syntax_in_name() {
        assert!("red:x=1@1".parse::<ColorSpec>().is_err());
        assert!("red[a]".parse::<ColorSpec>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let color: ColorSpec = serde_json::from_str("\"yellow@0.25\"").unwrap();
        assert_eq!(serde_json::to_string(&color).unwrap(), "\"yellow@0.25\"");
    }

    proptest! {
        #[test]
        fn prop_alpha_in_unit_range_parses(alpha in 0.0f64..=1.0) {
            let spec = format!("red@{alpha}");
            let color: ColorSpec = spec.parse().unwrap();
            prop_assert!((color.alpha() - alpha).abs() < 1e-12);
        }
    }
}
