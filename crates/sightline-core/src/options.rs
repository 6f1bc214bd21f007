#![forbid(unsafe_code)]

//! Observer options in the shape of the platform's `IntersectionObserverInit`.
//!
//! Values are validated up front so a malformed margin or threshold is
//! reported as [`OptionsError`] instead of surfacing later from the
//! platform constructor. The options carry no visibility logic of their own;
//! they are handed to the watcher factory as-is.
//!
//! # Defaults
//!
//! - root margin `"0px"` on all four sides
//! - thresholds `[0.0]`

use std::fmt;
use std::str::FromStr;

use crate::error::OptionsError;

/// Unit of a [`MarginLength`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Px,
    Percent,
}

/// One side of a [`RootMargin`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarginLength {
    pub value: f64,
    pub unit: LengthUnit,
}

impl MarginLength {
    #[must_use]
    pub const fn px(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Px,
        }
    }

    #[must_use]
    pub const fn percent(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Percent,
        }
    }

    fn parse_token(token: &str) -> Result<Self, OptionsError> {
        let invalid = || OptionsError::MarginToken {
            token: token.to_string(),
        };
        let (number, unit) = if let Some(number) = token.strip_suffix("px") {
            (number, LengthUnit::Px)
        } else if let Some(number) = token.strip_suffix('%') {
            (number, LengthUnit::Percent)
        } else {
            return Err(invalid());
        };
        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        Ok(Self { value, unit })
    }
}

impl fmt::Display for MarginLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            LengthUnit::Px => write!(f, "{}px", self.value),
            LengthUnit::Percent => write!(f, "{}%", self.value),
        }
    }
}

/// Margin grown (or shrunk, if negative) around the root's bounding box.
///
/// Parsed with CSS shorthand rules: one to four whitespace-separated
/// components, each in `px` or `%`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct RootMargin {
    pub top: MarginLength,
    pub right: MarginLength,
    pub bottom: MarginLength,
    pub left: MarginLength,
}

impl RootMargin {
    /// Same length on all sides.
    #[must_use]
    pub const fn uniform(length: MarginLength) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }
}

impl FromStr for RootMargin {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split_whitespace()
            .map(MarginLength::parse_token)
            .collect::<Result<Vec<_>, _>>()?;
        let (top, right, bottom, left) = match parts.as_slice() {
            [all] => (*all, *all, *all, *all),
            [vertical, horizontal] => (*vertical, *horizontal, *vertical, *horizontal),
            [top, horizontal, bottom] => (*top, *horizontal, *bottom, *horizontal),
            [top, right, bottom, left] => (*top, *right, *bottom, *left),
            _ => return Err(OptionsError::MarginArity { count: parts.len() }),
        };
        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.top, self.right, self.bottom, self.left)
    }
}

impl TryFrom<String> for RootMargin {
    type Error = OptionsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RootMargin> for String {
    fn from(margin: RootMargin) -> Self {
        margin.to_string()
    }
}

/// Sorted, de-duplicated visibility ratios in `[0, 1]`. Never empty.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<f64>", into = "Vec<f64>")
)]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    /// Validate and normalize. An empty input means `[0.0]`.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Result<Self, OptionsError> {
        let mut values: Vec<f64> = values.into_iter().collect();
        if let Some(&value) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(OptionsError::ThresholdOutOfRange { value });
        }
        if values.is_empty() {
            values.push(0.0);
        }
        values.sort_by(f64::total_cmp);
        values.dedup();
        Ok(Self(values))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(vec![0.0])
    }
}

impl TryFrom<Vec<f64>> for Thresholds {
    type Error = OptionsError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Thresholds> for Vec<f64> {
    fn from(thresholds: Thresholds) -> Self {
        thresholds.0
    }
}

/// Options for one watcher instance.
///
/// The observation root is backend-specific and lives in the backend's own
/// config type alongside these options.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ObserverOptions {
    root_margin: RootMargin,
    thresholds: Thresholds,
}

impl ObserverOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root margin from CSS shorthand, e.g. `"10px 0px"`.
    pub fn with_root_margin(mut self, margin: &str) -> Result<Self, OptionsError> {
        self.root_margin = margin.parse()?;
        Ok(self)
    }

    /// Replace the thresholds with a single ratio.
    pub fn with_threshold(self, threshold: f64) -> Result<Self, OptionsError> {
        self.with_thresholds([threshold])
    }

    /// Replace the thresholds.
    pub fn with_thresholds(
        mut self,
        thresholds: impl IntoIterator<Item = f64>,
    ) -> Result<Self, OptionsError> {
        self.thresholds = Thresholds::new(thresholds)?;
        Ok(self)
    }

    #[must_use]
    pub fn root_margin(&self) -> &RootMargin {
        &self.root_margin
    }

    #[must_use]
    pub fn thresholds(&self) -> &[f64] {
        self.thresholds.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_platform() {
        let options = ObserverOptions::default();
        assert_eq!(options.thresholds(), &[0.0]);
        assert_eq!(options.root_margin().to_string(), "0px 0px 0px 0px");
    }

    #[test]
    fn margin_shorthand_expands() {
        let one: RootMargin = "10px".parse().unwrap();
        assert_eq!(one, RootMargin::uniform(MarginLength::px(10.0)));

        let two: RootMargin = "10px 5%".parse().unwrap();
        assert_eq!(two.top, MarginLength::px(10.0));
        assert_eq!(two.right, MarginLength::percent(5.0));
        assert_eq!(two.bottom, MarginLength::px(10.0));
        assert_eq!(two.left, MarginLength::percent(5.0));

        let three: RootMargin = "1px 2px 3px".parse().unwrap();
        assert_eq!(three.to_string(), "1px 2px 3px 2px");

        let four: RootMargin = " -4px  3px 2px 1% ".parse().unwrap();
        assert_eq!(four.to_string(), "-4px 3px 2px 1%");
    }

    #[test]
    fn margin_rejects_bad_input() {
        assert_eq!(
            "".parse::<RootMargin>(),
            Err(OptionsError::MarginArity { count: 0 })
        );
        assert_eq!(
            "1px 1px 1px 1px 1px".parse::<RootMargin>(),
            Err(OptionsError::MarginArity { count: 5 })
        );
        assert_eq!(
            "0".parse::<RootMargin>(),
            Err(OptionsError::MarginToken {
                token: "0".to_string()
            })
        );
        assert!("10em".parse::<RootMargin>().is_err());
        assert!("px".parse::<RootMargin>().is_err());
        assert!("infpx".parse::<RootMargin>().is_err());
    }

    #[test]
    fn thresholds_sorted_and_deduplicated() {
        let thresholds = Thresholds::new([1.0, 0.5, 0.0, 0.5]).unwrap();
        assert_eq!(thresholds.as_slice(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn empty_thresholds_mean_zero() {
        let thresholds = Thresholds::new(Vec::new()).unwrap();
        assert_eq!(thresholds.as_slice(), &[0.0]);
    }

    #[test]
    fn thresholds_out_of_range_rejected() {
        assert_eq!(
            Thresholds::new([0.2, 1.5]),
            Err(OptionsError::ThresholdOutOfRange { value: 1.5 })
        );
        assert!(Thresholds::new([-0.1]).is_err());
        assert!(Thresholds::new([f64::NAN]).is_err());
    }

    #[test]
    fn builder_keeps_previous_fields() {
        let options = ObserverOptions::new()
            .with_root_margin("20px")
            .unwrap()
            .with_threshold(1.0)
            .unwrap();
        assert_eq!(options.thresholds(), &[1.0]);
        assert_eq!(
            *options.root_margin(),
            RootMargin::uniform(MarginLength::px(20.0))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_css_margin_string() {
        let options = ObserverOptions::new()
            .with_root_margin("10px 5%")
            .unwrap()
            .with_thresholds([0.25, 0.75])
            .unwrap();
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(
            json,
            r#"{"root_margin":"10px 5% 10px 5%","thresholds":[0.25,0.75]}"#
        );
        let back: ObserverOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);

        let partial: ObserverOptions = serde_json::from_str(r#"{"thresholds":[1.0]}"#).unwrap();
        assert_eq!(partial.thresholds(), &[1.0]);
        assert!(serde_json::from_str::<ObserverOptions>(r#"{"thresholds":[2.0]}"#).is_err());
    }
}
