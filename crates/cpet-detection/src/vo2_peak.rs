// ABOUTME: Peak oxygen uptake classification into Weber functional classes
// ABOUTME: Formats scoring-function peak estimates for the prediction message
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};

/// Weber functional class by peak VO2 (ml/kg/min)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeberClass {
    /// 20 and above
    A,
    /// 16 up to 20
    B,
    /// 10 up to 16
    C,
    /// Below 10
    D,
}

impl WeberClass {
    /// Classify a peak VO2 value
    #[must_use]
    pub fn from_vo2_peak(vo2_peak: f64) -> Self {
        if vo2_peak >= 20.0 {
            Self::A
        } else if vo2_peak >= 16.0 {
            Self::B
        } else if vo2_peak >= 10.0 {
            Self::C
        } else {
            Self::D
        }
    }

    /// Clinical reading of the class
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::A => "Mild to no functional impairment; exercise capacity normal or near normal",
            Self::B => "Mild to moderate functional impairment; exercise capacity slightly reduced",
            Self::C => "Moderate to severe functional impairment; exercise capacity clearly reduced",
            Self::D => "Severe functional impairment; exercise capacity severely reduced",
        }
    }
}

/// Peak VO2 estimate attached to a prediction message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vo2PeakPrediction {
    /// Estimate rounded to one decimal
    pub predicted_vo2_peak: f64,
    /// Weber class of the estimate
    pub weber_class: WeberClass,
    /// Description of the class
    pub weber_description: String,
}

impl Vo2PeakPrediction {
    /// Build a prediction from a raw peak estimate; non-finite input yields `None`
    #[must_use]
    pub fn from_peak(vo2_peak: f64) -> Option<Self> {
        if !vo2_peak.is_finite() {
            return None;
        }
        let weber_class = WeberClass::from_vo2_peak(vo2_peak);
        Some(Self {
            predicted_vo2_peak: (vo2_peak * 10.0).round() / 10.0,
            weber_class,
            weber_description: weber_class.description().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weber_boundaries() {
        assert_eq!(WeberClass::from_vo2_peak(20.0), WeberClass::A);
        assert_eq!(WeberClass::from_vo2_peak(19.9), WeberClass::B);
        assert_eq!(WeberClass::from_vo2_peak(16.0), WeberClass::B);
        assert_eq!(WeberClass::from_vo2_peak(10.0), WeberClass::C);
        assert_eq!(WeberClass::from_vo2_peak(9.99), WeberClass::D);
        assert_eq!(WeberClass::from_vo2_peak(-1.0), WeberClass::D);
    }

    #[test]
    fn test_prediction_rounds_to_one_decimal() {
        let prediction = Vo2PeakPrediction::from_peak(17.46).unwrap();
        assert!((prediction.predicted_vo2_peak - 17.5).abs() < 1e-12);
        assert_eq!(prediction.weber_class, WeberClass::B);
        assert!(Vo2PeakPrediction::from_peak(f64::NAN).is_none());
    }

    #[test]
    fn test_class_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&WeberClass::C).unwrap(), "\"C\"");
    }
}
