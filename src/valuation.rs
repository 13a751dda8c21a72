use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Letter {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    D,
    F,
}

/// Lower bound of each band, highest first. A score belongs to the first
/// band whose bound it reaches.
const BANDS: [(f64, Letter); 10] = [
    (95.0, Letter::APlus),
    (90.0, Letter::A),
    (85.0, Letter::AMinus),
    (80.0, Letter::BPlus),
    (75.0, Letter::B),
    (70.0, Letter::BMinus),
    (65.0, Letter::CPlus),
    (60.0, Letter::C),
    (55.0, Letter::CMinus),
    (50.0, Letter::D),
];

impl Letter {
    pub const ALL: [Letter; 11] = [
        Letter::APlus,
        Letter::A,
        Letter::AMinus,
        Letter::BPlus,
        Letter::B,
        Letter::BMinus,
        Letter::CPlus,
        Letter::C,
        Letter::CMinus,
        Letter::D,
        Letter::F,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Letter::APlus => "A+",
            Letter::A => "A",
            Letter::AMinus => "A-",
            Letter::BPlus => "B+",
            Letter::B => "B",
            Letter::BMinus => "B-",
            Letter::CPlus => "C+",
            Letter::C => "C",
            Letter::CMinus => "C-",
            Letter::D => "D",
            Letter::F => "F",
        }
    }

    pub fn points(&self) -> f64 {
        match self {
            Letter::APlus | Letter::A => 4.0,
            Letter::AMinus => 3.7,
            Letter::BPlus => 3.3,
            Letter::B => 3.0,
            Letter::BMinus => 2.7,
            Letter::CPlus => 2.3,
            Letter::C => 2.0,
            Letter::CMinus => 1.7,
            Letter::D => 1.0,
            Letter::F => 0.0,
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Letter {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Letter::ALL
            .into_iter()
            .find(|letter| letter.as_str() == value)
            .ok_or_else(|| format!("unknown letter grade '{value}'"))
    }
}

/// Maps a percentage score to its letter band.
pub fn classify(percent: f64) -> Letter {
    BANDS
        .iter()
        .find(|(bound, _)| percent >= *bound)
        .map(|(_, letter)| *letter)
        .unwrap_or(Letter::F)
}

/// Grade points for a stored letter label; unknown labels weigh nothing.
pub fn grade_points(label: &str) -> f64 {
    label.parse::<Letter>().map(|letter| letter.points()).unwrap_or(0.0)
}

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score range in force for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleKind {
    /// Scores out of 100.
    Percent,
    /// Scores out of 20, weighted by coefficient.
    Twenty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingScale {
    pub kind: ScaleKind,
    pub pass_threshold: f64,
}

impl GradingScale {
    pub fn new(kind: ScaleKind) -> Self {
        let pass_threshold = match kind {
            ScaleKind::Percent => 60.0,
            ScaleKind::Twenty => 10.0,
        };
        Self {
            kind,
            pass_threshold,
        }
    }

    pub fn percent() -> Self {
        Self::new(ScaleKind::Percent)
    }

    pub fn twenty() -> Self {
        Self::new(ScaleKind::Twenty)
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn max_score(&self) -> f64 {
        match self.kind {
            ScaleKind::Percent => 100.0,
            ScaleKind::Twenty => 20.0,
        }
    }

    pub fn validate(&self, score: f64) -> Result<f64> {
        if !score.is_finite() || score < 0.0 || score > self.max_score() {
            return Err(Error::validation(format!(
                "score {score} outside 0..={}",
                self.max_score()
            )));
        }
        Ok(score)
    }

    pub fn letter_for(&self, score: f64) -> Letter {
        classify(score / self.max_score() * 100.0)
    }

    pub fn passes(&self, score: f64) -> bool {
        score >= self.pass_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_closed_below() {
        assert_eq!(classify(95.0), Letter::APlus);
        assert_eq!(classify(94.99), Letter::A);
        assert_eq!(classify(90.0), Letter::A);
        assert_eq!(classify(70.0), Letter::BMinus);
        assert_eq!(classify(68.0), Letter::CPlus);
        assert_eq!(classify(50.0), Letter::D);
        assert_eq!(classify(49.99), Letter::F);
        assert_eq!(classify(0.0), Letter::F);
        assert_eq!(classify(100.0), Letter::APlus);
    }

    #[test]
    fn classification_never_improves_as_score_drops() {
        let mut previous = classify(100.0);
        let mut score = 100.0;
        while score >= 0.0 {
            let current = classify(score);
            assert!(current >= previous, "{score} gave {current} after {previous}");
            previous = current;
            score -= 0.25;
        }
    }

    #[test]
    fn unknown_letters_weigh_zero() {
        assert_eq!(grade_points("A-"), 3.7);
        assert_eq!(grade_points("B-"), 2.7);
        assert_eq!(grade_points("Z"), 0.0);
        assert_eq!(grade_points(""), 0.0);
    }

    #[test]
    fn letters_round_trip_through_labels() {
        for letter in Letter::ALL {
            assert_eq!(letter.as_str().parse::<Letter>(), Ok(letter));
        }
    }

    #[test]
    fn twenty_scale_normalises_before_classifying() {
        let scale = GradingScale::twenty();
        assert_eq!(scale.letter_for(19.0), Letter::APlus);
        assert_eq!(scale.letter_for(10.0), Letter::D);
        assert!(scale.passes(10.0));
        assert!(!scale.passes(9.99));
        assert!(scale.validate(20.5).is_err());
        assert!(scale.validate(f64::NAN).is_err());
    }

    #[test]
    fn percent_scale_rejects_out_of_range() {
        let scale = GradingScale::percent();
        assert_eq!(scale.validate(100.0).ok(), Some(100.0));
        assert!(scale.validate(-0.5).is_err());
        assert!(scale.validate(100.1).is_err());
        assert!(scale.passes(60.0));
    }

    #[test]
    fn rounding_goes_half_away_from_zero() {
        assert_eq!(round2(22.8 / 7.0), 3.26);
        assert_eq!(round2(2.0 / 3.0 * 100.0), 66.67);
        assert_eq!(round2(0.0), 0.0);
    }
}
