//! Reveal and expansion stages
//!
//! Both stage machines only move forward within one mount. Ordering is the
//! declaration order, so `a < b` means `a` comes first.

use std::fmt;

/// Progress of the card reveal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RevealStage {
    #[default]
    Idle,
    SilverVisible,
    BronzeVisible,
    GoldVisible,
    ValuesRevealed,
    ExpansionAuthorized,
}

impl RevealStage {
    /// Every stage in reveal order
    pub const SEQUENCE: [RevealStage; 6] = [
        RevealStage::Idle,
        RevealStage::SilverVisible,
        RevealStage::BronzeVisible,
        RevealStage::GoldVisible,
        RevealStage::ValuesRevealed,
        RevealStage::ExpansionAuthorized,
    ];

    pub fn next(self) -> Option<RevealStage> {
        match self {
            RevealStage::Idle => Some(RevealStage::SilverVisible),
            RevealStage::SilverVisible => Some(RevealStage::BronzeVisible),
            RevealStage::BronzeVisible => Some(RevealStage::GoldVisible),
            RevealStage::GoldVisible => Some(RevealStage::ValuesRevealed),
            RevealStage::ValuesRevealed => Some(RevealStage::ExpansionAuthorized),
            RevealStage::ExpansionAuthorized => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RevealStage::Idle => "idle",
            RevealStage::SilverVisible => "silver-visible",
            RevealStage::BronzeVisible => "bronze-visible",
            RevealStage::GoldVisible => "gold-visible",
            RevealStage::ValuesRevealed => "values-revealed",
            RevealStage::ExpansionAuthorized => "expansion-authorized",
        }
    }
}

impl fmt::Display for RevealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the gold card expansion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExpansionStage {
    #[default]
    Collapsed,
    PositionShifted,
    OutlineRevealing,
    DetailSliding,
    ScoreCounting,
    BurstFired,
    Settled,
}

impl ExpansionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpansionStage::Collapsed => "collapsed",
            ExpansionStage::PositionShifted => "position-shifted",
            ExpansionStage::OutlineRevealing => "outline-revealing",
            ExpansionStage::DetailSliding => "detail-sliding",
            ExpansionStage::ScoreCounting => "score-counting",
            ExpansionStage::BurstFired => "burst-fired",
            ExpansionStage::Settled => "settled",
        }
    }

    /// Whether the card has left its collapsed position
    pub fn is_expanded(self) -> bool {
        self != ExpansionStage::Collapsed
    }

    /// Whether the detail panel is on screen
    pub fn shows_detail(self) -> bool {
        self >= ExpansionStage::DetailSliding
    }
}

impl fmt::Display for ExpansionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_follows_next() {
        let mut stage = RevealStage::Idle;
        let mut walked = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            walked.push(next);
            stage = next;
        }
        assert_eq!(walked, RevealStage::SEQUENCE);
    }

    #[test]
    fn test_expansion_flags() {
        assert!(!ExpansionStage::Collapsed.is_expanded());
        assert!(ExpansionStage::PositionShifted.is_expanded());
        assert!(!ExpansionStage::OutlineRevealing.shows_detail());
        assert!(ExpansionStage::Settled.shows_detail());
        assert_eq!(ExpansionStage::ScoreCounting.to_string(), "score-counting");
    }
}
