//! Vote tallying and ejection.
//!
//! The leader starts as "skip" holding the skip count. A strictly larger
//! count takes the lead and clears the tie flag; an equal count sets it.
//! Any shared maximum, between suspects or between a suspect and skip,
//! ejects nobody.

use std::collections::BTreeMap;

use skulk_protocol::Address;

/// Per-round aggregation of a votes map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub counts: BTreeMap<Address, usize>,
    pub skips: usize,
}

/// What a tally decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Eject(Address),
    /// Skip held the strict plurality (or nobody voted).
    Skipped,
    Tied,
}

impl VoteOutcome {
    pub fn ejected(&self) -> Option<&Address> {
        match self {
            Self::Eject(address) => Some(address),
            Self::Skipped | Self::Tied => None,
        }
    }
}

impl VoteTally {
    pub fn from_votes<'a, I>(votes: I) -> Self
    where
        I: IntoIterator<Item = &'a Option<Address>>,
    {
        let mut tally = Self::default();
        for vote in votes {
            match vote {
                Some(target) => *tally.counts.entry(target.clone()).or_default() += 1,
                None => tally.skips += 1,
            }
        }
        tally
    }

    /// Number of votes cast, skips included.
    pub fn total(&self) -> usize {
        self.skips + self.counts.values().sum::<usize>()
    }

    pub fn outcome(&self) -> VoteOutcome {
        let mut leader: Option<&Address> = None;
        let mut best = self.skips;
        let mut tie = false;

        for (target, &count) in &self.counts {
            if count > best {
                leader = Some(target);
                best = count;
                tie = false;
            } else if count == best {
                tie = true;
            }
        }

        match (tie, leader) {
            (true, _) => VoteOutcome::Tied,
            (false, Some(target)) => VoteOutcome::Eject(target.clone()),
            (false, None) => VoteOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(s: &str) -> Option<Address> {
        Some(Address::new(s))
    }

    fn outcome(votes: &[Option<Address>]) -> VoteOutcome {
        VoteTally::from_votes(votes).outcome()
    }

    #[test]
    fn test_strict_plurality_ejects() {
        let votes = [a("0xa"), a("0xa"), a("0xa"), None];
        assert_eq!(outcome(&votes), VoteOutcome::Eject(Address::new("0xa")));
    }

    #[test]
    fn test_tie_between_suspects_ejects_nobody() {
        let votes = [a("0xa"), a("0xa"), a("0xb"), a("0xb")];
        assert_eq!(outcome(&votes), VoteOutcome::Tied);
    }

    #[test]
    fn test_tie_with_skip_ejects_nobody() {
        let votes = [a("0xa"), a("0xa"), None, None];
        assert_eq!(outcome(&votes), VoteOutcome::Tied);
    }

    #[test]
    fn test_skip_plurality() {
        let votes = [a("0xa"), None, None];
        assert_eq!(outcome(&votes), VoteOutcome::Skipped);
    }

    #[test]
    fn test_no_votes_is_skip() {
        assert_eq!(outcome(&[]), VoteOutcome::Skipped);
    }

    #[test]
    fn test_later_larger_count_clears_tie() {
        // 0xa and 0xb tie at two, 0xc beats both.
        let votes = [
            a("0xa"),
            a("0xa"),
            a("0xb"),
            a("0xb"),
            a("0xc"),
            a("0xc"),
            a("0xc"),
        ];
        assert_eq!(outcome(&votes), VoteOutcome::Eject(Address::new("0xc")));
    }

    #[test]
    fn test_tie_below_leader_does_not_block() {
        let votes = [a("0xa"), a("0xa"), a("0xa"), a("0xb"), None];
        assert_eq!(outcome(&votes), VoteOutcome::Eject(Address::new("0xa")));
    }

    #[test]
    fn test_tally_conserves_votes() {
        let votes = [a("0xa"), a("0xb"), None, a("0xa"), None];
        let tally = VoteTally::from_votes(&votes);
        assert_eq!(tally.total(), votes.len());
        assert_eq!(tally.skips, 2);
        assert_eq!(tally.counts[&Address::new("0xa")], 2);
    }

    #[test]
    fn test_tie_law_over_every_shared_maximum() {
        // Any arrangement where the top count is shared ejects nobody.
        for top in 1..4usize {
            for skips in 0..=top {
                let mut votes = vec![a("0xa"); top];
                votes.extend(std::iter::repeat_n(a("0xb"), top));
                votes.extend(std::iter::repeat_n(None, skips));
                assert_eq!(outcome(&votes), VoteOutcome::Tied, "top={top} skips={skips}");
            }
        }
    }
}
