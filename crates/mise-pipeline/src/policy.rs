//! Candidate fallback policy, kept apart from any I/O.
//!
//! [`decide`] looks only at what has happened so far; [`CandidateAttempts`]
//! hands out candidates one at a time for as long as it says to continue.

use crate::error::StageError;
use crate::types::CandidateSource;

/// Outcome of running every stage for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub url: String,
    pub outcome: Result<(), StageError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The attempt at `index` completed every stage.
    Won { index: usize },
    /// Every candidate failed.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(StopReason),
}

/// Stop at the first success; otherwise continue while candidates remain.
pub fn decide(history: &[AttemptRecord], remaining: usize) -> Decision {
    match history.last() {
        Some(last) if last.outcome.is_ok() => Decision::Stop(StopReason::Won {
            index: history.len() - 1,
        }),
        _ if remaining > 0 => Decision::Continue,
        _ => Decision::Stop(StopReason::Exhausted),
    }
}

/// Lazy, strictly sequential walk over a candidate list.
///
/// Call [`record`](Self::record) after every candidate handed out by
/// [`next_candidate`](Self::next_candidate); no candidate after the winner is
/// ever yielded.
pub struct CandidateAttempts<'a> {
    candidates: &'a [CandidateSource],
    history: Vec<AttemptRecord>,
}

impl<'a> CandidateAttempts<'a> {
    pub fn new(candidates: &'a [CandidateSource]) -> Self {
        Self {
            candidates,
            history: Vec::with_capacity(candidates.len()),
        }
    }

    pub fn next_candidate(&mut self) -> Option<&'a CandidateSource> {
        let tried = self.history.len();
        match decide(&self.history, self.candidates.len() - tried) {
            Decision::Continue => self.candidates.get(tried),
            Decision::Stop(_) => None,
        }
    }

    pub fn record(&mut self, candidate: &CandidateSource, outcome: Result<(), StageError>) {
        debug_assert!(self.history.len() < self.candidates.len());
        self.history.push(AttemptRecord {
            url: candidate.url.clone(),
            outcome,
        });
    }

    /// Current verdict over what has been recorded.
    pub fn decision(&self) -> Decision {
        decide(&self.history, self.candidates.len() - self.history.len())
    }

    /// Every URL attempted so far, in search order.
    pub fn attempted_urls(&self) -> Vec<String> {
        self.history.iter().map(|r| r.url.clone()).collect()
    }

    /// Error of the most recent failed attempt.
    pub fn last_error(&self) -> Option<&StageError> {
        self.history
            .iter()
            .rev()
            .find_map(|r| r.outcome.as_ref().err())
    }
}
