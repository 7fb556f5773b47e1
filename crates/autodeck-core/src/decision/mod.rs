//! Next-track decision service boundary
//!
//! An external service (typically a language model behind HTTP) may refine the
//! matcher's shortlist. It sees the session context and answers with an index
//! into the shortlist plus a free-text rationale. The session treats every
//! failure, including a slow answer, as "use the matcher's top pick".

mod http;

pub use http::HttpDecisionService;

use crate::matcher::Candidate;
use crate::music::HarmonicKey;
use crate::types::TrackId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error type for decision service calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecisionError {
    #[error("Decision service timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decision service failed: {0}")]
    Service(String),

    #[error("Decision service chose index {index} from a shortlist of {len}")]
    InvalidChoice { index: usize, len: usize },
}

/// A shortlisted candidate as presented to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    pub key: HarmonicKey,
    /// Matcher score (0-15)
    pub score: u8,
}

impl From<&Candidate> for ShortlistEntry {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.track.id,
            title: candidate.track.title.clone(),
            artist: candidate.track.artist.clone(),
            bpm: candidate.track.bpm,
            key: candidate.track.key,
            score: candidate.score.total(),
        }
    }
}

/// Session context sent with every decision request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub active_key: HarmonicKey,
    pub active_bpm: f64,
    /// Energy target of the session (0.0-1.0)
    pub energy: f32,
    pub tracks_played: u32,
    /// Matcher candidates, best first
    pub shortlist: Vec<ShortlistEntry>,
}

/// The service's pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    /// Index into [`DecisionRequest::shortlist`]
    pub index: usize,
    #[serde(default)]
    pub rationale: String,
}

impl DecisionResponse {
    /// Check the choice against the shortlist it answers
    pub fn validate(&self, request: &DecisionRequest) -> Result<(), DecisionError> {
        if self.index >= request.shortlist.len() {
            return Err(DecisionError::InvalidChoice {
                index: self.index,
                len: request.shortlist.len(),
            });
        }
        Ok(())
    }
}

/// Proposes the next track from a shortlist
///
/// Implementations may take arbitrarily long; callers bound the call with
/// [`propose_within`].
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn propose(&self, request: &DecisionRequest) -> Result<DecisionResponse, DecisionError>;
}

/// Ask the service for a pick, giving up after `limit`
///
/// The returned index is always valid for `request.shortlist`.
pub async fn propose_within(
    service: &dyn DecisionService,
    request: &DecisionRequest,
    limit: Duration,
) -> Result<DecisionResponse, DecisionError> {
    let response = tokio::time::timeout(limit, service.propose(request))
        .await
        .map_err(|_| DecisionError::Timeout(limit))??;
    response.validate(request)?;
    Ok(response)
}
