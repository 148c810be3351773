//! Prefetch Engine
//!
//! Behavior-driven warming for one user. Patterns come from the user's
//! dominant learning modality plus the content touched in their most recent
//! sessions, and are warmed through the same path as scheduled warmup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::orchestrator::warmup::PatternWarmer;

/// Sessions considered when deriving content patterns
pub const RECENT_SESSION_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Visual,
    Auditory,
    Reading,
    Kinesthetic,
}

impl Modality {
    /// Tie-break order
    pub const ALL: [Modality; 4] = [
        Modality::Visual,
        Modality::Auditory,
        Modality::Reading,
        Modality::Kinesthetic,
    ];

    pub fn content_patterns(&self) -> [&'static str; 2] {
        match self {
            Self::Visual => ["content:visual:*", "content:diagram:*"],
            Self::Auditory => ["content:audio:*", "content:podcast:*"],
            Self::Reading => ["content:text:*", "content:article:*"],
            Self::Kinesthetic => ["content:interactive:*", "content:exercise:*"],
        }
    }
}

/// Per-modality preference scores
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningProfile {
    pub visual: f64,
    pub auditory: f64,
    pub reading: f64,
    pub kinesthetic: f64,
}

impl LearningProfile {
    fn score(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Visual => self.visual,
            Modality::Auditory => self.auditory,
            Modality::Reading => self.reading,
            Modality::Kinesthetic => self.kinesthetic,
        }
    }

    /// Highest-scoring modality; ties go to the earlier one in `Modality::ALL`.
    /// `None` when no score is positive.
    pub fn dominant(&self) -> Option<Modality> {
        let mut best: Option<(Modality, f64)> = None;
        for modality in Modality::ALL {
            let score = self.score(modality);
            if score.is_nan() || score <= 0.0 {
                continue;
            }
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((modality, score));
            }
        }
        best.map(|(modality, _)| modality)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub content_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrefetchResult {
    pub success: bool,
    pub items_prefetched: usize,
}

impl PrefetchResult {
    pub fn disabled() -> Self {
        Self {
            success: false,
            items_prefetched: 0,
        }
    }
}

/// Ordered, de-duplicated patterns for a user
pub fn derive_patterns(profile: &LearningProfile, sessions: &[SessionSummary]) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    let mut push = |pattern: String| {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    };

    if let Some(modality) = profile.dominant() {
        for pattern in modality.content_patterns() {
            push(pattern.to_string());
        }
    }

    let mut recent: Vec<&SessionSummary> = sessions.iter().collect();
    recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    for session in recent.into_iter().take(RECENT_SESSION_WINDOW) {
        for id in session.content_ids.iter().filter(|id| is_plain_id(id)) {
            push(format!("content:related:{}:*", id));
            push(format!("content:next:{}:*", id));
        }
    }

    patterns
}

/// Content ids are spliced into patterns; reject ones that would widen them
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['*', '?', ':'])
}

pub struct PrefetchEngine {
    enabled: bool,
    warmer: Arc<PatternWarmer>,
}

impl PrefetchEngine {
    pub fn new(enabled: bool, warmer: Arc<PatternWarmer>) -> Self {
        Self { enabled, warmer }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn prefetch_for_user(
        &self,
        user_id: &str,
        profile: &LearningProfile,
        recent_sessions: &[SessionSummary],
    ) -> PrefetchResult {
        if !self.enabled {
            return PrefetchResult::disabled();
        }
        if user_id.trim().is_empty() {
            warn!("Prefetch requested without a user id");
            return PrefetchResult::disabled();
        }

        let patterns = derive_patterns(profile, recent_sessions);
        if patterns.is_empty() {
            debug!("Nothing to prefetch for user {}", user_id);
            return PrefetchResult {
                success: true,
                items_prefetched: 0,
            };
        }

        let result = self.warmer.warm_patterns(&patterns).await;
        if result.failed_patterns.len() == patterns.len() {
            warn!("Prefetch for user {} failed for every pattern", user_id);
            return PrefetchResult::disabled();
        }

        debug!(
            "Prefetched {} items for user {} over {} patterns",
            result.keys_warmed,
            user_id,
            patterns.len()
        );
        PrefetchResult {
            success: true,
            items_prefetched: result.keys_warmed,
        }
    }
}
