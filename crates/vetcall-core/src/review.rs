use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::CallError;

/// Looks up whether a pet parent already reviewed a veterinarian.
#[async_trait]
pub trait ReviewLookup: Send + Sync {
    async fn has_existing_review(&self, vet_id: &str, parent_id: &str) -> Result<bool, CallError>;
}

/// The (veterinarian, pet parent) pair a review would be about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub vet_id: String,
    pub parent_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Ask the user for feedback.
    Prompt,
    AlreadyReviewed,
    /// The local user is not the one who reviews (e.g. the veterinarian).
    NotApplicable,
}

/// Decides, at call end, whether to prompt for a review.
#[derive(Clone)]
pub struct ReviewGate {
    lookup: Arc<dyn ReviewLookup>,
}

impl ReviewGate {
    pub fn new(lookup: Arc<dyn ReviewLookup>) -> Self {
        Self { lookup }
    }

    /// A failed lookup counts as "no existing review".
    pub async fn decide(&self, target: Option<&ReviewTarget>) -> ReviewDecision {
        let Some(target) = target else {
            return ReviewDecision::NotApplicable;
        };

        match self
            .lookup
            .has_existing_review(&target.vet_id, &target.parent_id)
            .await
        {
            Ok(true) => ReviewDecision::AlreadyReviewed,
            Ok(false) => ReviewDecision::Prompt,
            Err(e) => {
                tracing::warn!("review lookup failed, prompting anyway: {e}");
                ReviewDecision::Prompt
            }
        }
    }
}
