//! Read-only context the consultation needs from the platform API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::errors::CallError;
use crate::review::ReviewLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Veterinarian,
    PetParent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub vet_id: String,
    pub parent_id: String,
    #[serde(default)]
    pub pet_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Veterinarian {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetParent {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub role: Role,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReviewExists {
    exists: bool,
}

/// JSON client for the appointment, user and review endpoints.
pub struct ContextClient {
    base_url: Url,
    bearer: Option<String>,
    http: reqwest::Client,
}

impl ContextClient {
    pub fn new(base_url: &str) -> Result<Self, CallError> {
        // A trailing slash keeps the last path segment when joining.
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| CallError::Http(format!("invalid base url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            bearer: None,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub async fn appointment(&self, id: &str) -> Result<Appointment, CallError> {
        self.get_json(&format!("appointments/{}", urlencoding::encode(id)), &[]).await
    }

    pub async fn veterinarian(&self, id: &str) -> Result<Veterinarian, CallError> {
        self.get_json(&format!("veterinarians/{}", urlencoding::encode(id)), &[]).await
    }

    pub async fn pet_parent(&self, id: &str) -> Result<PetParent, CallError> {
        self.get_json(&format!("pet-parents/{}", urlencoding::encode(id)), &[]).await
    }

    pub async fn own_profile(&self) -> Result<Profile, CallError> {
        self.get_json("profile", &[]).await
    }

    pub async fn review_exists(&self, vet_id: &str, parent_id: &str) -> Result<bool, CallError> {
        let data: ReviewExists = self
            .get_json("reviews/exists", &[("vetId", vet_id), ("parentId", parent_id)])
            .await?;
        Ok(data.exists)
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CallError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| CallError::Http(format!("invalid endpoint '{path}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CallError> {
        let url = self.endpoint(path, query)?;
        tracing::debug!("GET {url}");

        let mut req = self.http.get(url.clone());
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| CallError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CallError::Http(format!("{} returned status {}", url.path(), resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| CallError::Http(format!("invalid response from {}: {e}", url.path())))
    }
}

#[async_trait]
impl ReviewLookup for ContextClient {
    async fn has_existing_review(&self, vet_id: &str, parent_id: &str) -> Result<bool, CallError> {
        self.review_exists(vet_id, parent_id).await
    }
}
