//! Client brief that seeds a build.

use serde::{Deserialize, Serialize};

/// Immutable input to a build: who the site is for and what it should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub business_name: String,
    pub niche: String,
    pub goals: String,
    pub contact_email: String,
}

impl ClientRequest {
    pub fn new(
        business_name: impl Into<String>,
        niche: impl Into<String>,
        goals: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Self {
        Self {
            business_name: business_name.into(),
            niche: niche.into(),
            goals: goals.into(),
            contact_email: contact_email.into(),
        }
    }

    /// Repository-safe name derived from the business name.
    pub fn repo_slug(&self) -> String {
        let slug = crate::domain::blueprint::slugify(&self.business_name);
        if slug.is_empty() {
            "site".to_string()
        } else {
            slug
        }
    }
}
