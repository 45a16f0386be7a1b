//! Negotiated site plan.
//!
//! A [`Blueprint`] is replaced wholesale on every Proposer turn and frozen
//! once negotiation terminates. Construction from untrusted LLM output goes
//! through [`crate::council::normalize`], which guarantees the invariants
//! checked by [`Blueprint::validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::{BuildError, Result};

/// Slug of the site root page.
pub const ROOT_SLUG: &str = "index";

/// Slug conventionally used for the contact page.
pub const CONTACT_SLUG: &str = "contact";

/// Color roles shared by every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTokens {
    pub primary: String,
    pub accent: String,
    pub surface: String,
    pub text: String,
}

impl Default for ColorTokens {
    /// Neutral dark-theme palette.
    fn default() -> Self {
        Self {
            primary: "#2563eb".to_string(),
            accent: "#0f766e".to_string(),
            surface: "#0f172a".to_string(),
            text: "#e2e8f0".to_string(),
        }
    }
}

/// Font families for headings and body copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypographyTokens {
    pub heading: String,
    pub body: String,
}

impl Default for TypographyTokens {
    fn default() -> Self {
        Self {
            heading: "Inter".to_string(),
            body: "Inter".to_string(),
        }
    }
}

/// Plan for one page of the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub slug: String,
    pub title: String,
    pub nav_label: String,
    pub purpose: String,
    /// Ordered section identifiers (e.g. `hero`, `services`, `testimonials`).
    pub sections: Vec<String>,
    pub content_guidance: String,
}

impl PageSpec {
    /// Whether this page is the site root.
    pub fn is_root(&self) -> bool {
        self.slug == ROOT_SLUG
    }

    /// Output filename for this page.
    pub fn filename(&self) -> String {
        page_filename(&self.slug)
    }
}

/// The negotiated site plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub site_name: String,
    pub tagline: String,
    pub brand_voice: String,
    pub colors: ColorTokens,
    pub typography: TypographyTokens,
    pub pages: Vec<PageSpec>,
}

impl Blueprint {
    /// The root page, if present.
    pub fn root(&self) -> Option<&PageSpec> {
        self.pages.iter().find(|p| p.is_root())
    }

    /// Look up a page by slug.
    pub fn page(&self, slug: &str) -> Option<&PageSpec> {
        self.pages.iter().find(|p| p.slug == slug)
    }

    /// Whether a page with `slug` exists.
    pub fn has_page(&self, slug: &str) -> bool {
        self.page(slug).is_some()
    }

    /// Output filenames for every page, in page order.
    pub fn filenames(&self) -> Vec<String> {
        self.pages.iter().map(PageSpec::filename).collect()
    }

    /// Check the structural invariants: at least one page, non-empty unique
    /// slugs, exactly one root page.
    pub fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(BuildError::EmptyBlueprint);
        }

        let mut seen = HashSet::new();
        for page in &self.pages {
            if page.slug.is_empty() {
                return Err(BuildError::Config(format!(
                    "page '{}' has an empty slug",
                    page.title
                )));
            }
            if !seen.insert(page.slug.as_str()) {
                return Err(BuildError::Config(format!(
                    "duplicate page slug '{}'",
                    page.slug
                )));
            }
        }

        let roots = self.pages.iter().filter(|p| p.is_root()).count();
        if roots != 1 {
            return Err(BuildError::Config(format!(
                "expected exactly one '{ROOT_SLUG}' page, found {roots}"
            )));
        }

        Ok(())
    }
}

/// Output filename for a page slug: `index` maps to the root file.
pub fn page_filename(slug: &str) -> String {
    format!("{slug}.html")
}

/// Inverse of [`page_filename`]; `None` for anything that is not an `.html` file.
pub fn slug_from_filename(filename: &str) -> Option<&str> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    name.strip_suffix(".html").filter(|s| !s.is_empty())
}

/// Lowercase `text` and replace every run of non-alphanumeric characters
/// with a single hyphen.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
