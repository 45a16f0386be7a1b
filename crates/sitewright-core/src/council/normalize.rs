//! Normalization of untrusted negotiation payloads.
//!
//! Model output is parsed into explicit structures here and nowhere else.
//! Every rule is deterministic and idempotent: normalizing the JSON form of
//! an already-normalized [`Blueprint`] returns the same Blueprint.
//!
//! Rules:
//! - missing or malformed slugs are derived from the title
//! - duplicate slugs get a numeric suffix (`-2`, `-3`, ...)
//! - exactly one page ends up with slug `index` (a `home` page or the first
//!   page is promoted; extra claimants are renamed)
//! - color values are reduced to the first hex token they contain
//! - font values lose trailing explanations (`Inter - clean and modern`)
//! - missing fields receive documented defaults
//! - zero pages is a fatal [`BuildError::EmptyBlueprint`]

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::blueprint::{
    slugify, Blueprint, ColorTokens, PageSpec, TypographyTokens, ROOT_SLUG,
};
use crate::domain::critique::{Critique, Issue, IssueSeverity};
use crate::domain::error::{BuildError, Result};
use crate::domain::request::ClientRequest;

const DEFAULT_BRAND_VOICE: &str = "friendly, clear, and professional";

/// Separators that introduce explanatory text after a token value.
const EXPLANATION_SEPARATORS: [&str; 6] = [" — ", " – ", " - ", "(", ",", ";"];

fn hex_pattern() -> &'static Regex {
    static HEX: OnceLock<Regex> = OnceLock::new();
    HEX.get_or_init(|| Regex::new(r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("Invalid hex regex"))
}

/// First value among `keys` that is a non-empty string.
fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reduce a color value to its first hex token.
pub fn clean_color(raw: &str) -> Option<String> {
    hex_pattern()
        .find(raw)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Strip trailing explanation and quoting from a font family value.
pub fn clean_font(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    for sep in EXPLANATION_SEPARATORS {
        if let Some(pos) = value.find(sep) {
            value = &value[..pos];
        }
    }
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn colors_from(value: Option<&Value>) -> ColorTokens {
    let defaults = ColorTokens::default();
    let Some(obj) = value.and_then(Value::as_object) else {
        return defaults;
    };
    let pick = |keys: &[&str], default: String| {
        keys.iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .find_map(clean_color)
            .unwrap_or(default)
    };
    ColorTokens {
        primary: pick(&["primary"], defaults.primary),
        accent: pick(&["accent", "secondary"], defaults.accent),
        surface: pick(&["surface", "background"], defaults.surface),
        text: pick(&["text", "foreground"], defaults.text),
    }
}

fn typography_from(value: Option<&Value>) -> TypographyTokens {
    let defaults = TypographyTokens::default();
    let Some(obj) = value.and_then(Value::as_object) else {
        return defaults;
    };
    let pick = |keys: &[&str], default: String| {
        keys.iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .find_map(clean_font)
            .unwrap_or(default)
    };
    let heading = pick(&["heading", "headings", "display"], defaults.heading);
    let body = pick(&["body", "text"], heading.clone());
    TypographyTokens { heading, body }
}

fn sections_from(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => str_field(obj, &["id", "name", "type", "title"]),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Slug candidate from an explicit slug value (`/About.html` → `about`).
fn slug_candidate(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches("./").trim_start_matches('/');
    let trimmed = trimmed.strip_suffix(".html").unwrap_or(trimmed);
    slugify(trimmed)
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn page_from(obj: &Map<String, Value>, position: usize) -> PageSpec {
    let title = str_field(obj, &["title", "name", "nav_label", "navLabel"]);
    let slug = str_field(obj, &["slug", "id", "filename", "path"])
        .map(|s| slug_candidate(&s))
        .filter(|s| !s.is_empty())
        .or_else(|| title.as_deref().map(slugify).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("page-{}", position + 1));
    let title = title.unwrap_or_else(|| title_case(&slug));
    let nav_label = str_field(obj, &["nav_label", "navLabel", "label"]).unwrap_or_else(|| title.clone());

    PageSpec {
        slug,
        nav_label,
        purpose: str_field(obj, &["purpose", "goal", "description"]).unwrap_or_default(),
        sections: sections_from(obj.get("sections")),
        content_guidance: str_field(
            obj,
            &["content_guidance", "contentGuidance", "guidance", "content"],
        )
        .unwrap_or_default(),
        title,
    }
}

/// Enforce one root page and unique slugs, in page order.
fn settle_slugs(pages: &mut [PageSpec]) {
    let root = pages
        .iter()
        .position(|p| p.slug == ROOT_SLUG)
        .or_else(|| pages.iter().position(|p| p.slug == "home"))
        .unwrap_or(0);

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(ROOT_SLUG.to_string());

    for (i, page) in pages.iter_mut().enumerate() {
        if i == root {
            page.slug = ROOT_SLUG.to_string();
            continue;
        }
        let mut base = page.slug.clone();
        if base == ROOT_SLUG {
            base = match slugify(&page.title) {
                s if s.is_empty() || s == ROOT_SLUG => "home".to_string(),
                s => s,
            };
        }
        let mut candidate = base.clone();
        let mut n = 2;
        while seen.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        seen.insert(candidate.clone());
        page.slug = candidate;
    }
}

/// Parse and normalize a Proposer payload.
pub fn blueprint_from_value(value: &Value, request: &ClientRequest) -> Result<Blueprint> {
    let empty = Map::new();
    let obj = value
        .get("blueprint")
        .and_then(Value::as_object)
        .or_else(|| value.as_object())
        .unwrap_or(&empty);

    let pages_value = obj
        .get("pages")
        .or_else(|| obj.get("sitemap"))
        .and_then(Value::as_array);
    let mut pages: Vec<PageSpec> = pages_value
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .enumerate()
                .map(|(i, p)| page_from(p, i))
                .collect()
        })
        .unwrap_or_default();

    if pages.is_empty() {
        return Err(BuildError::EmptyBlueprint);
    }
    settle_slugs(&mut pages);

    let blueprint = Blueprint {
        site_name: str_field(obj, &["site_name", "siteName", "name"])
            .unwrap_or_else(|| request.business_name.clone()),
        tagline: str_field(obj, &["tagline", "slogan"]).unwrap_or_else(|| request.goals.clone()),
        brand_voice: str_field(obj, &["brand_voice", "brandVoice", "voice", "tone"])
            .unwrap_or_else(|| DEFAULT_BRAND_VOICE.to_string()),
        colors: colors_from(obj.get("colors").or_else(|| obj.get("color_tokens"))),
        typography: typography_from(obj.get("typography").or_else(|| obj.get("fonts"))),
        pages,
    };
    blueprint.validate()?;
    Ok(blueprint)
}

/// Parse a Reviewer payload. Missing fields mean "not approved, no issues".
pub fn critique_from_value(value: &Value) -> Critique {
    let approved = match value.get("approved") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    };
    let score = match value.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
    .clamp(0.0, 10.0);

    let issues = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => Some(Issue {
                        severity: IssueSeverity::parse_lenient(
                            &str_field(obj, &["severity", "priority"]).unwrap_or_default(),
                        ),
                        area: str_field(obj, &["area", "page", "category"]).unwrap_or_default(),
                        description: str_field(obj, &["description", "issue", "problem"])
                            .unwrap_or_default(),
                        suggested_fix: str_field(obj, &["suggested_fix", "suggestedFix", "fix"])
                            .unwrap_or_default(),
                    }),
                    Value::String(s) => Some(Issue {
                        severity: IssueSeverity::Medium,
                        area: String::new(),
                        description: s.clone(),
                        suggested_fix: String::new(),
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Critique {
        approved,
        score,
        issues,
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ClientRequest {
        ClientRequest::new("Sunrise Bakery", "bakery", "sell bread", "hello@sunrise.test")
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let bp = blueprint_from_value(&json!({"pages": [{"title": "Home"}]}), &request()).unwrap();
        assert_eq!(bp.site_name, "Sunrise Bakery");
        assert_eq!(bp.tagline, "sell bread");
        assert_eq!(bp.colors, ColorTokens::default());
        assert_eq!(bp.typography, TypographyTokens::default());
        assert_eq!(bp.pages[0].slug, "index");
    }

    #[test]
    fn test_zero_pages_is_fatal() {
        let err = blueprint_from_value(&json!({"site_name": "X", "pages": []}), &request());
        assert!(matches!(err, Err(BuildError::EmptyBlueprint)));
        let err = blueprint_from_value(&json!("not an object"), &request());
        assert!(matches!(err, Err(BuildError::EmptyBlueprint)));
    }

    #[test]
    fn test_slugs_derived_deduplicated_and_rooted() {
        let value = json!({
            "pages": [
                {"title": "Welcome", "slug": "index"},
                {"title": "Our Story"},
                {"title": "Menu", "slug": "/Menu.html"},
                {"title": "Menu Again", "slug": "menu"},
                {"title": "Index Two", "slug": "index"}
            ]
        });
        let bp = blueprint_from_value(&value, &request()).unwrap();
        let slugs: Vec<&str> = bp.pages.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["index", "our-story", "menu", "menu-2", "index-two"]);
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_home_page_promoted_to_root() {
        let value = json!({"pages": [{"title": "About"}, {"title": "Home"}]});
        let bp = blueprint_from_value(&value, &request()).unwrap();
        assert_eq!(bp.pages[0].slug, "about");
        assert_eq!(bp.pages[1].slug, "index");
    }

    #[test]
    fn test_first_page_promoted_when_no_root() {
        let value = json!({"pages": [{"title": "About"}, {"title": "Contact"}]});
        let bp = blueprint_from_value(&value, &request()).unwrap();
        assert_eq!(bp.pages[0].slug, "index");
        assert_eq!(bp.pages[1].slug, "contact");
    }

    #[test]
    fn test_token_values_are_cleaned() {
        let value = json!({
            "colors": {
                "primary": "#C2410C — warm terracotta evokes ovens",
                "accent": "sage green (#84A98C)",
                "surface": "no color here"
            },
            "typography": {"heading": "'Playfair Display' - elegant serif", "body": "Inter, sans-serif"},
            "pages": [{"slug": "index", "title": "Home"}]
        });
        let bp = blueprint_from_value(&value, &request()).unwrap();
        assert_eq!(bp.colors.primary, "#c2410c");
        assert_eq!(bp.colors.accent, "#84a98c");
        assert_eq!(bp.colors.surface, ColorTokens::default().surface);
        assert_eq!(bp.typography.heading, "Playfair Display");
        assert_eq!(bp.typography.body, "Inter");
    }

    #[test]
    fn test_sections_accept_strings_and_objects() {
        let value = json!({"pages": [{"slug": "index", "title": "Home",
            "sections": ["hero", {"id": "menu"}, {"name": "testimonials"}, 7, ""]}]});
        let bp = blueprint_from_value(&value, &request()).unwrap();
        assert_eq!(bp.pages[0].sections, vec!["hero", "menu", "testimonials"]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let value = json!({
            "site_name": "Sunrise",
            "colors": {"primary": "#FF0000 bold"},
            "typography": {"heading": "Lora (serif)"},
            "pages": [{"title": "About"}, {"title": "About"}, {"title": "Contact Us"}]
        });
        let once = blueprint_from_value(&value, &request()).unwrap();
        let twice = blueprint_from_value(&serde_json::to_value(&once).unwrap(), &request()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_blueprint_wrapper_key_accepted() {
        let value = json!({"blueprint": {"site_name": "Wrapped", "pages": [{"title": "Home"}]}});
        let bp = blueprint_from_value(&value, &request()).unwrap();
        assert_eq!(bp.site_name, "Wrapped");
    }

    #[test]
    fn test_critique_parsing_is_lenient() {
        let c = critique_from_value(&json!({
            "approved": "yes",
            "score": "12",
            "issues": [
                {"severity": "HIGH", "area": "nav", "description": "missing contact", "suggestedFix": "add it"},
                "too few pages"
            ],
            "summary": " needs work "
        }));
        assert!(c.approved);
        assert_eq!(c.score, 10.0);
        assert_eq!(c.issues.len(), 2);
        assert_eq!(c.issues[0].severity, IssueSeverity::High);
        assert_eq!(c.issues[0].suggested_fix, "add it");
        assert_eq!(c.summary, "needs work");

        let empty = critique_from_value(&json!({}));
        assert!(!empty.approved);
        assert!(empty.issues.is_empty());
    }
}
