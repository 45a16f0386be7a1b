//! Design System Generator.
//!
//! One inference call turns the final [`Blueprint`] into a [`DesignSystem`].
//! The response must carry every key in [`REQUIRED_KEYS`]; a missing key is
//! fatal and never retried. Optional keys fall back to defaults. The
//! contrast pass then darkens every interactive color that fails against
//! white and rewrites the original hex everywhere in the shared markup.

pub mod contrast;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::blueprint::Blueprint;
use crate::domain::design::{DesignSystem, DEFAULT_NAV_ACTIVE_CLASS, DEFAULT_NAV_INACTIVE_CLASS};
use crate::domain::error::{BuildError, Result};
use crate::inference::{CompletionRequest, InferenceClient, Message};
use crate::obs;

pub use contrast::{
    contrast_against_white, contrast_ratio, correct_color, rewrite_hex, same_color,
    ColorCorrection, Rgb, MIN_CONTRAST,
};

/// Keys the design response must contain.
pub const REQUIRED_KEYS: [&str; 4] = ["token_config", "font_link", "nav_html", "footer_html"];

/// Interactive roles subject to contrast correction.
pub const INTERACTIVE_ROLES: [&str; 3] = ["primary", "accent", "cta"];

const DEFAULT_BODY_CLASS: &str = "min-h-screen flex flex-col antialiased";

const SYSTEM_PROMPT: &str = "You are a senior web designer producing a shared design system for a \
static multi-page website. Respond with a single JSON object and nothing else. Required keys: \
token_config (markup placed in every <head>, such as a Tailwind config script or a :root CSS \
variable block), font_link (stylesheet <link> markup for the fonts), nav_html (a <nav> element \
linking every page by filename, where each link's class attribute is exactly \
{{active:<slug>}} for that page's slug), footer_html (a <footer> element). Optional keys: \
custom_css, body_class, nav_active_class, nav_inactive_class, interactive_colors (object with \
primary, accent and cta hex values). Never use href=\"#\".";

/// Generates the shared design contract.
#[derive(Debug, Clone)]
pub struct DesignGenerator {
    client: InferenceClient,
    temperature: f32,
    max_tokens: u32,
}

impl DesignGenerator {
    pub fn new(client: InferenceClient, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
        }
    }

    #[instrument(skip_all, fields(site = %blueprint.site_name))]
    pub async fn generate(&self, blueprint: &Blueprint) -> Result<DesignSystem> {
        let request = CompletionRequest::new(
            "design.system",
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(design_prompt(blueprint)?),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let value = self.client.complete_json(&request).await?;
        design_from_value(&value, blueprint)
    }
}

fn design_prompt(blueprint: &Blueprint) -> Result<String> {
    let pages: Vec<Value> = blueprint
        .pages
        .iter()
        .map(|p| {
            serde_json::json!({
                "slug": p.slug,
                "filename": p.filename(),
                "nav_label": p.nav_label,
            })
        })
        .collect();

    Ok(format!(
        "Site: {}\nTagline: {}\nBrand voice: {}\nColors: {}\nTypography: {}\nPages (in nav order): {}\n\n\
         Produce the design system JSON.",
        blueprint.site_name,
        blueprint.tagline,
        blueprint.brand_voice,
        serde_json::to_string(&blueprint.colors)?,
        serde_json::to_string(&blueprint.typography)?,
        serde_json::to_string(&pages)?,
    ))
}

/// Build a [`DesignSystem`] from a parsed response and apply contrast
/// correction.
pub fn design_from_value(value: &Value, blueprint: &Blueprint) -> Result<DesignSystem> {
    let required = |key: &str| -> Result<String> {
        match value.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(BuildError::MissingDesignKey(key.to_string())),
        }
    };
    let optional = |key: &str, default: &str| -> String {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let mut design = DesignSystem {
        token_config: required("token_config")?,
        font_link: required("font_link")?,
        nav_html: required("nav_html")?,
        footer_html: required("footer_html")?,
        custom_css: optional("custom_css", ""),
        body_class: optional("body_class", DEFAULT_BODY_CLASS),
        nav_active_class: optional("nav_active_class", DEFAULT_NAV_ACTIVE_CLASS),
        nav_inactive_class: optional("nav_inactive_class", DEFAULT_NAV_INACTIVE_CLASS),
        interactive_colors: interactive_colors(value, blueprint),
    };

    enforce_contrast(&mut design);
    Ok(design)
}

fn interactive_colors(value: &Value, blueprint: &Blueprint) -> BTreeMap<String, String> {
    let declared = value.get("interactive_colors");
    let fallback = |role: &str| match role {
        "accent" => blueprint.colors.accent.clone(),
        _ => blueprint.colors.primary.clone(),
    };

    INTERACTIVE_ROLES
        .iter()
        .map(|role| {
            let color = declared
                .and_then(|d| d.get(*role))
                .and_then(Value::as_str)
                .filter(|c| Rgb::parse(c).is_some())
                .map(str::to_string)
                .unwrap_or_else(|| fallback(role));
            (role.to_string(), color)
        })
        .collect()
}

/// Darken every non-compliant interactive color and rewrite its original
/// hex throughout the shared markup. Returns the corrections applied.
pub fn enforce_contrast(design: &mut DesignSystem) -> Vec<ColorCorrection> {
    let mut applied = Vec::new();

    let roles: Vec<String> = design.interactive_colors.keys().cloned().collect();
    for role in roles {
        let Some(color) = design.interactive_colors.get(&role).cloned() else {
            continue;
        };
        let Some(fix) = correct_color(&color) else {
            debug!(role = %role, color = %color, "Skipping unparsable interactive color");
            continue;
        };
        if !fix.changed() {
            continue;
        }

        obs::emit_contrast_corrected(&role, &fix.original, &fix.corrected, fix.ratio_after);
        for text in [
            &mut design.token_config,
            &mut design.custom_css,
            &mut design.nav_html,
            &mut design.footer_html,
        ] {
            *text = rewrite_hex(text, &fix.original, &fix.corrected);
        }
        // Several roles may share one color.
        for value in design.interactive_colors.values_mut() {
            if same_color(value, &fix.original) {
                *value = fix.corrected.clone();
            }
        }
        applied.push(fix);
    }

    applied
}
