//! Shared visual contract consumed by every page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::blueprint::{Blueprint, PageSpec};
use crate::markup::{escape_attr, escape_html, PageDocument};

/// Default class applied to the active navigation link.
pub const DEFAULT_NAV_ACTIVE_CLASS: &str = "text-white font-semibold border-b-2 border-current";

/// Default class applied to inactive navigation links.
pub const DEFAULT_NAV_INACTIVE_CLASS: &str = "opacity-80 hover:opacity-100";

/// Design tokens and shared markup. Immutable once produced; pages hold
/// their own rendered copies of nav and footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSystem {
    /// Token configuration markup placed in every `<head>` (for example a
    /// utility-CSS config script or a `:root` custom-property block).
    pub token_config: String,
    /// Font stylesheet reference markup.
    pub font_link: String,
    /// Navigation template with `{{active:<slug>}}` placeholders.
    pub nav_html: String,
    pub footer_html: String,
    pub custom_css: String,
    pub body_class: String,
    pub nav_active_class: String,
    pub nav_inactive_class: String,
    /// Interactive role (`primary`, `accent`, `cta`) to hex color, after
    /// contrast correction.
    pub interactive_colors: BTreeMap<String, String>,
}

impl DesignSystem {
    /// Inner `<head>` markup for one page.
    pub fn head_for(&self, page: &PageSpec, blueprint: &Blueprint) -> String {
        let title = if page.is_root() {
            format!("{} | {}", blueprint.site_name, blueprint.tagline)
        } else {
            format!("{} | {}", page.title, blueprint.site_name)
        };

        let mut head = vec![
            "<meta charset=\"utf-8\">".to_string(),
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">".to_string(),
            format!("<title>{}</title>", escape_html(title.trim_end_matches(" | "))),
            format!(
                "<meta name=\"description\" content=\"{}\">",
                escape_attr(&page.purpose)
            ),
        ];
        if !self.font_link.trim().is_empty() {
            head.push(self.font_link.trim().to_string());
        }
        if !self.token_config.trim().is_empty() {
            head.push(self.token_config.trim().to_string());
        }
        if !self.custom_css.trim().is_empty() {
            head.push(format!("<style>\n{}\n</style>", self.custom_css.trim()));
        }
        head.join("\n")
    }

    /// Wrap a `<main>` fragment with the shared head, nav, and footer.
    pub fn wrap(&self, page: &PageSpec, blueprint: &Blueprint, body: &str) -> PageDocument {
        PageDocument::new(
            self.head_for(page, blueprint),
            self.body_class.clone(),
            self.nav_html.clone(),
            body,
            self.footer_html.clone(),
        )
    }
}
