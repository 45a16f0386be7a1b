//! Assembler: deterministic cross-page stitching. No inference calls.
//!
//! Steps, in order:
//! 1. resolve nav active-state placeholders per page (leftovers become inactive)
//! 2. `sitemap.xml` with today's date (root 1.0, others 0.8)
//! 3. `robots.txt` pointing at the sitemap
//! 4. `404.html` reusing the shared nav and footer
//! 5. broken-link scan (missing internal targets and `href="#"`), advisory only

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::domain::blueprint::{Blueprint, PageSpec, ROOT_SLUG};
use crate::domain::design::DesignSystem;
use crate::domain::page::PageArtifact;
use crate::markup::{escape_attr, escape_html};
use crate::obs;

pub const SITEMAP_FILE: &str = "sitemap.xml";
pub const ROBOTS_FILE: &str = "robots.txt";
pub const NOT_FOUND_FILE: &str = "404.html";

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*active\s*:\s*([A-Za-z0-9_-]*)\s*\}\}").expect("Invalid placeholder regex")
    })
}

fn leftover_pattern() -> &'static Regex {
    static LEFTOVER: OnceLock<Regex> = OnceLock::new();
    LEFTOVER.get_or_init(|| Regex::new(r"\{\{\s*active[^}]*\}\}").expect("Invalid leftover regex"))
}

fn href_pattern() -> &'static Regex {
    static HREF: OnceLock<Regex> = OnceLock::new();
    HREF.get_or_init(|| {
        Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid href regex")
    })
}

/// Resolve every `{{active:<slug>}}` placeholder in `nav` for `current`.
///
/// Placeholders naming `current` become `active`, all others `inactive`;
/// anything placeholder-like that remains is forced to `inactive`.
pub fn resolve_nav(nav: &str, current: &str, active: &str, inactive: &str) -> String {
    let resolved = placeholder_pattern().replace_all(nav, |caps: &Captures<'_>| {
        if caps[1].eq_ignore_ascii_case(current) {
            active.to_string()
        } else {
            inactive.to_string()
        }
    });
    leftover_pattern()
        .replace_all(&resolved, inactive.replace('$', "$$").as_str())
        .into_owned()
}

/// Why a link was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkProblem {
    /// Internal link to a file that is not part of the output.
    MissingTarget,
    /// Literal `href="#"`.
    PlaceholderAnchor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub page: String,
    pub href: String,
    pub problem: LinkProblem,
}

/// What the assembler produced and found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    /// Extra files written next to the pages.
    pub files: Vec<String>,
    pub broken_links: Vec<BrokenLink>,
}

impl AssemblyReport {
    pub fn broken_link_count(&self) -> usize {
        self.broken_links.len()
    }
}

/// Extra site file produced by assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub name: String,
    pub content: String,
}

/// Output of [`Assembler::assemble`]: support files plus the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub files: Vec<SiteFile>,
    pub report: AssemblyReport,
}

/// Deterministic site assembler.
#[derive(Debug, Clone)]
pub struct Assembler {
    /// Absolute site URL with trailing slash, or empty for relative output.
    base_url: String,
}

impl Assembler {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into().trim().to_string();
        if !base_url.is_empty() && !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url }
    }

    /// Public URL of a site file.
    pub fn url_for(&self, filename: &str) -> String {
        if filename == crate::domain::blueprint::page_filename(ROOT_SLUG) {
            if self.base_url.is_empty() {
                "/".to_string()
            } else {
                self.base_url.clone()
            }
        } else if self.base_url.is_empty() {
            format!("/{filename}")
        } else {
            format!("{}{filename}", self.base_url)
        }
    }

    /// Run all steps. Pages are updated in place (nav resolution only).
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn assemble(
        &self,
        blueprint: &Blueprint,
        design: &DesignSystem,
        pages: &mut [PageArtifact],
        today: NaiveDate,
    ) -> Assembly {
        for page in pages.iter_mut() {
            let nav = resolve_nav(
                &page.document.nav,
                &page.slug,
                &design.nav_active_class,
                &design.nav_inactive_class,
            );
            if nav != page.document.nav {
                let mut document = page.document.clone();
                document.nav = nav;
                let status = page.status;
                page.update(document, status);
            }
        }

        let files = vec![
            SiteFile {
                name: SITEMAP_FILE.to_string(),
                content: self.sitemap(pages, today),
            },
            SiteFile {
                name: ROBOTS_FILE.to_string(),
                content: self.robots(),
            },
            SiteFile {
                name: NOT_FOUND_FILE.to_string(),
                content: not_found_page(blueprint, design),
            },
        ];

        let mut known: HashSet<String> = pages.iter().map(|p| p.filename.clone()).collect();
        known.extend(files.iter().map(|f| f.name.clone()));
        let broken_links = scan_links(pages, &known);
        for link in &broken_links {
            warn!(page = %link.page, href = %link.href, problem = ?link.problem, "Broken link");
            obs::emit_advisory("broken_link", &format!("{} -> {}", link.page, link.href));
        }

        Assembly {
            report: AssemblyReport {
                files: files.iter().map(|f| f.name.clone()).collect(),
                broken_links,
            },
            files,
        }
    }

    fn sitemap(&self, pages: &[PageArtifact], today: NaiveDate) -> String {
        let date = today.format("%Y-%m-%d");
        let entries: String = pages
            .iter()
            .map(|p| {
                let priority = if p.slug == ROOT_SLUG { "1.0" } else { "0.8" };
                format!(
                    "  <url>\n    <loc>{}</loc>\n    <lastmod>{date}</lastmod>\n    <priority>{priority}</priority>\n  </url>\n",
                    escape_html(&self.url_for(&p.filename))
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{entries}</urlset>\n"
        )
    }

    fn robots(&self) -> String {
        format!(
            "User-agent: *\nAllow: /\n\nSitemap: {}\n",
            self.url_for(SITEMAP_FILE)
        )
    }

    /// Write pages and support files into `dir`.
    pub async fn write(dir: &Path, pages: &[PageArtifact], assembly: &Assembly) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        for page in pages {
            page.write_to(dir).await?;
        }
        for file in &assembly.files {
            tokio::fs::write(dir.join(&file.name), &file.content).await?;
        }
        Ok(())
    }
}

fn not_found_page(blueprint: &Blueprint, design: &DesignSystem) -> String {
    let spec = PageSpec {
        slug: "404".to_string(),
        title: "Page not found".to_string(),
        nav_label: String::new(),
        purpose: "The page you were looking for does not exist.".to_string(),
        sections: Vec::new(),
        content_guidance: String::new(),
    };
    let body = format!(
        "<main class=\"px-6 py-24 text-center\">\n\
         <section>\n<h1 class=\"text-4xl font-bold\">Page not found</h1>\n\
         <p class=\"mt-4\">Sorry, that page does not exist.</p>\n\
         <a href=\"{home}\" class=\"inline-block mt-8 underline\">Back to {site}</a>\n\
         </section>\n</main>",
        home = escape_attr(&crate::domain::blueprint::page_filename(ROOT_SLUG)),
        site = escape_html(&blueprint.site_name),
    );
    let mut document = design.wrap(&spec, blueprint, &body);
    // No page is current on the 404 page.
    document.nav = resolve_nav(&document.nav, "", &design.nav_active_class, &design.nav_inactive_class);
    document.render()
}

/// Internal page target of `href`, or `None` for external, fragment, and
/// special links. Assets (`.css`, `.jpg`, `favicon.ico`) are not pages.
fn internal_target(href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    let external = ["http:", "https:", "mailto:", "tel:", "//", "data:", "javascript:", "sms:"];
    if href.is_empty() || href.starts_with('#') || external.iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    let path = href.split(['#', '?']).next().unwrap_or_default();
    let path = path.trim_start_matches("./").trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        return Some(format!("{path}index.html"));
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    let is_page = match name.rsplit_once('.') {
        Some((_, ext)) => ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"),
        None => true,
    };
    is_page.then(|| path.to_string())
}

/// Flag internal links whose target is not in `known` and literal `href="#"`.
pub fn scan_links(pages: &[PageArtifact], known: &HashSet<String>) -> Vec<BrokenLink> {
    let mut broken = Vec::new();
    for page in pages {
        let html = page.render();
        for caps in href_pattern().captures_iter(&html) {
            let href = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if href.trim() == "#" {
                broken.push(BrokenLink {
                    page: page.slug.clone(),
                    href: href.to_string(),
                    problem: LinkProblem::PlaceholderAnchor,
                });
                continue;
            }
            let Some(target) = internal_target(href) else {
                continue;
            };
            let resolves = known.contains(&target)
                || (!target.contains('.') && known.contains(&format!("{target}.html")));
            if !resolves {
                broken.push(BrokenLink {
                    page: page.slug.clone(),
                    href: href.to_string(),
                    problem: LinkProblem::MissingTarget,
                });
            }
        }
    }
    broken
}
