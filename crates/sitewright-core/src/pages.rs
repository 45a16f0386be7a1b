//! Page Generator.
//!
//! One inference call per [`PageSpec`]. The response is reduced to a
//! `<main>` fragment and wrapped with the shared head, nav, and footer from
//! the [`DesignSystem`]. Any failure for a page produces a deterministic
//! fallback page instead of aborting the build.
//!
//! Pages are independent once the design system is fixed, so generation may
//! run with bounded concurrency (`generation.max_concurrency`). Output
//! always follows Blueprint page order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::domain::blueprint::{Blueprint, PageSpec, CONTACT_SLUG};
use crate::domain::design::DesignSystem;
use crate::domain::page::{PageArtifact, PageStatus};
use crate::domain::request::ClientRequest;
use crate::events::{BuildEvent, EventSink};
use crate::inference::{CompletionRequest, InferenceClient, InferenceError, Message};
use crate::markup::{escape_attr, escape_html, extract_main, wrap_fragment};
use crate::obs;

const SYSTEM_PROMPT: &str = "You write the content of one page of a static website. Return only \
a single <main> element containing <section> elements; do not include <html>, <head>, <nav> or \
<footer>, which are shared across pages. Use the provided design tokens and utility classes. \
Every link must point at a real page filename, a mailto: address, or an external URL; never \
use href=\"#\". Images need alt text. Content must not overflow narrow screens.";

/// Generates every page of the site.
#[derive(Debug, Clone)]
pub struct PageGenerator {
    client: InferenceClient,
    temperature: f32,
    max_tokens: u32,
    max_concurrency: usize,
}

impl PageGenerator {
    pub fn new(client: InferenceClient, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
            max_concurrency: 1,
        }
    }

    /// Allow up to `limit` pages in flight at once.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Generate one artifact per page, in Blueprint order.
    #[instrument(skip_all, fields(pages = blueprint.pages.len(), concurrency = self.max_concurrency))]
    pub async fn generate_all(
        &self,
        request: &ClientRequest,
        blueprint: &Blueprint,
        design: Arc<DesignSystem>,
        events: &EventSink,
    ) -> Vec<PageArtifact> {
        let total = blueprint.pages.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let tasks = blueprint.pages.iter().enumerate().map(|(index, page)| {
            let semaphore = Arc::clone(&semaphore);
            let design = Arc::clone(&design);
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let artifact = self.generate_page(request, page, blueprint, &design).await;
                obs::emit_page_generated(&artifact.slug, &artifact.status.to_string(), artifact.byte_size);
                events.emit(BuildEvent::PageGenerated {
                    slug: artifact.slug.clone(),
                    status: artifact.status,
                    index: index + 1,
                    total,
                });
                artifact
            }
        });

        join_all(tasks).await
    }

    /// Generate a single page, falling back on any failure.
    pub async fn generate_page(
        &self,
        request: &ClientRequest,
        page: &PageSpec,
        blueprint: &Blueprint,
        design: &DesignSystem,
    ) -> PageArtifact {
        match self.generate_body(request, page, blueprint, design).await {
            Ok(body) => PageArtifact::new(
                &page.slug,
                design.wrap(page, blueprint, &body),
                PageStatus::Generated,
            ),
            Err(e) => {
                warn!(slug = %page.slug, error = %e, "Page generation failed; using fallback");
                fallback_page(request, page, blueprint, design)
            }
        }
    }

    async fn generate_body(
        &self,
        request: &ClientRequest,
        page: &PageSpec,
        blueprint: &Blueprint,
        design: &DesignSystem,
    ) -> Result<String, InferenceError> {
        let prompt = page_prompt(request, page, blueprint, design);
        let completion = CompletionRequest::new(
            format!("page.generate:{}", page.slug),
            vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let text = self.client.complete(&completion).await?;
        extract_body(&text)
    }
}

fn page_prompt(
    request: &ClientRequest,
    page: &PageSpec,
    blueprint: &Blueprint,
    design: &DesignSystem,
) -> String {
    let siblings = blueprint
        .pages
        .iter()
        .map(|p| format!("{} ({})", p.nav_label, p.filename()))
        .collect::<Vec<_>>()
        .join(", ");
    let colors = design
        .interactive_colors
        .iter()
        .map(|(role, hex)| format!("{role}={hex}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Business: {business} ({niche})\nGoals: {goals}\nContact email: {email}\n\
         Site: {site} - {tagline}\nBrand voice: {voice}\n\
         Page: {title} ({filename})\nPurpose: {purpose}\nSections in order: {sections}\n\
         Content guidance: {guidance}\nOther pages: {siblings}\n\
         Interactive colors (accessible on white): {colors}\nBody class: {body_class}\n\
         Design tokens:\n{tokens}",
        business = request.business_name,
        niche = request.niche,
        goals = request.goals,
        email = request.contact_email,
        site = blueprint.site_name,
        tagline = blueprint.tagline,
        voice = blueprint.brand_voice,
        title = page.title,
        filename = page.filename(),
        purpose = page.purpose,
        sections = page.sections.join(", "),
        guidance = page.content_guidance,
        body_class = design.body_class,
        tokens = design.token_config,
    )
}

/// Reduce model output to a `<main>` fragment.
///
/// Text with no markup at all is an extraction failure.
pub fn extract_body(text: &str) -> Result<String, InferenceError> {
    if let Some(main) = extract_main(text) {
        return Ok(main);
    }
    let has_tag = text
        .split('<')
        .skip(1)
        .any(|rest| rest.starts_with(|c: char| c.is_ascii_alphabetic()));
    if !has_tag {
        return Err(InferenceError::extraction(
            "html",
            "response contains no markup",
            text,
        ));
    }
    Ok(wrap_fragment(text))
}

/// Link target for a page's call to action: the contact page when the site
/// has one (and this is not it), otherwise the contact email.
pub fn contact_href(request: &ClientRequest, page: &PageSpec, blueprint: &Blueprint) -> String {
    if blueprint.has_page(CONTACT_SLUG) && page.slug != CONTACT_SLUG {
        crate::domain::blueprint::page_filename(CONTACT_SLUG)
    } else {
        format!("mailto:{}", request.contact_email)
    }
}

/// Deterministic minimal page built from the design system alone.
pub fn fallback_page(
    request: &ClientRequest,
    page: &PageSpec,
    blueprint: &Blueprint,
    design: &DesignSystem,
) -> PageArtifact {
    let cta_color = design
        .interactive_colors
        .get("cta")
        .or_else(|| design.interactive_colors.get("primary"))
        .cloned()
        .unwrap_or_else(|| blueprint.colors.primary.clone());
    let lead = if page.purpose.trim().is_empty() {
        blueprint.tagline.as_str()
    } else {
        page.purpose.as_str()
    };

    let body = format!(
        "<main class=\"px-6 py-16\">\n\
         <section class=\"mx-auto max-w-3xl text-center\">\n\
         <h1 class=\"text-4xl font-bold\">{title}</h1>\n\
         <p class=\"mt-4 text-lg\">{lead}</p>\n\
         <a href=\"{href}\" class=\"inline-block mt-8 px-6 py-3 rounded font-semibold\" \
         style=\"background-color:{color};color:#ffffff\">Contact {site}</a>\n\
         </section>\n\
         </main>",
        title = escape_html(&page.title),
        lead = escape_html(lead),
        href = escape_attr(&contact_href(request, page, blueprint)),
        color = escape_attr(&cta_color),
        site = escape_html(&blueprint.site_name),
    );

    PageArtifact::new(
        &page.slug,
        design.wrap(page, blueprint, &body),
        PageStatus::Fallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{ColorTokens, TypographyTokens};
    use crate::domain::design::{DEFAULT_NAV_ACTIVE_CLASS, DEFAULT_NAV_INACTIVE_CLASS};
    use crate::fakes::{ScriptedBackend, ScriptedReply};
    use crate::inference::RetryPolicy;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn spec(slug: &str) -> PageSpec {
        PageSpec {
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            nav_label: slug.to_string(),
            purpose: format!("{slug} purpose"),
            sections: vec!["hero".to_string()],
            content_guidance: String::new(),
        }
    }

    fn blueprint(slugs: &[&str]) -> Blueprint {
        Blueprint {
            site_name: "Sunrise Bakery".to_string(),
            tagline: "Fresh bread".to_string(),
            brand_voice: "warm".to_string(),
            colors: ColorTokens::default(),
            typography: TypographyTokens::default(),
            pages: slugs.iter().map(|s| spec(s)).collect(),
        }
    }

    fn design() -> DesignSystem {
        DesignSystem {
            token_config: "<style>:root{--primary:#1d4ed8}</style>".to_string(),
            font_link: String::new(),
            nav_html: "<nav><a href=\"index.html\" class=\"{{active:index}}\">Home</a></nav>".to_string(),
            footer_html: "<footer>Sunrise</footer>".to_string(),
            custom_css: String::new(),
            body_class: String::new(),
            nav_active_class: DEFAULT_NAV_ACTIVE_CLASS.to_string(),
            nav_inactive_class: DEFAULT_NAV_INACTIVE_CLASS.to_string(),
            interactive_colors: BTreeMap::from([("cta".to_string(), "#1d4ed8".to_string())]),
        }
    }

    fn request() -> ClientRequest {
        ClientRequest::new("Sunrise Bakery", "bakery", "sell bread", "hello@sunrise.test")
    }

    fn client(backend: Arc<ScriptedBackend>) -> InferenceClient {
        InferenceClient::new(backend).with_policy(RetryPolicy {
            max_retries: 2,
            backoff_unit: Duration::ZERO,
        })
    }

    #[test]
    fn test_extract_body_variants() {
        assert_eq!(
            extract_body("Sure!\n<main><h1>x</h1></main>\nDone").unwrap(),
            "<main><h1>x</h1></main>"
        );
        let wrapped = extract_body("<section>a</section><section>b</section>").unwrap();
        assert!(wrapped.starts_with("<main>"));
        assert!(wrapped.contains("<section>b</section>"));
        let raw = extract_body("<h2>Hours</h2><p>Daily</p>").unwrap();
        assert!(raw.contains("<h2>Hours</h2>"));
        assert!(extract_body("I cannot help with that.").is_err());
        assert!(extract_body("3 < 4").is_err());
    }

    #[test]
    fn test_contact_href() {
        let with_contact = blueprint(&["index", "contact"]);
        assert_eq!(contact_href(&request(), &spec("index"), &with_contact), "contact.html");
        assert_eq!(
            contact_href(&request(), &spec("contact"), &with_contact),
            "mailto:hello@sunrise.test"
        );
        let without = blueprint(&["index"]);
        assert_eq!(contact_href(&request(), &spec("index"), &without), "mailto:hello@sunrise.test");
    }

    #[test]
    fn test_fallback_page_is_complete() {
        let bp = blueprint(&["index", "about", "contact"]);
        let page = fallback_page(&request(), &bp.pages[1], &bp, &design());
        assert_eq!(page.status, PageStatus::Fallback);
        let html = page.render();
        assert!(html.contains("<h1 class=\"text-4xl font-bold\">ABOUT</h1>"));
        assert!(html.contains("href=\"contact.html\""));
        assert!(html.contains("<nav>"));
        assert!(html.contains("<footer>Sunrise</footer>"));
        assert!(!html.contains("href=\"#\""));
    }

    #[tokio::test]
    async fn test_failure_yields_fallback_and_continues() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_for("page.generate:index", ScriptedReply::Text("<main><h1>Home</h1></main>".into()));
        for _ in 0..3 {
            backend.push_for(
                "page.generate:about",
                ScriptedReply::Error(InferenceError::Timeout {
                    duration: Duration::from_secs(1),
                }),
            );
        }
        backend.push_for("page.generate:contact", ScriptedReply::Text("<main><h1>Contact</h1></main>".into()));

        let bp = blueprint(&["index", "about", "contact"]);
        let (events, mut rx) = EventSink::channel();
        let pages = PageGenerator::new(client(backend), 0.7, 4096)
            .generate_all(&request(), &bp, Arc::new(design()), &events)
            .await;

        let statuses: Vec<_> = pages.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![PageStatus::Generated, PageStatus::Fallback, PageStatus::Generated]
        );
        assert!(pages[1].render().contains("href=\"contact.html\""));
        assert_eq!(crate::events::drain(&mut rx).len(), 3);
    }

    #[tokio::test]
    async fn test_parallel_generation_keeps_order() {
        let backend = Arc::new(ScriptedBackend::new());
        for slug in ["index", "about", "menu", "contact"] {
            backend.always_for(&format!("page.generate:{slug}"), &format!("<main><h1>{slug}</h1></main>"));
        }
        let bp = blueprint(&["index", "about", "menu", "contact"]);
        let pages = PageGenerator::new(client(backend), 0.7, 4096)
            .with_max_concurrency(3)
            .generate_all(&request(), &bp, Arc::new(design()), &EventSink::disabled())
            .await;
        let slugs: Vec<_> = pages.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["index", "about", "menu", "contact"]);
        assert!(pages[2].document.body.contains("<h1>menu</h1>"));
    }
}
