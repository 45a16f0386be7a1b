//! Generated browser test project.
//!
//! Layout written under the test project directory:
//!
//! ```text
//! package.json
//! playwright.config.js
//! tests/<slug>.spec.js          one per page
//! tests/site.integration.spec.js
//! ```
//!
//! Every test title starts with `[<slug>]` and per-page modules are named
//! after their slug, so failures can be traced back to a page.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::config::QualityConfig;
use crate::domain::blueprint::{Blueprint, PageSpec};

pub const TESTS_DIR: &str = "tests";
pub const INTEGRATION_SPEC: &str = "site.integration.spec.js";
const SPEC_SUFFIX: &str = ".spec.js";

/// Spec file name for a page.
pub fn spec_file_for(slug: &str) -> String {
    format!("{slug}{SPEC_SUFFIX}")
}

/// Inverse of [`spec_file_for`]; accepts paths such as `tests/about.spec.js`.
pub fn slug_of_spec_file(file: &str) -> Option<&str> {
    let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
    let name = name.split(':').next().unwrap_or(name);
    name.strip_suffix(SPEC_SUFFIX).filter(|s| !s.is_empty())
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Materialise the test project in `qa_dir` for the site in `site_dir`.
///
/// Returns the files written, relative to `qa_dir`. Existing files are
/// replaced so the project always matches the current page set.
pub async fn materialize(
    qa_dir: &Path,
    site_dir: &Path,
    project_name: &str,
    blueprint: &Blueprint,
    config: &QualityConfig,
) -> std::io::Result<Vec<PathBuf>> {
    let tests_dir = qa_dir.join(TESTS_DIR);
    tokio::fs::create_dir_all(&tests_dir).await?;

    let mut files = vec![
        (PathBuf::from("package.json"), package_json(project_name)),
        (
            PathBuf::from("playwright.config.js"),
            playwright_config(site_dir, config),
        ),
    ];
    for page in &blueprint.pages {
        files.push((
            Path::new(TESTS_DIR).join(spec_file_for(&page.slug)),
            page_spec(page),
        ));
    }
    files.push((
        Path::new(TESTS_DIR).join(INTEGRATION_SPEC),
        integration_spec(blueprint),
    ));

    for (path, content) in &files {
        tokio::fs::write(qa_dir.join(path), content).await?;
    }
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

fn package_json(project_name: &str) -> String {
    let manifest = json!({
        "name": format!("{project_name}-qa"),
        "private": true,
        "scripts": { "test": "playwright test" },
        "devDependencies": {
            "@axe-core/playwright": "^4.10.0",
            "@playwright/test": "^1.47.0",
            "http-server": "^14.1.1"
        }
    });
    serde_json::to_string_pretty(&manifest).unwrap_or_default() + "\n"
}

fn playwright_config(site_dir: &Path, config: &QualityConfig) -> String {
    let port = config.server_port;
    let server = format!(
        "npx http-server \"{}\" -p {port} -s -c-1",
        site_dir.display()
    );
    format!(
        r#"const {{ defineConfig }} = require('@playwright/test');

module.exports = defineConfig({{
  testDir: './{TESTS_DIR}',
  timeout: 30000,
  retries: 0,
  workers: 1,
  reporter: [['list'], ['json', {{ outputFile: {results} }}]],
  use: {{ baseURL: 'http://127.0.0.1:{port}' }},
  webServer: {{
    command: {server},
    url: 'http://127.0.0.1:{port}',
    reuseExistingServer: false,
    timeout: 60000,
  }},
}});
"#,
        results = js_string(&config.results_file),
        server = js_string(&server),
    )
}

fn page_spec(page: &PageSpec) -> String {
    let slug = &page.slug;
    let route = js_string(&format!("/{}", page.filename()));
    format!(
        r##"const {{ test, expect }} = require('@playwright/test');
const AxeBuilder = require('@axe-core/playwright').default;

const ROUTE = {route};

test('[{slug}] has visible content', async ({{ page }}) => {{
  await page.goto(ROUTE);
  const main = page.locator('main');
  await expect(main).toBeVisible();
  const text = (await main.innerText()).trim();
  expect(text.length).toBeGreaterThan(40);
}});

test('[{slug}] no horizontal overflow on mobile', async ({{ page }}) => {{
  await page.setViewportSize({{ width: 375, height: 812 }});
  await page.goto(ROUTE);
  const widths = await page.evaluate(() => [document.documentElement.scrollWidth, window.innerWidth]);
  if (widths[0] > widths[1] + 1) {{
    console.log(`OVERFLOW page={slug} scrollWidth=${{widths[0]}} viewport=${{widths[1]}}`);
  }}
  expect(widths[0]).toBeLessThanOrEqual(widths[1] + 1);
}});

test('[{slug}] no critical accessibility violations', async ({{ page }}) => {{
  await page.goto(ROUTE);
  const results = await new AxeBuilder({{ page }}).analyze();
  const blocking = results.violations.filter((v) => v.impact === 'critical' || v.impact === 'serious');
  for (const v of blocking) {{
    console.log(`A11Y_VIOLATION page={slug} rule=${{v.id}} impact=${{v.impact}} nodes=${{v.nodes.length}}`);
  }}
  expect(blocking.map((v) => v.id)).toEqual([]);
}});

test('[{slug}] no placeholder anchors', async ({{ page }}) => {{
  await page.goto(ROUTE);
  const count = await page.locator('a[href="#"]').count();
  if (count > 0) {{
    console.log(`PLACEHOLDER_ANCHOR page={slug} count=${{count}}`);
  }}
  expect(count).toBe(0);
}});
"##
    )
}

fn integration_spec(blueprint: &Blueprint) -> String {
    let pages: Vec<_> = blueprint
        .pages
        .iter()
        .map(|p| json!({ "slug": p.slug, "route": format!("/{}", p.filename()) }))
        .collect();
    let pages = serde_json::to_string_pretty(&pages).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"const {{ test, expect }} = require('@playwright/test');

const PAGES = {pages};
const EXTERNAL = /^(https?:|mailto:|tel:|sms:|data:|javascript:|\/\/|#)/i;

for (const {{ slug, route }} of PAGES) {{
  test(`[${{slug}}] shared nav and footer present`, async ({{ page }}) => {{
    await page.goto(route);
    await expect(page.locator('nav').first()).toBeVisible();
    await expect(page.locator('footer').first()).toBeAttached();
  }});

  test(`[${{slug}}] internal links resolve`, async ({{ page, request }}) => {{
    await page.goto(route);
    const hrefs = await page.$$eval('a[href]', (anchors) => anchors.map((a) => a.getAttribute('href')));
    for (const href of hrefs) {{
      if (!href || EXTERNAL.test(href)) continue;
      const response = await request.get(new URL(href, page.url()).toString());
      expect(response.status(), `page=${{slug}} href=${{href}}`).toBeLessThan(400);
    }}
  }});
}}
"#
    )
}
