//! Sitewright Publish
//!
//! Hosting and notification collaborators for the build orchestrator:
//!
//! - [`GithubPublisher`] creates a GitHub repository through the `gh` CLI,
//!   commits the site with `git`, and enables GitHub Pages.
//! - [`LocalPublisher`] writes into a plain directory and reports a
//!   `file://` URL.
//! - [`WebhookNotifier`] posts the build outcome as JSON.
//!
//! [`publisher_for`] picks the publisher named by `[publish].mode`.

pub mod error;
pub mod github;
pub mod local;
pub mod webhook;

use std::sync::Arc;

use sitewright_core::{Publisher, PublishMode, ProcessRunner, SitewrightConfig};

pub use error::{PublishError, Result};
pub use github::GithubPublisher;
pub use local::LocalPublisher;
pub use webhook::WebhookNotifier;

/// Publisher for the configured mode, rooted at `[site].work_dir`.
pub fn publisher_for(config: &SitewrightConfig, runner: Arc<dyn ProcessRunner>) -> Arc<dyn Publisher> {
    match config.publish.mode {
        PublishMode::Local => Arc::new(LocalPublisher::new(&config.site.work_dir)),
        PublishMode::Github => Arc::new(GithubPublisher::new(
            runner,
            config.publish.clone(),
            &config.site.work_dir,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitewright_core::fakes::ScriptedRunner;

    #[test]
    fn test_publisher_for_mode() {
        let runner: Arc<dyn ProcessRunner> = Arc::new(ScriptedRunner::new());
        let mut config = SitewrightConfig::default();
        assert_eq!(publisher_for(&config, Arc::clone(&runner)).name(), "local");

        config.publish.mode = PublishMode::Github;
        assert_eq!(publisher_for(&config, runner).name(), "github");
    }
}
