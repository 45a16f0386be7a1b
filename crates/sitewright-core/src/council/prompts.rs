//! Message builders for the Proposer and Reviewer roles.

use crate::domain::blueprint::Blueprint;
use crate::domain::critique::Critique;
use crate::domain::error::Result;
use crate::domain::request::ClientRequest;
use crate::inference::Message;

const PROPOSER_SYSTEM: &str = "You are a website strategist. Plan a small static marketing \
website for the client. Respond with one JSON object and nothing else, with keys: site_name, \
tagline, brand_voice, colors {primary, accent, surface, text} as hex values, typography \
{heading, body} as font family names, and pages: an ordered array of {slug, title, nav_label, \
purpose, sections (array of section ids), content_guidance}. The home page must use slug \
\"index\". Include a page with slug \"contact\".";

const REVIEWER_SYSTEM: &str = "You are a critical reviewer of website plans. Judge whether the \
plan serves the client's goals, covers the pages a visitor expects, and uses accessible colors. \
Respond with one JSON object and nothing else: {approved: bool, score: number 0-10, issues: \
[{severity: high|medium|low, area, description, suggested_fix}], summary}. Approve only when no \
high-severity issue remains.";

fn brief(request: &ClientRequest) -> String {
    format!(
        "Business name: {}\nNiche: {}\nGoals: {}\nContact email: {}",
        request.business_name, request.niche, request.goals, request.contact_email
    )
}

/// Round 1: plan from scratch.
pub fn propose(request: &ClientRequest) -> Vec<Message> {
    vec![
        Message::system(PROPOSER_SYSTEM),
        Message::user(format!("{}\n\nPropose the site blueprint.", brief(request))),
    ]
}

/// Later rounds: full replacement addressing every issue.
pub fn revise(
    request: &ClientRequest,
    previous: &Blueprint,
    critique: &Critique,
) -> Result<Vec<Message>> {
    let issues = critique
        .issues
        .iter()
        .enumerate()
        .map(|(i, issue)| {
            format!(
                "{}. [{:?}] {}: {} (fix: {})",
                i + 1,
                issue.severity,
                issue.area,
                issue.description,
                issue.suggested_fix
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(vec![
        Message::system(PROPOSER_SYSTEM),
        Message::user(format!(
            "{}\n\nPrevious blueprint:\n{}\n\nReviewer score: {:.1}\nReviewer summary: {}\nIssues:\n{}\n\n\
             Return a complete replacement blueprint that addresses every issue.",
            brief(request),
            serde_json::to_string_pretty(previous)?,
            critique.score,
            critique.summary,
            if issues.is_empty() { "(none listed)".to_string() } else { issues },
        )),
    ])
}

pub fn review(request: &ClientRequest, blueprint: &Blueprint) -> Result<Vec<Message>> {
    Ok(vec![
        Message::system(REVIEWER_SYSTEM),
        Message::user(format!(
            "{}\n\nBlueprint under review:\n{}",
            brief(request),
            serde_json::to_string_pretty(blueprint)?
        )),
    ])
}
