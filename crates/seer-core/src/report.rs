//! Digest generation: a human-readable markdown report and an analyst prompt
//! over the same opportunity window. Both artifacts are pure functions of
//! their inputs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::truncate_chars;

const HUMAN_ITEM_LIMIT: usize = 20;
const HUMAN_DESCRIPTION_LIMIT: usize = 300;
const PROMPT_ITEM_LIMIT: usize = 30;
const PROMPT_DESCRIPTION_LIMIT: usize = 500;

/// A stored opportunity, projected down to the fields a digest needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReportItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub source_type: String,
    pub source_url: String,
    pub score: i64,
    pub signals: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub opportunity_count: usize,
    pub content_human: String,
    pub content_prompt: String,
    pub opportunities: Vec<ReportItem>,
}

pub struct Generator;

impl Generator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        opportunities: &[ReportItem],
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Report {
        let mut sorted = opportunities.to_vec();
        // Stable sort: ties keep their input order.
        sorted.sort_by(|a, b| b.score.cmp(&a.score));

        Report {
            period_start,
            period_end,
            opportunity_count: opportunities.len(),
            content_human: human_readable(&sorted, period_start, period_end),
            content_prompt: analyst_prompt(&sorted, period_start, period_end),
            opportunities: sorted,
        }
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

fn human_readable(
    opportunities: &[ReportItem],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    out.push_str("# Seer Opportunity Report\n\n");
    out.push_str(&format!(
        "**Period:** {} to {}\n",
        start.format("%b %-d, %Y"),
        end.format("%b %-d, %Y")
    ));
    out.push_str(&format!(
        "**Total Opportunities:** {}\n\n",
        opportunities.len()
    ));

    if opportunities.is_empty() {
        out.push_str("No opportunities found in this period.\n");
        return out;
    }

    out.push_str("---\n\n");
    out.push_str("## Top Opportunities\n\n");

    for (i, opp) in opportunities.iter().take(HUMAN_ITEM_LIMIT).enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, opp.title));
        out.push_str(&format!(
            "**Score:** {}/100 | **Source:** {}\n\n",
            opp.score, opp.source_type
        ));

        if !opp.description.is_empty() {
            out.push_str(&format!(
                "{}\n\n",
                truncate_chars(&opp.description, HUMAN_DESCRIPTION_LIMIT)
            ));
        }

        if !opp.signals.is_empty() {
            out.push_str(&format!("**Signals:** {}\n\n", opp.signals.join(", ")));
        }

        out.push_str(&format!("**Link:** {}\n\n", opp.source_url));
        out.push_str("---\n\n");
    }

    out.push_str("## Summary by Source\n\n");

    let mut counts: BTreeMap<&str, (usize, i64)> = BTreeMap::new();
    for opp in opportunities {
        let entry = counts.entry(opp.source_type.as_str()).or_default();
        entry.0 += 1;
        entry.1 += opp.score;
    }
    for (source, (count, score_sum)) in counts {
        let avg = score_sum / count as i64;
        out.push_str(&format!(
            "- **{source}:** {count} opportunities (avg score: {avg})\n"
        ));
    }

    out
}

fn analyst_prompt(
    opportunities: &[ReportItem],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    out.push_str(
        "You are an expert market analyst specializing in opportunities for indie developers and bootstrapped startups.\n\n",
    );
    out.push_str("Analyze the following market opportunities detected from various sources and provide:\n");
    out.push_str("1. A summary of the most promising opportunities\n");
    out.push_str("2. Common themes and patterns you notice\n");
    out.push_str("3. Specific actionable ideas for indie developers\n");
    out.push_str("4. Any emerging trends worth watching\n\n");

    out.push_str(&format!(
        "Report Period: {} to {}\n",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    ));
    out.push_str(&format!("Total Opportunities: {}\n\n", opportunities.len()));

    out.push_str("=== OPPORTUNITIES ===\n\n");

    for (i, opp) in opportunities.iter().take(PROMPT_ITEM_LIMIT).enumerate() {
        out.push_str(&format!("[{}] {}\n", i + 1, opp.title));
        out.push_str(&format!(
            "Source: {} | Score: {}/100\n",
            opp.source_type, opp.score
        ));

        if !opp.description.is_empty() {
            out.push_str(&format!(
                "Description: {}\n",
                truncate_chars(&opp.description, PROMPT_DESCRIPTION_LIMIT)
            ));
        }

        if !opp.signals.is_empty() {
            out.push_str(&format!("Signals: {}\n", opp.signals.join(", ")));
        }

        out.push_str(&format!("URL: {}\n", opp.source_url));
        out.push('\n');
    }

    out.push_str("=== END OPPORTUNITIES ===\n\n");
    out.push_str("Please provide your analysis in a structured, actionable format.");

    out
}
