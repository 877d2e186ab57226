//! Weighted-signal scoring.
//!
//! Each signal is a `(name, weight, predicate)`; predicates are closures
//! capturing only their keyword list or numeric threshold. The signal set is
//! fixed at construction and the final score is the matched share of the
//! total weight, normalized to 0..=100.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Opportunity;

const PROBLEM_KEYWORDS: &[&str] = &[
    "problem",
    "issue",
    "frustrated",
    "annoying",
    "hate",
    "wish",
    "need",
    "looking for",
    "struggling",
];

const SOLUTION_KEYWORDS: &[&str] = &[
    "how do i",
    "how to",
    "best way",
    "recommend",
    "alternative",
    "looking for",
    "need help",
    "any suggestions",
];

const SHOW_KEYWORDS: &[&str] = &[
    "show hn",
    "showhn",
    "i built",
    "i made",
    "my project",
    "side project",
    "launching",
    "just launched",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "api",
    "sdk",
    "library",
    "framework",
    "tool",
    "cli",
    "developer",
    "devtool",
    "open source",
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "saas",
    "startup",
    "business",
    "revenue",
    "customers",
    "users",
    "subscription",
    "pricing",
    "monetize",
];

const INDIE_KEYWORDS: &[&str] = &[
    "indie",
    "solo",
    "bootstrapped",
    "self-funded",
    "side project",
    "maker",
    "indiehacker",
    "solopreneur",
];

/// One signal evaluation, as returned to callers: the fixed definition plus
/// whether it fired for the scored opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub name: &'static str,
    pub description: &'static str,
    pub weight: u32,
    pub matched: bool,
}

/// The outcome of scoring one opportunity. `signals` always holds one entry
/// per registered signal definition, matched or not.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub score: i64,
    pub signals: Vec<Signal>,
}

impl ScoreResult {
    pub fn matched_signals(&self) -> Vec<&Signal> {
        self.signals.iter().filter(|s| s.matched).collect()
    }

    /// Names of the matched signals, in registration order. This is the
    /// subset that gets persisted alongside the score.
    pub fn matched_names(&self) -> Vec<String> {
        self.signals
            .iter()
            .filter(|s| s.matched)
            .map(|s| s.name.to_string())
            .collect()
    }
}

type Predicate = Box<dyn Fn(&Opportunity, DateTime<Utc>) -> bool + Send + Sync>;

struct SignalDef {
    name: &'static str,
    description: &'static str,
    weight: u32,
    check: Predicate,
}

/// Deterministic, I/O-free scorer. Only the `recent` signal reads a clock,
/// and `score_at` lets callers supply it.
pub struct Scorer {
    signals: Vec<SignalDef>,
}

impl Scorer {
    pub fn new() -> Self {
        let mut scorer = Self {
            signals: Vec::new(),
        };
        scorer.register_default_signals();
        scorer
    }

    fn register_default_signals(&mut self) {
        self.add(
            "problem_mention",
            "Mentions a problem or pain point",
            15,
            Box::new(|o, _| contains_any(o, PROBLEM_KEYWORDS)),
        );
        self.add(
            "solution_seeking",
            "Actively seeking a solution",
            20,
            Box::new(|o, _| contains_any(o, SOLUTION_KEYWORDS)),
        );
        self.add(
            "show_project",
            "Someone showing their project",
            10,
            Box::new(|o, _| contains_any(o, SHOW_KEYWORDS)),
        );
        self.add(
            "technical",
            "Technical content (dev tools, APIs, etc)",
            10,
            Box::new(|o, _| contains_any(o, TECHNICAL_KEYWORDS)),
        );
        self.add(
            "business_opportunity",
            "Business/SaaS opportunity indicators",
            15,
            Box::new(|o, _| contains_any(o, BUSINESS_KEYWORDS)),
        );
        self.add(
            "high_engagement",
            "High engagement (comments, stars, reactions)",
            10,
            Box::new(|o, _| {
                metadata_over(o, "points", 50)
                    || metadata_over(o, "num_comments", 20)
                    || metadata_over(o, "stars", 100)
                    || metadata_over(o, "reactions", 20)
            }),
        );
        self.add(
            "recent",
            "Posted within last 24 hours",
            10,
            Box::new(|o, now| now - o.detected_at < Duration::hours(24)),
        );
        self.add(
            "indie_focus",
            "Relevant to indie developers",
            10,
            Box::new(|o, _| contains_any(o, INDIE_KEYWORDS)),
        );
    }

    fn add(
        &mut self,
        name: &'static str,
        description: &'static str,
        weight: u32,
        check: Predicate,
    ) {
        self.signals.push(SignalDef {
            name,
            description,
            weight,
            check,
        });
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Score against the wall clock.
    pub fn score(&self, opportunity: &Opportunity) -> ScoreResult {
        self.score_at(opportunity, Utc::now())
    }

    /// Score against an explicit `now`, for deterministic tests.
    pub fn score_at(&self, opportunity: &Opportunity, now: DateTime<Utc>) -> ScoreResult {
        let total_weight: u32 = self.signals.iter().map(|s| s.weight).sum();
        let mut matched_weight = 0u32;
        let mut signals = Vec::with_capacity(self.signals.len());

        for def in &self.signals {
            let matched = (def.check)(opportunity, now);
            if matched {
                matched_weight += def.weight;
            }
            signals.push(Signal {
                name: def.name,
                description: def.description,
                weight: def.weight,
                matched,
            });
        }

        let score = ((f64::from(matched_weight) / f64::from(total_weight)) * 100.0) as i64;

        ScoreResult {
            score: score.clamp(0, 100),
            signals,
        }
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive substring match over `title + " " + description`.
fn contains_any(opportunity: &Opportunity, keywords: &[&str]) -> bool {
    let text = format!("{} {}", opportunity.title, opportunity.description).to_lowercase();
    keywords.iter().any(|kw| text.contains(kw))
}

fn metadata_over(opportunity: &Opportunity, key: &str, min: i64) -> bool {
    opportunity
        .metadata
        .get(key)
        .and_then(|v| v.as_i64())
        .map(|v| v > min)
        .unwrap_or(false)
}
