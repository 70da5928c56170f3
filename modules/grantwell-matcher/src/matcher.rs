//! Multi-source grant matching: fan out, tolerate failures, dedupe,
//! filter, rank.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use grantwell_store::GrantStore;
use tracing::{debug, warn};

use crate::keywords::extract_keywords;
use crate::sources::{curated_sources, FederalAwardsSource, GrantLead, GrantSource, StoreSource};

/// How many sources are queried at once.
const FAN_OUT: usize = 4;

/// Ranked results are capped here.
const MAX_RESULTS: usize = 100;

pub struct GrantMatcher {
    sources: Vec<Arc<dyn GrantSource>>,
}

impl GrantMatcher {
    /// The production source set: the harvested database, the federal
    /// awards API, and the curated feeds.
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        let mut sources: Vec<Arc<dyn GrantSource>> = vec![
            Arc::new(StoreSource::new(store)),
            Arc::new(FederalAwardsSource::new()),
        ];
        for curated in curated_sources() {
            sources.push(Arc::new(curated));
        }
        Self { sources }
    }

    pub fn with_sources(sources: Vec<Arc<dyn GrantSource>>) -> Self {
        Self { sources }
    }

    /// Match a project description against every source. A failing source
    /// is logged and dropped; the request succeeds with whatever the rest
    /// returned.
    pub async fn match_grants(
        &self,
        project_summary: &str,
        focus_area: &str,
        org_type: &str,
    ) -> Vec<GrantLead> {
        let keywords = extract_keywords(project_summary, focus_area, org_type);
        debug!(?keywords, "Matching grants");

        let sources: Vec<Arc<dyn GrantSource>> = self.sources.clone();
        let fetch_keywords = keywords.clone();
        let fan_out: futures::future::BoxFuture<'static, Vec<Vec<GrantLead>>> = Box::pin(
            stream::iter(sources)
                .map(move |source| fetch_from_source(source, fetch_keywords.clone()))
                .buffer_unordered(FAN_OUT)
                .collect(),
        );
        let fetched: Vec<Vec<GrantLead>> = fan_out.await;

        let all: Vec<GrantLead> = fetched.into_iter().flatten().collect();
        let filtered = filter_and_dedupe(all);
        rank_by_relevance(filtered, &keywords)
    }
}

async fn fetch_from_source(source: Arc<dyn GrantSource>, keywords: Vec<String>) -> Vec<GrantLead> {
    match source.fetch(&keywords).await {
        Ok(leads) => {
            debug!(source = source.name(), leads = leads.len(), "Source responded");
            leads
        }
        Err(e) => {
            warn!(source = source.name(), error = %format!("{e:#}"), "Source failed");
            Vec::new()
        }
    }
}

/// Drop repeat titles (first occurrence wins) and grants whose deadline is
/// a parseable date in the past. Free-form deadlines like "Rolling" are
/// kept.
fn filter_and_dedupe(leads: Vec<GrantLead>) -> Vec<GrantLead> {
    let now = Utc::now();
    let mut seen_titles = HashSet::new();
    leads
        .into_iter()
        .filter(|lead| {
            if let Ok(deadline) = DateTime::parse_from_rfc3339(&lead.deadline) {
                if deadline < now {
                    return false;
                }
            }
            seen_titles.insert(lead.title.clone())
        })
        .collect()
}

/// Score each lead by keyword occurrences over title and description, sort
/// best first, cap the list.
fn rank_by_relevance(mut leads: Vec<GrantLead>, keywords: &[String]) -> Vec<GrantLead> {
    for lead in &mut leads {
        let text = format!("{} {}", lead.title, lead.description).to_lowercase();
        lead.relevance_score = keywords
            .iter()
            .map(|k| text.matches(k.as_str()).count())
            .sum();
    }
    leads.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| a.title.cmp(&b.title))
    });
    leads.truncate(MAX_RESULTS);
    leads
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    fn lead(title: &str, description: &str, deadline: &str) -> GrantLead {
        GrantLead {
            title: title.to_string(),
            funder: "Test Funder".to_string(),
            description: description.to_string(),
            deadline: deadline.to_string(),
            amount: "Varies".to_string(),
            url: String::new(),
            source: "test".to_string(),
            relevance_score: 0,
        }
    }

    struct FixedSource(Vec<GrantLead>);

    #[async_trait]
    impl GrantSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _keywords: &[String]) -> anyhow::Result<Vec<GrantLead>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl GrantSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self, _keywords: &[String]) -> anyhow::Result<Vec<GrantLead>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn expired_parseable_deadlines_are_dropped() {
        let past = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let future = (Utc::now() + chrono::Duration::days(30)).to_rfc3339();
        let leads = vec![
            lead("Expired", "gone", &past),
            lead("Open", "still open", &future),
            lead("Rolling Fund", "no fixed date", "Rolling"),
        ];
        let kept = filter_and_dedupe(leads);
        let titles: Vec<&str> = kept.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Open", "Rolling Fund"]);
    }

    #[test]
    fn duplicate_titles_keep_the_first_occurrence() {
        let leads = vec![
            lead("Same Grant", "from source a", "Rolling"),
            lead("Same Grant", "from source b", "Rolling"),
            lead("Other Grant", "unique", "Rolling"),
        ];
        let kept = filter_and_dedupe(leads);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].description, "from source a");
    }

    #[test]
    fn ranking_counts_keyword_hits_over_title_and_description() {
        let leads = vec![
            lead("Health Fund", "general support", "Rolling"),
            lead("Youth Health Program", "youth health and youth sports", "Rolling"),
        ];
        let keywords = vec!["youth".to_string(), "health".to_string()];
        let ranked = rank_by_relevance(leads, &keywords);
        assert_eq!(ranked[0].title, "Youth Health Program");
        assert_eq!(ranked[0].relevance_score, 5);
        assert_eq!(ranked[1].relevance_score, 1);
    }

    #[tokio::test]
    async fn a_failing_source_does_not_fail_the_match() {
        let matcher = GrantMatcher::with_sources(vec![
            Arc::new(BrokenSource),
            Arc::new(FixedSource(vec![lead(
                "Garden Grant",
                "community garden funding",
                "Rolling",
            )])),
        ]);
        let results = matcher.match_grants("community garden project", "", "").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Garden Grant");
        assert!(results[0].relevance_score >= 2);
    }

    #[tokio::test]
    async fn results_are_capped() {
        let many: Vec<GrantLead> = (0..150)
            .map(|i| lead(&format!("Grant {i}"), "filler", "Rolling"))
            .collect();
        let matcher = GrantMatcher::with_sources(vec![Arc::new(FixedSource(many))]);
        let results = matcher.match_grants("filler", "", "").await;
        assert_eq!(results.len(), MAX_RESULTS);
    }
}
