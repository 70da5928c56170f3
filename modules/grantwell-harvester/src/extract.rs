//! Grant listing extraction from portal category pages.

use chrono::Utc;
use grantwell_common::{fingerprint, GrantRecord};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ExtractError {
    #[error("listing is missing required field: {0}")]
    MissingField(&'static str),
}

/// Extracted records from one page plus how many listings were skipped.
#[derive(Debug, Default)]
pub struct PageRecords {
    pub records: Vec<GrantRecord>,
    pub skipped: usize,
}

/// CSS-selector extractor for grant listing markup.
///
/// Title and description are required; everything else falls back to a
/// sentinel so sparse listings still produce usable records.
pub struct ListingExtractor {
    listing: Selector,
    title: Selector,
    description: Selector,
    deadline: Selector,
    amount: Selector,
    funder: Selector,
    link: Selector,
}

impl ListingExtractor {
    pub fn new() -> Self {
        // Static selectors, parse cannot fail
        Self {
            listing: Selector::parse(".grant-item, .grant-listing").unwrap(),
            title: Selector::parse("h3, h4, .grant-title").unwrap(),
            description: Selector::parse(".grant-description, .summary").unwrap(),
            deadline: Selector::parse(".deadline, .due-date").unwrap(),
            amount: Selector::parse(".amount, .funding-amount").unwrap(),
            funder: Selector::parse(".funder, .organization").unwrap(),
            link: Selector::parse("a[href]").unwrap(),
        }
    }

    /// All grant listing fragments on a page.
    pub fn listings<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        doc.select(&self.listing).collect()
    }

    /// Extract one listing into a [`GrantRecord`]. The record id is a
    /// fingerprint of title and funder, so the same listing seen twice
    /// lands on the same row.
    pub fn extract(
        &self,
        listing: ElementRef<'_>,
        page_url: &str,
        source: &str,
    ) -> Result<GrantRecord, ExtractError> {
        let title = self
            .text_of(listing, &self.title)
            .ok_or(ExtractError::MissingField("title"))?;
        let description = self
            .text_of(listing, &self.description)
            .ok_or(ExtractError::MissingField("description"))?;

        let deadline = self
            .text_of(listing, &self.deadline)
            .unwrap_or_else(|| "Rolling".to_string());
        let amount = self
            .text_of(listing, &self.amount)
            .unwrap_or_else(|| "Varies".to_string());
        let funder = self
            .text_of(listing, &self.funder)
            .unwrap_or_else(|| "Multiple Funders".to_string());
        let url = self.listing_url(listing, page_url).unwrap_or_default();

        Ok(GrantRecord {
            grant_id: fingerprint(&title, &funder),
            title,
            funder,
            description,
            deadline,
            amount,
            url,
            source: source.to_string(),
            scraped_at: Utc::now(),
            is_active: true,
        })
    }

    /// Parse a whole category page, skipping listings that fail extraction.
    pub fn extract_page(&self, html: &str, page_url: &str, source: &str) -> PageRecords {
        let doc = Html::parse_document(html);
        let mut page = PageRecords::default();
        for listing in self.listings(&doc) {
            match self.extract(listing, page_url, source) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    debug!(page_url, error = %e, "Skipping listing");
                    page.skipped += 1;
                }
            }
        }
        page
    }

    /// First matching element's text, whitespace-collapsed. None when the
    /// element is absent or its text is empty.
    fn text_of(&self, listing: ElementRef<'_>, selector: &Selector) -> Option<String> {
        let element = listing.select(selector).next()?;
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    }

    /// First link's href, resolved against the page URL.
    fn listing_url(&self, listing: ElementRef<'_>, page_url: &str) -> Option<String> {
        let href = listing.select(&self.link).next()?.value().attr("href")?;
        match Url::parse(page_url).and_then(|base| base.join(href)) {
            Ok(resolved) => Some(resolved.to_string()),
            Err(_) => Some(href.to_string()),
        }
    }
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://www.grantsphere.com/grants-for-youth/1";

    fn first_record(html: &str) -> Result<GrantRecord, ExtractError> {
        let doc = Html::parse_document(html);
        let extractor = ListingExtractor::new();
        let listings = extractor.listings(&doc);
        assert_eq!(listings.len(), 1);
        extractor.extract(listings[0], PAGE_URL, "GrantSphere")
    }

    #[test]
    fn full_listing_extracts_every_field() {
        let html = r#"
            <div class="grant-item">
                <h3>Community Garden Grant</h3>
                <p class="grant-description">Funding for neighborhood garden projects.</p>
                <span class="deadline">2026-03-01</span>
                <span class="amount">$5,000</span>
                <span class="funder">Green Futures Trust</span>
                <a href="/grant/42">Details</a>
            </div>
        "#;
        let record = first_record(html).unwrap();
        assert_eq!(record.title, "Community Garden Grant");
        assert_eq!(record.description, "Funding for neighborhood garden projects.");
        assert_eq!(record.deadline, "2026-03-01");
        assert_eq!(record.amount, "$5,000");
        assert_eq!(record.funder, "Green Futures Trust");
        assert_eq!(record.url, "https://www.grantsphere.com/grant/42");
        assert_eq!(record.source, "GrantSphere");
        assert!(record.is_active);
    }

    #[test]
    fn sparse_listing_falls_back_to_sentinels() {
        let html = r#"
            <div class="grant-listing">
                <h4>Youth Grant</h4>
                <div class="summary">Support for youth programs.</div>
                <span class="organization">ACME Fund</span>
            </div>
        "#;
        let record = first_record(html).unwrap();
        assert_eq!(record.title, "Youth Grant");
        assert_eq!(record.deadline, "Rolling");
        assert_eq!(record.amount, "Varies");
        assert_eq!(record.funder, "ACME Fund");
        assert_eq!(record.url, "");
        assert_eq!(record.grant_id, fingerprint("Youth Grant", "ACME Fund"));
    }

    #[test]
    fn missing_funder_uses_multiple_funders_sentinel() {
        let html = r#"
            <div class="grant-item">
                <h3>Open Opportunity</h3>
                <p class="grant-description">Broad eligibility.</p>
            </div>
        "#;
        let record = first_record(html).unwrap();
        assert_eq!(record.funder, "Multiple Funders");
        assert_eq!(record.grant_id, fingerprint("Open Opportunity", "Multiple Funders"));
    }

    #[test]
    fn missing_title_is_an_error() {
        let html = r#"
            <div class="grant-item">
                <p class="grant-description">No heading here.</p>
            </div>
        "#;
        assert_eq!(first_record(html).unwrap_err(), ExtractError::MissingField("title"));
    }

    #[test]
    fn whitespace_only_description_is_an_error() {
        let html = r#"
            <div class="grant-item">
                <h3>Titled</h3>
                <p class="grant-description">   </p>
            </div>
        "#;
        assert_eq!(
            first_record(html).unwrap_err(),
            ExtractError::MissingField("description")
        );
    }

    #[test]
    fn extract_page_skips_broken_listings_and_keeps_the_rest() {
        let html = r#"
            <div class="grant-item">
                <h3>First Grant</h3>
                <p class="grant-description">One.</p>
            </div>
            <div class="grant-item">
                <p class="grant-description">Missing a title.</p>
            </div>
            <div class="grant-item">
                <h3>Second Grant</h3>
                <p class="grant-description">Two.</p>
            </div>
        "#;
        let page = ListingExtractor::new().extract_page(html, PAGE_URL, "GrantSphere");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.records[0].title, "First Grant");
        assert_eq!(page.records[1].title, "Second Grant");
    }

    #[test]
    fn nested_text_is_collapsed() {
        let html = r#"
            <div class="grant-item">
                <h3>Arts <em>and</em>
                    Culture</h3>
                <p class="grant-description">Multi
                    line.</p>
            </div>
        "#;
        let record = first_record(html).unwrap();
        assert_eq!(record.title, "Arts and Culture");
        assert_eq!(record.description, "Multi line.");
    }

    #[test]
    fn absolute_hrefs_pass_through_unchanged() {
        let html = r#"
            <div class="grant-item">
                <h3>Linked</h3>
                <p class="grant-description">Has an absolute link.</p>
                <a href="https://elsewhere.org/grant">Apply</a>
            </div>
        "#;
        let record = first_record(html).unwrap();
        assert_eq!(record.url, "https://elsewhere.org/grant");
    }
}
