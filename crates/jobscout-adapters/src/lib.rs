//! Source adapter contracts + per-portal extractors.
//!
//! Every adapter plans its listing requests and owns an ordered list of
//! extraction [`Strategy`] values. Strategies are tried in order; the first
//! one that yields a non-empty batch wins. Finding nothing is an empty batch,
//! never an error.

use chrono::{DateTime, Utc};
use jobscout_core::{RawJobRecord, Source};
use thiserror::Error;
use tracing::debug;

pub mod dates;
pub mod embedded;
pub mod markup;
mod portals;

pub use portals::{
    hiringcafe_adapter, iimjobs_adapter, indeed_adapter, linkedin_adapter, naukri_adapter,
    wellfound_adapter,
};

pub const CRATE_NAME: &str = "jobscout-adapters";

/// Descriptions longer than this are cut.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("invalid base url `{url}`: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// One planned listing fetch for a (title, location, page) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub url: String,
    pub title: String,
    pub location: String,
    pub page: u32,
}

/// What an extractor knows about the page it is parsing.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub base_url: &'a str,
    pub page_url: &'a str,
    pub title: &'a str,
    pub location: &'a str,
    /// Reference point for relative dates ("3 days ago").
    pub now: DateTime<Utc>,
}

impl<'a> PageContext<'a> {
    pub fn for_request(base_url: &'a str, request: &'a ListingRequest, now: DateTime<Utc>) -> Self {
        Self {
            base_url,
            page_url: &request.url,
            title: &request.title,
            location: &request.location,
            now,
        }
    }
}

pub type StrategyResult = Result<Option<Vec<RawJobRecord>>, AdapterError>;

/// A named extraction attempt. `Ok(None)` means "nothing for me here".
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub run: fn(&str, &PageContext<'_>) -> StrategyResult,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    fn default_base_url(&self) -> &'static str;

    /// Whether the portal needs the headless render fallback unless configured otherwise.
    fn default_render(&self) -> bool;

    fn listing_requests(
        &self,
        base_url: &str,
        titles: &[String],
        locations: &[String],
        max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError>;

    fn strategies(&self) -> &'static [Strategy];

    fn parse_listing(
        &self,
        body: &str,
        ctx: &PageContext<'_>,
    ) -> Result<Vec<RawJobRecord>, AdapterError> {
        parse_with_strategies(self.source(), self.strategies(), body, ctx)
    }
}

pub fn parse_with_strategies(
    source: Source,
    strategies: &[Strategy],
    body: &str,
    ctx: &PageContext<'_>,
) -> Result<Vec<RawJobRecord>, AdapterError> {
    for strategy in strategies {
        match (strategy.run)(body, ctx)? {
            Some(records) if !records.is_empty() => {
                debug!(
                    source = source.key(),
                    strategy = strategy.name,
                    count = records.len(),
                    url = ctx.page_url,
                    "extracted records"
                );
                return Ok(records);
            }
            _ => {
                debug!(source = source.key(), strategy = strategy.name, "strategy found nothing");
            }
        }
    }
    Ok(Vec::new())
}

pub fn adapter_for_source(source: Source) -> Box<dyn SourceAdapter> {
    match source {
        Source::LinkedIn => Box::new(linkedin_adapter()),
        Source::Indeed => Box::new(indeed_adapter()),
        Source::Naukri => Box::new(naukri_adapter()),
        Source::HiringCafe => Box::new(hiringcafe_adapter()),
        Source::Wellfound => Box::new(wellfound_adapter()),
        Source::IimJobs => Box::new(iimjobs_adapter()),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
