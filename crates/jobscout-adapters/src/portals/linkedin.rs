use jobscout_core::Source;

use super::{cross_product, request, search_url};
use crate::markup::{base_url, url_with_query, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

const RESULTS_PER_PAGE: u32 = 25;
/// Past three days.
const POSTED_WITHIN: &str = "r259200";

fn apply_fallback(ctx: &PageContext<'_>, role: &str, company: &str) -> String {
    let keywords = format!("{role} {company}");
    search_url(ctx, "", &[("keywords", keywords.as_str())])
}

const CARDS: CardLayout = CardLayout {
    source: Source::LinkedIn,
    cards: &[
        "div.base-card, div.job-search-card, li.result-card",
        "[data-entity-urn]",
    ],
    title: "h3.base-search-card__title, h3.job-search-card__title, span.sr-only, a.job-card-list__title",
    company: "h4.base-search-card__subtitle, a.job-search-card__subtitle-link, h4.job-search-card__company-name",
    location: Some("span.job-search-card__location, span.base-search-card__metadata"),
    salary: None,
    description: None,
    link: Some("a.base-card__full-link, a[href*='/jobs/view/']"),
    date: Some("time[datetime], time"),
    default_location: None,
    fallback_apply_url: apply_fallback,
};

fn search_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    CARDS.extract(body, ctx)
}

static STRATEGIES: [Strategy; 1] = [Strategy {
    name: "search-cards",
    run: search_cards,
}];

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedInAdapter;

pub fn linkedin_adapter() -> LinkedInAdapter {
    LinkedInAdapter
}

impl SourceAdapter for LinkedInAdapter {
    fn source(&self) -> Source {
        Source::LinkedIn
    }

    fn default_base_url(&self) -> &'static str {
        "https://www.linkedin.com/jobs/search/"
    }

    fn default_render(&self) -> bool {
        true
    }

    fn listing_requests(
        &self,
        base: &str,
        titles: &[String],
        locations: &[String],
        max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        let base = base_url(base)?;
        let mut out = Vec::new();
        for (title, location) in cross_product(titles, locations) {
            for page in 0..max_pages.max(1) {
                let start = (page * RESULTS_PER_PAGE).to_string();
                let url = url_with_query(
                    &base,
                    &[
                        ("keywords", title.as_str()),
                        ("location", location.as_str()),
                        ("start", start.as_str()),
                        ("f_TPR", POSTED_WITHIN),
                    ],
                );
                out.push(request(url, title, location, page + 1));
            }
        }
        Ok(out)
    }

    fn strategies(&self) -> &'static [Strategy] {
        &STRATEGIES
    }
}
