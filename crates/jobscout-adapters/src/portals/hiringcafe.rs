use jobscout_core::Source;

use super::{page_fallback, request};
use crate::markup::{base_url, url_with_query, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

/// The portal searches globally; cards without a location get this one.
pub const DEFAULT_LOCATION: &str = "India";

const CARDS: CardLayout = CardLayout {
    source: Source::HiringCafe,
    cards: &["div.job-card, div.job-listing, article.job, div[class*='job'], div[class*='listing']"],
    title: "h2, h3, a[class*='title'], span[class*='title']",
    company: "span[class*='company'], div[class*='company'], p[class*='company']",
    location: Some("span[class*='location'], div[class*='location']"),
    salary: Some("span[class*='salary'], div[class*='salary']"),
    description: None,
    link: Some("a[href]"),
    date: None,
    default_location: Some(DEFAULT_LOCATION),
    fallback_apply_url: page_fallback,
};

fn listing_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    CARDS.extract(body, ctx)
}

static STRATEGIES: [Strategy; 1] = [Strategy {
    name: "listing-cards",
    run: listing_cards,
}];

#[derive(Debug, Clone, Copy, Default)]
pub struct HiringCafeAdapter;

pub fn hiringcafe_adapter() -> HiringCafeAdapter {
    HiringCafeAdapter
}

impl SourceAdapter for HiringCafeAdapter {
    fn source(&self) -> Source {
        Source::HiringCafe
    }

    fn default_base_url(&self) -> &'static str {
        "https://hiring.cafe"
    }

    fn default_render(&self) -> bool {
        false
    }

    /// One search per title; locations and paging do not apply.
    fn listing_requests(
        &self,
        base: &str,
        titles: &[String],
        _locations: &[String],
        _max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        let search = base_url(base)?
            .join("/search")
            .map_err(|source| AdapterError::BaseUrl {
                url: base.to_string(),
                source,
            })?;
        Ok(titles
            .iter()
            .map(|title| request(url_with_query(&search, &[("q", title.as_str())]), title, "", 1))
            .collect())
    }

    fn strategies(&self) -> &'static [Strategy] {
        &STRATEGIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portals::test_support::{ctx, fixture, strings};

    const BASE: &str = "https://hiring.cafe";
    const PAGE: &str = "https://hiring.cafe/search?q=Product+Manager";

    #[test]
    fn one_search_per_title() {
        let reqs = hiringcafe_adapter()
            .listing_requests(BASE, &strings(&["Product Manager", "Product Owner"]), &strings(&["Pune", "Delhi"]), 3)
            .unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].url, PAGE);
        assert_eq!(reqs[1].url, "https://hiring.cafe/search?q=Product+Owner");
        assert!(reqs.iter().all(|r| r.location.is_empty()));
    }

    #[test]
    fn cards_default_to_india_and_resolve_links() {
        let html = fixture("hiringcafe", "search.html");
        let records = hiringcafe_adapter().parse_listing(&html, &ctx(BASE, PAGE, "")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].company, "Acme Bank");
        assert_eq!(records[0].location, "Bengaluru");
        assert_eq!(records[0].apply_url, "https://hiring.cafe/viewjob/acme-pm-77");
        assert_eq!(records[0].salary.as_deref(), Some("₹40L - ₹55L"));
        assert_eq!(records[1].location, DEFAULT_LOCATION);
        assert_eq!(records[1].apply_url, PAGE);
    }
}
