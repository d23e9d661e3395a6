use jobscout_core::Source;

use super::{cross_product, page_fallback, request};
use crate::markup::{base_url, url_with_query, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

const CARDS: CardLayout = CardLayout {
    source: Source::Wellfound,
    cards: &["div[class*='jobListing'], div[class*='StartupResult'], div[data-test='job-listing']"],
    title: "h2, a[class*='title'], span[class*='jobTitle']",
    company: "h3, span[class*='company'], a[class*='company']",
    location: Some("span[class*='location']"),
    salary: Some("span[class*='salary'], span[class*='compensation']"),
    description: None,
    link: Some("a[href*='/jobs/']"),
    date: None,
    default_location: None,
    fallback_apply_url: page_fallback,
};

fn startup_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    CARDS.extract(body, ctx)
}

static STRATEGIES: [Strategy; 1] = [Strategy {
    name: "startup-cards",
    run: startup_cards,
}];

#[derive(Debug, Clone, Copy, Default)]
pub struct WellfoundAdapter;

pub fn wellfound_adapter() -> WellfoundAdapter {
    WellfoundAdapter
}

impl SourceAdapter for WellfoundAdapter {
    fn source(&self) -> Source {
        Source::Wellfound
    }

    fn default_base_url(&self) -> &'static str {
        "https://wellfound.com/jobs"
    }

    fn default_render(&self) -> bool {
        true
    }

    /// Results load on scroll, so each query pair is a single page.
    fn listing_requests(
        &self,
        base: &str,
        titles: &[String],
        locations: &[String],
        _max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        let base = base_url(base)?;
        Ok(cross_product(titles, locations)
            .map(|(title, location)| {
                let url = url_with_query(
                    &base,
                    &[("keywords", title.as_str()), ("locations", location.as_str())],
                );
                request(url, title, location, 1)
            })
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

    const BASE: &str = "https://wellfound.com/jobs";
    const PAGE: &str = "https://wellfound.com/jobs?keywords=Product+Manager&locations=Bengaluru";

    #[test]
    fn single_page_per_query_pair() {
        let reqs = wellfound_adapter()
            .listing_requests(BASE, &strings(&["Product Manager"]), &strings(&["Bengaluru", "Remote"]), 5)
            .unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].url, PAGE);
    }

    #[test]
    fn startup_cards_carry_usd_compensation() {
        let html = fixture("wellfound", "jobs.html");
        let records = wellfound_adapter()
            .parse_listing(&html, &ctx(BASE, PAGE, "Bengaluru"))
            .unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.company, "Pied Piper");
        assert_eq!(rec.role, "Founding Product Manager");
        assert_eq!(rec.location, "Bengaluru");
        assert_eq!(rec.salary.as_deref(), Some("$90k – $120k"));
        assert_eq!(rec.salary_currency, "USD");
        assert_eq!(rec.apply_url, "https://wellfound.com/jobs/3012345-founding-product-manager");
    }
}
