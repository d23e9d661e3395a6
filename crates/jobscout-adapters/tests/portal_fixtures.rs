use std::path::Path;

use chrono::{TimeZone, Utc};
use jobscout_adapters::{adapter_for_source, PageContext};
use jobscout_core::Source;

const FIXTURES: &[(Source, &str, usize)] = &[
    (Source::LinkedIn, "linkedin/search.html", 2),
    (Source::Indeed, "indeed/embedded.html", 3),
    (Source::Indeed, "indeed/cards.html", 1),
    (Source::Naukri, "naukri/json_ld.html", 2),
    (Source::Naukri, "naukri/next_data.html", 2),
    (Source::Naukri, "naukri/cards.html", 1),
    (Source::HiringCafe, "hiringcafe/search.html", 2),
    (Source::Wellfound, "wellfound/jobs.html", 1),
    (Source::IimJobs, "iimjobs/next_data.html", 2),
    (Source::IimJobs, "iimjobs/cards.html", 1),
];

fn read_fixture(rel: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(rel);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

#[test]
fn every_fixture_parses_into_complete_records() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().unwrap();
    for (source, rel, expected) in FIXTURES {
        let adapter = adapter_for_source(*source);
        let base = adapter.default_base_url();
        let ctx = PageContext {
            base_url: base,
            page_url: base,
            title: "Product Manager",
            location: "Bengaluru",
            now,
        };
        let records = adapter.parse_listing(&read_fixture(rel), &ctx).unwrap();
        assert_eq!(records.len(), *expected, "{rel}");
        for record in &records {
            assert_eq!(record.source, *source, "{rel}");
            assert!(!record.company.trim().is_empty(), "{rel}");
            assert!(!record.role.trim().is_empty(), "{rel}");
            assert!(record.apply_url.starts_with("https://"), "{rel}: {}", record.apply_url);
            assert!(record.description.chars().count() <= 500, "{rel}");
            assert!(record.date_posted.map_or(true, |d| d <= now.date_naive()), "{rel}");
        }
    }
}

#[test]
fn blocked_or_empty_pages_are_empty_batches() {
    let now = Utc::now();
    for source in Source::ALL {
        let adapter = adapter_for_source(source);
        let base = adapter.default_base_url();
        let ctx = PageContext {
            base_url: base,
            page_url: base,
            title: "Product Manager",
            location: "Pune",
            now,
        };
        for body in ["", "<html><body><h1>Access denied</h1></body></html>", "{not html"] {
            let records = adapter.parse_listing(body, &ctx).unwrap();
            assert!(records.is_empty(), "{source}: {body:?}");
        }
    }
}

#[test]
fn every_portal_plans_at_least_one_request() {
    let titles = vec!["Product Manager".to_string()];
    let locations = vec!["Bengaluru".to_string()];
    for source in Source::ALL {
        let adapter = adapter_for_source(source);
        let reqs = adapter
            .listing_requests(adapter.default_base_url(), &titles, &locations, 1)
            .unwrap();
        assert!(!reqs.is_empty(), "{source}");
        assert!(reqs.iter().all(|r| r.url.starts_with("https://")), "{source}");
    }
}
