mod hiringcafe;
mod iimjobs;
mod indeed;
mod linkedin;
mod naukri;
mod wellfound;

pub use hiringcafe::hiringcafe_adapter;
pub use iimjobs::iimjobs_adapter;
pub use indeed::indeed_adapter;
pub use linkedin::linkedin_adapter;
pub use naukri::naukri_adapter;
pub use wellfound::wellfound_adapter;

use crate::markup::{base_url, url_with_query};
use crate::{ListingRequest, PageContext};

/// Search URL on the portal for `params`, or the page itself when the
/// base cannot be parsed.
fn search_url(ctx: &PageContext<'_>, path: &str, params: &[(&str, &str)]) -> String {
    base_url(ctx.base_url)
        .ok()
        .and_then(|base| base.join(path).ok())
        .map(|url| url_with_query(&url, params))
        .unwrap_or_else(|| ctx.page_url.to_string())
}

fn page_fallback(ctx: &PageContext<'_>, _role: &str, _company: &str) -> String {
    ctx.page_url.to_string()
}

/// Every (title, location) pair in query order.
fn cross_product<'a>(
    titles: &'a [String],
    locations: &'a [String],
) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
    titles
        .iter()
        .flat_map(move |title| locations.iter().map(move |location| (title, location)))
}

fn request(url: String, title: &str, location: &str, page: u32) -> ListingRequest {
    ListingRequest {
        url,
        title: title.to_string(),
        location: location.to_string(),
        page,
    }
}
