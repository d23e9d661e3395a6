//! Markup traversal: selector helpers and the shared card loop.

use jobscout_core::{RawJobRecord, Source};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::dates::parse_posted_date;
use crate::{truncate_chars, AdapterError, PageContext, StrategyResult, MAX_DESCRIPTION_CHARS};

/// Failure confined to one card; the loop logs it and moves on.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("unresolvable link `{href}`: {source}")]
    Link {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

pub fn compile(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

pub fn text_or_none(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    text_or_none(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn select_first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).find_map(element_text)
}

pub fn select_first_attr(scope: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    scope
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .find_map(text_or_none)
}

/// Joins `href` onto `base`; absolute links replace it wholesale.
pub fn resolve_url(base: &str, href: &str) -> Result<String, url::ParseError> {
    Ok(Url::parse(base)?.join(href.trim())?.to_string())
}

pub fn base_url(base: &str) -> Result<Url, AdapterError> {
    Url::parse(base).map_err(|source| AdapterError::BaseUrl {
        url: base.to_string(),
        source,
    })
}

/// `base` with its query replaced by `params`.
pub fn url_with_query(base: &Url, params: &[(&str, &str)]) -> String {
    let mut url = base.clone();
    url.set_query(None);
    url.query_pairs_mut().extend_pairs(params.iter().copied());
    url.to_string()
}

/// Where a card points when it has no link of its own.
pub type FallbackApplyUrl = fn(&PageContext<'_>, &str, &str) -> String;

/// A portal's visual card layout. `cards` are tried in order; the first
/// group matching anything is the card set for the page.
#[derive(Debug, Clone, Copy)]
pub struct CardLayout {
    pub source: Source,
    pub cards: &'static [&'static str],
    pub title: &'static str,
    pub company: &'static str,
    pub location: Option<&'static str>,
    pub salary: Option<&'static str>,
    pub description: Option<&'static str>,
    /// `None` reads the `href` of the title element.
    pub link: Option<&'static str>,
    pub date: Option<&'static str>,
    /// Used when a card has no location node and the page has no location query.
    pub default_location: Option<&'static str>,
    pub fallback_apply_url: FallbackApplyUrl,
}

struct CompiledLayout {
    title: Selector,
    company: Selector,
    location: Option<Selector>,
    salary: Option<Selector>,
    description: Option<Selector>,
    link: Option<Selector>,
    date: Option<Selector>,
}

fn compile_opt(selector: Option<&str>) -> Result<Option<Selector>, AdapterError> {
    selector.map(compile).transpose()
}

impl CardLayout {
    fn compile(&self) -> Result<CompiledLayout, AdapterError> {
        Ok(CompiledLayout {
            title: compile(self.title)?,
            company: compile(self.company)?,
            location: compile_opt(self.location)?,
            salary: compile_opt(self.salary)?,
            description: compile_opt(self.description)?,
            link: compile_opt(self.link)?,
            date: compile_opt(self.date)?,
        })
    }

    /// Walk every card on the page. Cards missing a role or company vanish;
    /// malformed cards are logged and skipped.
    pub fn extract(&self, body: &str, ctx: &PageContext<'_>) -> StrategyResult {
        let document = Html::parse_document(body);
        let layout = self.compile()?;

        let mut cards = Vec::new();
        for group in self.cards {
            let selector = compile(group)?;
            cards = document.select(&selector).collect::<Vec<_>>();
            if !cards.is_empty() {
                break;
            }
        }
        if cards.is_empty() {
            return Ok(None);
        }

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for card in cards {
            match self.parse_card(card, &layout, ctx) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    skipped += 1;
                    debug!(source = self.source.key(), error = %err, "skipping malformed card");
                }
            }
        }
        if skipped > 0 {
            debug!(source = self.source.key(), skipped, kept = records.len(), "card pass finished");
        }
        Ok(Some(records))
    }

    fn parse_card(
        &self,
        card: ElementRef<'_>,
        layout: &CompiledLayout,
        ctx: &PageContext<'_>,
    ) -> Result<Option<RawJobRecord>, CardError> {
        let Some(role) = select_first_text(card, &layout.title) else {
            return Ok(None);
        };
        let Some(company) = select_first_text(card, &layout.company) else {
            return Ok(None);
        };

        let location = layout
            .location
            .as_ref()
            .and_then(|sel| select_first_text(card, sel))
            .or_else(|| text_or_none(ctx.location))
            .or_else(|| self.default_location.map(ToString::to_string))
            .unwrap_or_default();

        let href = match &layout.link {
            Some(sel) => select_first_attr(card, sel, "href"),
            None => select_first_attr(card, &layout.title, "href"),
        };
        let apply_url = match href {
            Some(href) => resolve_url(ctx.base_url, &href)
                .map_err(|source| CardError::Link { href, source })?,
            None => (self.fallback_apply_url)(ctx, &role, &company),
        };

        let salary = layout.salary.as_ref().and_then(|sel| select_first_text(card, sel));
        let description = layout
            .description
            .as_ref()
            .and_then(|sel| select_first_text(card, sel))
            .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS))
            .unwrap_or_default();
        let date_posted = layout.date.as_ref().and_then(|sel| {
            select_first_attr(card, sel, "datetime")
                .or_else(|| select_first_text(card, sel))
                .and_then(|raw| parse_posted_date(&raw, ctx.now))
        });

        Ok(RawJobRecord::new(self.source, company, role, location, apply_url).map(|record| {
            record
                .with_salary(salary)
                .with_description(description)
                .with_date_posted(date_posted)
        }))
    }
}
