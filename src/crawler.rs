use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::db::Catalog;
use crate::parser::{self, RawQuote};

pub const DEFAULT_BASE_URL: &str = "http://quotes.toscrape.com";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Totals for one crawl run.
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub pages: usize,
    pub quotes_seen: usize,
    pub quotes_new: usize,
    pub authors_new: usize,
    pub tags_new: usize,
}

/// Walk `{base}/page/{n}/` from page 1, ingesting every quote block until no
/// next-page link is advertised. A failed fetch ends the crawl quietly
/// rather than erroring: whatever was ingested before it stays committed.
pub async fn crawl(catalog: &Catalog, base_url: &str, limit: Option<usize>) -> Result<CrawlStats> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let base = base_url.trim_end_matches('/');
    let mut stats = CrawlStats::default();
    let mut page_no = 1usize;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);

    loop {
        if limit.is_some_and(|max| stats.pages >= max) {
            info!("Page limit reached after {} pages", stats.pages);
            break;
        }

        let url = format!("{base}/page/{page_no}/");
        pb.set_message(format!("page {page_no}"));

        let body = match fetch_page(&client, &url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Fetch failed for {}, stopping crawl: {:#}", url, e);
                break;
            }
        };

        let listing = parser::parse_listing_page(&body);
        if listing.quotes.is_empty() {
            info!("No quote blocks on page {}", page_no);
        }
        for quote in &listing.quotes {
            ingest_quote(catalog, quote, &mut stats)?;
        }
        stats.pages += 1;

        if !listing.has_next {
            break;
        }
        page_no += 1;
    }

    pb.finish_and_clear();
    info!(
        "Crawled {} pages: {} quotes seen, {} new quotes, {} new authors, {} new tags",
        stats.pages, stats.quotes_seen, stats.quotes_new, stats.authors_new, stats.tags_new
    );
    Ok(stats)
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {url} failed"))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{url} answered {status}");
    }
    response
        .text()
        .await
        .with_context(|| format!("Reading body of {url} failed"))
}

/// One record through the upsert chain: author, then quote, then each tag
/// plus its association. Every step is get-or-create, so feeding the same
/// record twice changes nothing.
fn ingest_quote(catalog: &Catalog, quote: &RawQuote, stats: &mut CrawlStats) -> Result<()> {
    let (author, author_created) = catalog.get_or_create_author(&quote.author)?;
    let (stored, quote_created) = catalog.get_or_create_quote(&quote.text, &author)?;
    for tag_name in &quote.tags {
        let (tag, tag_created) = catalog.get_or_create_tag(tag_name)?;
        catalog.add_tag_to_quote(&stored, &tag)?;
        stats.tags_new += usize::from(tag_created);
    }
    stats.quotes_seen += 1;
    stats.authors_new += usize::from(author_created);
    stats.quotes_new += usize::from(quote_created);
    Ok(())
}
