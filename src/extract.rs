use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::model::RawListing;

/// Bounded wait applied to both page transitions: next-control
/// interactability and first-card presence.
pub const PAGE_WAIT: Duration = Duration::from_secs(20);

/// A rendered results page. Implementations own the session state; the
/// extractor only ever drives one of these at a time.
#[async_trait]
pub trait PageSource {
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Dismiss the cookie-consent interstitial if present. Its absence is
    /// not an error, and it may reappear after any page transition.
    async fn accept_consent(&mut self) -> Result<()>;

    /// All listing records on the current page, in document order.
    async fn listing_cards(&mut self) -> Result<Vec<RawListing>>;

    /// Whether the next-page control reports enabled. A disabled or
    /// absent control means there is no further page.
    async fn next_enabled(&mut self) -> Result<bool>;

    /// Wait (bounded) for the next-page control to become interactable,
    /// then invoke it.
    async fn click_next(&mut self, timeout: Duration) -> Result<()>;

    /// Wait (bounded) for the first listing card of the new page.
    async fn wait_for_cards(&mut self, timeout: Duration) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

pub struct ScrapeResult {
    pub listings: Vec<RawListing>,
    pub pages_scanned: usize,
}

/// Walk the paginated results from `url`, folding every page's batch into
/// one result. Any timeout or read failure propagates and discards the
/// pages accumulated so far: extraction is all-or-nothing.
pub async fn collect_listings(page: &mut dyn PageSource, url: &str) -> Result<ScrapeResult> {
    page.open(url).await?;
    page.accept_consent().await?;

    let mut listings = page.listing_cards().await?;
    let mut pages_scanned = 1;

    while page.next_enabled().await? {
        page.click_next(PAGE_WAIT).await?;
        page.accept_consent().await?;
        page.wait_for_cards(PAGE_WAIT).await?;
        listings.extend(page.listing_cards().await?);
        pages_scanned += 1;
    }

    info!(
        "Scraping complete: {} listings over {} pages",
        listings.len(),
        pages_scanned
    );
    Ok(ScrapeResult {
        listings,
        pages_scanned,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;

    fn batch(ids: std::ops::Range<usize>) -> Vec<RawListing> {
        ids.map(|n| RawListing {
            id: format!("prop{n}"),
            raw_price: "£1,200pcm".to_string(),
            address: format!("{n} Test Street"),
        })
        .collect()
    }

    struct MockPageSource {
        pages: Vec<Vec<RawListing>>,
        current: usize,
        consent_prompts: usize,
        fail_on_advance: bool,
    }

    impl MockPageSource {
        fn new(pages: Vec<Vec<RawListing>>) -> Self {
            Self {
                pages,
                current: 0,
                consent_prompts: 0,
                fail_on_advance: false,
            }
        }
    }

    #[async_trait]
    impl PageSource for MockPageSource {
        async fn open(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn accept_consent(&mut self) -> Result<()> {
            self.consent_prompts += 1;
            Ok(())
        }

        async fn listing_cards(&mut self) -> Result<Vec<RawListing>> {
            Ok(self.pages[self.current].clone())
        }

        async fn next_enabled(&mut self) -> Result<bool> {
            Ok(self.current + 1 < self.pages.len())
        }

        async fn click_next(&mut self, _timeout: Duration) -> Result<()> {
            if self.fail_on_advance {
                return Err(EtlError::ExtractionTimeout(
                    "next control never became interactable".to_string(),
                ));
            }
            self.current += 1;
            Ok(())
        }

        async fn wait_for_cards(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn three_page_site_accumulates_all_batches() {
        let mut page =
            MockPageSource::new(vec![batch(0..5), batch(5..10), batch(10..14)]);
        let result = collect_listings(&mut page, "http://example.test").await.unwrap();
        assert_eq!(result.listings.len(), 14);
        assert_eq!(result.pages_scanned, 3);
        // page order then document order
        let ids: Vec<_> = result.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids[0], "prop0");
        assert_eq!(ids[13], "prop13");
        // consent handled once up front and once per transition
        assert_eq!(page.consent_prompts, 3);
    }

    #[tokio::test]
    async fn single_page_terminates_when_next_is_disabled() {
        let mut page = MockPageSource::new(vec![batch(0..4)]);
        let result = collect_listings(&mut page, "http://example.test").await.unwrap();
        assert_eq!(result.listings.len(), 4);
        assert_eq!(result.pages_scanned, 1);
    }

    #[tokio::test]
    async fn advance_timeout_is_fatal_and_discards_pages() {
        let mut page = MockPageSource::new(vec![batch(0..5), batch(5..10)]);
        page.fail_on_advance = true;
        let result = collect_listings(&mut page, "http://example.test").await;
        assert!(matches!(result, Err(EtlError::ExtractionTimeout(_))));
    }
}
