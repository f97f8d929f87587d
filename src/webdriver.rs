use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use tracing::info;

use crate::error::{EtlError, Result};
use crate::extract::PageSource;
use crate::model::RawListing;

const CONSENT_BUTTON: &str = "#onetrust-accept-btn-handler";
const CARD: &str = ".l-searchResult";
const CARD_ANCHOR: &str = ".propertyCard-anchor";
const CARD_PRICE: &str = ".propertyCard-priceValue";
const CARD_ADDRESS: &str = ".propertyCard-address";
const NEXT_BUTTON: &str = "button[title='Next page']";
const NEXT_BUTTON_READY: &str = "button[title='Next page']:enabled";

// The results grid hydrates shortly after navigation completes.
const SETTLE: Duration = Duration::from_secs(2);

/// The one concrete page source: a WebDriver session rendering the site.
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    pub async fn connect(webdriver_url: &str) -> Result<Self> {
        info!("Opening WebDriver session at {webdriver_url}");
        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| EtlError::Network(format!("webdriver session: {e}")))?;
        Ok(Self { client })
    }
}

fn page_err(e: CmdError) -> EtlError {
    match e {
        CmdError::WaitTimeout => {
            EtlError::ExtractionTimeout("bounded wait expired".to_string())
        }
        other => EtlError::Network(other.to_string()),
    }
}

#[async_trait]
impl PageSource for WebDriverPage {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.client.goto(url).await.map_err(page_err)?;
        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    async fn accept_consent(&mut self) -> Result<()> {
        let banners = self
            .client
            .find_all(Locator::Css(CONSENT_BUTTON))
            .await
            .map_err(page_err)?;
        if let Some(button) = banners.into_iter().next() {
            // The banner can vanish between locating and clicking.
            let _ = button.click().await;
        }
        Ok(())
    }

    async fn listing_cards(&mut self) -> Result<Vec<RawListing>> {
        let cards = self
            .client
            .find_all(Locator::Css(CARD))
            .await
            .map_err(page_err)?;
        let mut listings = Vec::with_capacity(cards.len());
        for card in cards {
            let id = card
                .find(Locator::Css(CARD_ANCHOR))
                .await
                .map_err(page_err)?
                .attr("id")
                .await
                .map_err(page_err)?
                .ok_or_else(|| {
                    EtlError::MalformedData("listing card anchor has no id".to_string())
                })?;
            let raw_price = card
                .find(Locator::Css(CARD_PRICE))
                .await
                .map_err(page_err)?
                .text()
                .await
                .map_err(page_err)?;
            let address = card
                .find(Locator::Css(CARD_ADDRESS))
                .await
                .map_err(page_err)?
                .attr("title")
                .await
                .map_err(page_err)?
                .ok_or_else(|| {
                    EtlError::MalformedData("listing card address has no title".to_string())
                })?;
            listings.push(RawListing {
                id,
                raw_price,
                address,
            });
        }
        Ok(listings)
    }

    async fn next_enabled(&mut self) -> Result<bool> {
        let buttons = self
            .client
            .find_all(Locator::Css(NEXT_BUTTON))
            .await
            .map_err(page_err)?;
        match buttons.into_iter().next() {
            Some(button) => button.is_enabled().await.map_err(page_err),
            None => Ok(false),
        }
    }

    async fn click_next(&mut self, timeout: Duration) -> Result<()> {
        let button = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(NEXT_BUTTON_READY))
            .await
            .map_err(page_err)?;
        button.click().await.map_err(page_err)
    }

    async fn wait_for_cards(&mut self, timeout: Duration) -> Result<()> {
        self.client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(CARD_ANCHOR))
            .await
            .map_err(page_err)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client.clone().close().await.map_err(page_err)
    }
}
