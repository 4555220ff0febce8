use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::rate::{RateEntry, RateProvider};

/// SGS series 11: the daily Selic rate, in percent per day, which the CDI tracks.
const CDI_SERIES: u32 = 11;

const BCB_DATE_FORMAT: &str = "%d/%m/%Y";

/// Banco Central do Brasil time-series (SGS) provider.
pub struct BcbProvider {
    base_url: String,
    client: reqwest::Client,
}

impl BcbProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("carteira/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SgsEntry {
    data: String,
    valor: String,
}

impl SgsEntry {
    fn parse(&self) -> Result<RateEntry> {
        let date = NaiveDate::parse_from_str(&self.data, BCB_DATE_FORMAT)
            .with_context(|| format!("Invalid date in rate series: {}", self.data))?;
        let rate = self
            .valor
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .with_context(|| format!("Invalid rate value for {}: {}", self.data, self.valor))?;
        Ok(RateEntry { date, rate })
    }
}

#[async_trait]
impl RateProvider for BcbProvider {
    #[instrument(name = "BcbSeriesFetch", skip(self), fields(series = CDI_SERIES))]
    async fn fetch_series(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RateEntry>> {
        let url = format!(
            "{}/dados/serie/bcdata.sgs.{}/dados?formato=json&dataInicial={}&dataFinal={}",
            self.base_url,
            CDI_SERIES,
            start.format(BCB_DATE_FORMAT),
            end.format(BCB_DATE_FORMAT)
        );
        debug!("Requesting rate series from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for rate series: {}", e, CDI_SERIES))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for rate series: {}",
                response.status(),
                CDI_SERIES
            ));
        }

        let text = response.text().await?;
        let entries: Vec<SgsEntry> = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse JSON response for rate series {}: {}",
                CDI_SERIES,
                e
            )
        })?;

        // Provider order is chronological; accumulation depends on it.
        entries.iter().map(SgsEntry::parse).collect()
    }
}
