//! Our World in Data CSV download.

use reqwest::blocking::Client;
use tracing::{info, instrument};

use crate::error::AppError;

/// Public OWID COVID-19 dataset.
pub const DEFAULT_DATA_URL: &str = "https://covid.ourworldindata.org/data/owid-covid-data.csv";

/// Environment variable overriding [`DEFAULT_DATA_URL`].
pub const DATA_URL_ENV: &str = "COVID_TRENDS_URL";

/// Anything that can produce the dataset's CSV text.
pub trait CsvSource {
    fn fetch_csv(&self) -> Result<String, AppError>;
}

pub struct OwidClient {
    client: Client,
    url: String,
}

impl OwidClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl CsvSource for OwidClient {
    #[instrument(skip(self), fields(url = %self.url))]
    fn fetch_csv(&self) -> Result<String, AppError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| AppError::io(format!("Dataset request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::io(format!(
                "Dataset request failed with status {}.",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .map_err(|e| AppError::io(format!("Failed to read dataset response: {e}")))?;
        info!(bytes = body.len(), "downloaded dataset");
        Ok(body)
    }
}
