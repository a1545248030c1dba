use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use thirtyfour::{error::WebDriverError, WebDriver};

use crate::domain::extract_emails_from_markup;

/// Visits one institution page and returns the raw, unvalidated email
/// candidates found in its markup. The whole visit runs under `timeout` so
/// a stalled navigation cannot hang the run.
pub async fn collect_school_emails(
    driver: &WebDriver,
    link: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let visit = async {
        driver.goto(link).await?;
        let page_source = driver.source().await?;
        Ok::<_, WebDriverError>(extract_emails_from_markup(&page_source))
    };

    tokio::time::timeout(timeout, visit)
        .await
        .map_err(|_| anyhow!("navigation to {} did not finish within {:?}", link, timeout))?
        .context("institution page visit failed")
}
