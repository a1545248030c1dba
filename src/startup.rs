use std::path::Path;

use anyhow::{Context, Result};

use crate::configuration::Settings;
use crate::domain::fix_emails;
use crate::services::{
    data_persistance::{self, JsonArraySink, WorkbookSink},
    directory_scraper::{scrape_directory, RunSummary},
    droid::Droid,
};

/*
 One scrape run:
 1. Open both sinks
 2. Start the browser session
 3. Walk the directory (country -> city -> institution)
 4. Release the session and close the sinks, success or not
*/
pub async fn run(settings: Settings) -> Result<RunSummary> {
    let mut json_sink = JsonArraySink::create(&settings.output.json_path)?;
    let mut workbook = WorkbookSink::new(&settings.output.workbook_path);

    let droid = Droid::new(&settings.webdriver)
        .await
        .context("failed to start the browser session")?;

    let outcome = scrape_directory(
        &droid.driver,
        &settings.directory,
        &mut json_sink,
        &mut workbook,
    )
    .await;

    if let Err(e) = droid.quit().await {
        log::error!("Browser session did not shut down cleanly: {}", e);
    }

    let json_path = json_sink.finish().context("failed to close the JSON output")?;
    log::info!("JSON output closed at {}", json_path.display());
    workbook.save().context("failed to write the workbook")?;

    outcome
}

pub struct FixSummary {
    pub records: usize,
    pub with_emails: usize,
}

/// Retroactive cleanup over an existing JSON array file: dedup and
/// revalidate every record's emails, then rewrite the file in place.
pub fn run_fix(json_path: &Path) -> Result<FixSummary> {
    let mut records = data_persistance::load_records(json_path)?;
    fix_emails(&mut records);
    data_persistance::save_records(json_path, &records)?;

    Ok(FixSummary {
        records: records.len(),
        with_emails: records.iter().filter(|r| r.emails.is_some()).count(),
    })
}
