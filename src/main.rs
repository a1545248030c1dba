use std::path::PathBuf;

use campus::{configuration::get_configuration, startup};
use env_logger::Env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("fix") => {
            let path = args
                .next()
                .map(PathBuf::from)
                .unwrap_or_else(|| configuration.output.json_path.clone());
            let summary = startup::run_fix(&path)?;
            log::info!(
                "Fixed {} records in {} ({} still carry emails)",
                summary.records,
                path.display(),
                summary.with_emails
            );
        }
        _ => {
            let summary = startup::run(configuration).await?;
            log::info!(
                "Scrape finished: {} schools ({} with emails); skipped {} countries; failures: {} countries, {} cities, {} institutions",
                summary.schools,
                summary.schools_with_emails,
                summary.countries_skipped,
                summary.countries_failed,
                summary.cities_failed,
                summary.institutions_failed
            );
        }
    }

    Ok(())
}
