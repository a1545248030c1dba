use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use thirtyfour::{By, WebDriver};
use url::Url;

use crate::configuration::DirectorySettings;
use crate::domain::{filter_valid_emails, SchoolLink, SchoolRecord};

use super::data_persistance::{JsonArraySink, WorkbookSink};
use super::school_scraper::collect_school_emails;

pub const COUNTRY_SELECT_ID: &str = "SelectedRegionId";
pub const CITY_SELECT_ID: &str = "SelectedCity";
pub const SEARCH_BUTTON_ID: &str = "search";
pub const RESULT_CONTAINER_CLASS: &str = "result-container";

const RESULT_ANCHOR_SELECTOR: &str = ".result-container tbody tr td a";
const ONLINE_SENTINEL: &str = "Online";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDecision {
    Process,
    SkipSentinel,
    SkipNotAllowed,
}

/// Skip policy for a country value read back from the dropdown. The
/// "Online" sentinel wins over allow-list membership.
pub fn classify_country(value: &str, allowed_countries: &[String]) -> SelectionDecision {
    if value == ONLINE_SENTINEL {
        return SelectionDecision::SkipSentinel;
    }
    if allowed_countries.iter().any(|country| country == value) {
        SelectionDecision::Process
    } else {
        SelectionDecision::SkipNotAllowed
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub schools: usize,
    pub schools_with_emails: usize,
    pub countries_skipped: usize,
    pub countries_failed: usize,
    pub cities_failed: usize,
    pub institutions_failed: usize,
}

enum CountryOutcome {
    Scraped,
    Skipped(SelectionDecision),
}

/// Drives the whole country -> city -> institution loop against a live
/// session. Step errors are logged and skipped at the level they occur:
/// a country step error moves on to the next country, a city step error to
/// the next city, an institution step error to the next institution. Only
/// failures before the loop starts abort the run.
pub async fn scrape_directory(
    driver: &WebDriver,
    settings: &DirectorySettings,
    json_sink: &mut JsonArraySink,
    workbook: &mut WorkbookSink,
) -> Result<RunSummary> {
    let base_url = Url::parse(&settings.url)
        .with_context(|| format!("invalid directory url {:?}", settings.url))?;

    driver.goto(&settings.url).await?;

    // Index 0 is the placeholder option on both dropdowns.
    let country_count = dropdown_option_count(driver, COUNTRY_SELECT_ID)
        .await
        .context("country dropdown discovery failed")?;

    let mut summary = RunSummary::default();

    for country_index in 1..country_count {
        let scraped = scrape_country(
            driver,
            settings,
            &base_url,
            country_index,
            json_sink,
            workbook,
            &mut summary,
        )
        .await;

        match scraped {
            Ok(CountryOutcome::Scraped) => {}
            Ok(CountryOutcome::Skipped(decision)) => {
                summary.countries_skipped += 1;
                log::info!("Skipping country at index {}: {:?}", country_index, decision);
            }
            Err(e) => {
                summary.countries_failed += 1;
                log::error!("Giving up on country at index {}: {:#}", country_index, e);
            }
        }
    }

    Ok(summary)
}

async fn scrape_country(
    driver: &WebDriver,
    settings: &DirectorySettings,
    base_url: &Url,
    country_index: usize,
    json_sink: &mut JsonArraySink,
    workbook: &mut WorkbookSink,
    summary: &mut RunSummary,
) -> Result<CountryOutcome> {
    let country = select_dropdown_option(driver, COUNTRY_SELECT_ID, country_index).await?;

    let decision = classify_country(&country, &settings.allowed_countries);
    if decision != SelectionDecision::Process {
        return Ok(CountryOutcome::Skipped(decision));
    }

    wait_for_selected_value(driver, COUNTRY_SELECT_ID, &country, settings.dropdown_timeout())
        .await?;

    let city_count = dropdown_option_count(driver, CITY_SELECT_ID).await?;

    for city_index in 1..city_count {
        let scraped = scrape_city(
            driver,
            settings,
            base_url,
            &country,
            city_index,
            json_sink,
            workbook,
            summary,
        )
        .await;

        if let Err(e) = scraped {
            summary.cities_failed += 1;
            log::error!(
                "Skipping city at index {} of {}: {:#}",
                city_index,
                country,
                e
            );
        }
    }

    Ok(CountryOutcome::Scraped)
}

#[allow(clippy::too_many_arguments)]
async fn scrape_city(
    driver: &WebDriver,
    settings: &DirectorySettings,
    base_url: &Url,
    country: &str,
    city_index: usize,
    json_sink: &mut JsonArraySink,
    workbook: &mut WorkbookSink,
    summary: &mut RunSummary,
) -> Result<()> {
    let city = select_dropdown_option(driver, CITY_SELECT_ID, city_index).await?;
    wait_for_selected_value(driver, CITY_SELECT_ID, &city, settings.dropdown_timeout()).await?;

    driver.find(By::Id(SEARCH_BUTTON_ID)).await?.click().await?;
    driver
        .execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
        .await?;

    // The results table re-renders in place; give it a moment before
    // polling for the container.
    tokio::time::sleep(settings.results_settle_delay()).await;
    wait_for_element(
        driver,
        By::ClassName(RESULT_CONTAINER_CLASS),
        settings.dropdown_timeout(),
    )
    .await?;

    let page_source = driver.source().await?;
    let schools = harvest_schools(&page_source, base_url);

    match schools.is_empty() {
        true => log::warn!("Search returned no schools for {} / {}", country, city),
        false => log::info!("Found {} schools for {} / {}", schools.len(), country, city),
    }

    for school in schools {
        match visit_school(driver, settings, country, &city, &school).await {
            Ok(record) => match json_sink.append(&record) {
                Ok(()) => {
                    workbook.add(&record);
                    summary.schools += 1;
                    if record.emails.is_some() {
                        summary.schools_with_emails += 1;
                    }
                    log::info!("{:?}", record);
                }
                Err(e) => {
                    summary.institutions_failed += 1;
                    log::error!("Failed to persist record for {:?}: {:#}", record.name, e);
                }
            },
            Err(e) => {
                summary.institutions_failed += 1;
                log::error!("Skipping school {:?}: {:#}", school.name, e);
            }
        }

        // Return to the results page no matter how the visit went.
        driver
            .back()
            .await
            .context("failed to navigate back to the results page")?;
    }

    Ok(())
}

async fn visit_school(
    driver: &WebDriver,
    settings: &DirectorySettings,
    country: &str,
    city: &str,
    school: &SchoolLink,
) -> Result<SchoolRecord> {
    let raw_emails =
        collect_school_emails(driver, &school.link, settings.navigation_timeout()).await?;
    let emails = filter_valid_emails(raw_emails);

    Ok(SchoolRecord {
        country: country.to_string(),
        city: city.to_string(),
        name: school.name.clone(),
        link: school.link.clone(),
        emails: (!emails.is_empty()).then_some(emails),
    })
}

/// Pure harvest over page source: anchors under the results container's
/// table rows, visible text plus href, with relative hrefs resolved
/// against the directory URL.
pub fn harvest_schools(page_source: &str, base: &Url) -> Vec<SchoolLink> {
    let anchor_selector = Selector::parse(RESULT_ANCHOR_SELECTOR).unwrap();

    let document = Html::parse_document(page_source);
    document
        .select(&anchor_selector)
        .filter_map(|anchor| {
            let name = anchor.text().collect::<String>().trim().to_string();
            let href = anchor.value().attr("href")?;
            let link = match base.join(href) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    log::debug!("Skipping anchor with unresolvable href {:?}: {}", href, e);
                    return None;
                }
            };
            Some(SchoolLink { name, link })
        })
        .collect()
}

async fn dropdown_option_count(driver: &WebDriver, select_id: &str) -> Result<usize> {
    let select = driver.find(By::Id(select_id)).await?;
    let options = select.find_all(By::Tag("option")).await?;
    Ok(options.len())
}

/// Selects the option at `index` and reads the confirmed value back from
/// the control.
async fn select_dropdown_option(
    driver: &WebDriver,
    select_id: &str,
    index: usize,
) -> Result<String> {
    let select = driver.find(By::Id(select_id)).await?;
    let options = select.find_all(By::Tag("option")).await?;
    let option = options
        .get(index)
        .with_context(|| format!("#{} has no option at index {}", select_id, index))?;
    option.click().await?;

    let value = select.value().await?.unwrap_or_default();
    Ok(value)
}

async fn wait_for_selected_value(
    driver: &WebDriver,
    select_id: &str,
    expected: &str,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let current = driver
            .find(By::Id(select_id))
            .await?
            .value()
            .await?
            .unwrap_or_default();
        if current == expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("#{} did not settle on {:?} within {:?}", select_id, expected, timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn wait_for_element(driver: &WebDriver, locator: By, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if driver.find(locator.clone()).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("{:?} did not appear within {:?}", locator, timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::data_persistance::load_records;

    fn allowed() -> Vec<String> {
        ["Turkey", "Georgia"].iter().map(|c| c.to_string()).collect()
    }

    const RESULTS_PAGE: &str = r#"
<html>
  <body>
    <a href="/why-choose-us/">Why choose us</a>
    <div class="result-container">
      <table>
        <tbody>
          <tr>
            <td><a href="/schools/ankara-international">Ankara International School</a></td>
            <td>Ankara</td>
          </tr>
          <tr>
            <td><a href="https://other.example.org/schools/bilkent">Bilkent Laboratory School</a></td>
            <td>Ankara</td>
          </tr>
        </tbody>
      </table>
    </div>
    <footer><a href="/contact">Contact</a></footer>
  </body>
</html>
"#;

    #[test]
    fn online_sentinel_is_always_skipped() {
        let mut allow_list = allowed();
        allow_list.push("Online".to_string());
        assert_eq!(
            classify_country("Online", &allow_list),
            SelectionDecision::SkipSentinel
        );
    }

    #[test]
    fn allow_listed_country_is_processed() {
        assert_eq!(classify_country("Turkey", &allowed()), SelectionDecision::Process);
    }

    #[test]
    fn other_countries_are_skipped() {
        assert_eq!(
            classify_country("France", &allowed()),
            SelectionDecision::SkipNotAllowed
        );
    }

    #[test]
    fn harvests_name_link_pairs_from_results_table() {
        let base = Url::parse("https://directory.example.org/find-a-school/").unwrap();
        let schools = harvest_schools(RESULTS_PAGE, &base);

        assert_eq!(schools.len(), 2);
        assert_eq!(schools[0].name, "Ankara International School");
        assert_eq!(
            schools[0].link,
            "https://directory.example.org/schools/ankara-international"
        );
        assert_eq!(schools[1].name, "Bilkent Laboratory School");
        assert_eq!(schools[1].link, "https://other.example.org/schools/bilkent");
    }

    #[test]
    fn ignores_anchors_outside_the_results_container() {
        let base = Url::parse("https://directory.example.org/").unwrap();
        let names: Vec<String> = harvest_schools(RESULTS_PAGE, &base)
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert!(!names.contains(&"Why choose us".to_string()));
        assert!(!names.contains(&"Contact".to_string()));
    }

    #[test]
    fn page_without_results_harvests_nothing() {
        let base = Url::parse("https://directory.example.org/").unwrap();
        assert!(harvest_schools("<html><body><p>Loading</p></body></html>", &base).is_empty());
    }

    // End-to-end over a fake directory, minus the live browser: the same
    // classify/harvest/filter path the scrape loop runs, feeding the real
    // sinks.
    #[test]
    fn fake_directory_produces_records_only_for_allowed_countries() {
        let allow_list = vec!["Turkey".to_string()];
        let countries = ["Turkey", "Online", "France"];
        let cities = ["Ankara", "Izmir"];
        let base = Url::parse("https://directory.example.org/find-a-school/").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("schools-info.json");
        let mut json_sink = JsonArraySink::create(&json_path).unwrap();
        let mut workbook = WorkbookSink::new(dir.path().join("schools-info.xlsx"));

        for country in countries {
            if classify_country(country, &allow_list) != SelectionDecision::Process {
                continue;
            }
            for city in cities {
                for school in harvest_schools(RESULTS_PAGE, &base) {
                    let emails = filter_valid_emails(vec![
                        "head@school.edu".to_string(),
                        "not-an-email".to_string(),
                    ]);
                    let record = SchoolRecord {
                        country: country.to_string(),
                        city: city.to_string(),
                        name: school.name,
                        link: school.link,
                        emails: (!emails.is_empty()).then_some(emails),
                    };
                    json_sink.append(&record).unwrap();
                    workbook.add(&record);
                }
            }
        }

        json_sink.finish().unwrap();
        workbook.save().unwrap();

        let records = load_records(&json_path).unwrap();
        // Two schools per search, two cities, one allow-listed country.
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.country == "Turkey"));
        assert!(records
            .iter()
            .all(|r| r.emails == Some(vec!["head@school.edu".to_string()])));
    }
}
