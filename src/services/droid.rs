use thirtyfour::{
    error::WebDriverResult, ChromiumLikeCapabilities, DesiredCapabilities, WebDriver,
};

use crate::configuration::WebDriverSettings;

/// The one browser session of a run. Owned by the caller and released
/// through `quit` on every exit path.
pub struct Droid {
    pub driver: WebDriver,
}

impl Droid {
    pub async fn new(settings: &WebDriverSettings) -> WebDriverResult<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if settings.headless {
            caps.set_headless()?;
        }

        let driver = WebDriver::new(&settings.url, caps).await?;
        driver.maximize_window().await?;

        Ok(Droid { driver })
    }

    pub async fn quit(self) -> WebDriverResult<()> {
        self.driver.quit().await
    }
}
