pub mod data_persistance;
pub mod directory_scraper;
pub mod droid;
pub mod school_scraper;

pub use data_persistance::*;
pub use directory_scraper::*;
pub use droid::*;
pub use school_scraper::*;
