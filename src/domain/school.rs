use serde::{Deserialize, Serialize};

/// One institution as persisted to both sinks. `emails` is absent, not
/// empty, when no syntactically valid address was found on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub country: String,
    pub city: String,
    pub name: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
}

/// A name/link pair harvested from the results table, before the
/// institution page has been visited.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolLink {
    pub name: String,
    pub link: String,
}
