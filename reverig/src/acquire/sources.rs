//! Ordered archive source list.
//!
//! Sources are URL templates containing an `{id}` placeholder. They are tried
//! strictly in list order; position is the only preference signal.

/// Placeholder substituted with the app id in every template.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Built-in mirror templates, in priority order.
pub const DEFAULT_SOURCES: &[&str] = &[
    "https://api.swa-recloud.fun/api/v3/file/{id}.zip",
    "https://raw.githubusercontent.com/sushi-dev55-alt/sushitools-games-repo-alt/refs/heads/main/{id}.zip",
    "http://masss.pythonanywhere.com/storage?auth=IEOIJE54esfsipoE56GE4&appid={id}",
    "http://167.235.229.108/m/{id}",
    "http://167.235.229.108/{id}",
    "https://pub-5b6d3b7c03fd4ac1afb5bd3017850e20.r2.dev/{id}.zip",
    "https://walftech.com/proxy.php?url=https%3A%2F%2Fsteamgames554.s3.us-east-1.amazonaws.com%2F{id}.zip",
    "https://github.com/SPIN0ZAi/SB_manifest_DB/archive/refs/heads/{id}.zip",
    "https://github.com/dvahana2424-web/sojogamesdatabase1/archive/refs/heads/{id}.zip",
    "https://github.com/LightnigFast/ProjectLightningManifests/archive/refs/heads/{id}.zip",
    "https://github.com/sojorepo/sojogames/archive/refs/heads/{id}.zip",
    "https://github.com/Fairyvmos/bruh-hub/archive/refs/heads/{id}.zip",
    "https://github.com/hansaes/ManifestAutoUpdate/archive/refs/heads/{id}.zip",
    "https://github.com/SteamAutoCracks/ManifestHub/archive/refs/heads/{id}.zip",
];

/// An ordered list of URL templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceList {
    templates: Vec<String>,
}

impl Default for SourceList {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCES.iter().map(|s| s.to_string()))
    }
}

impl SourceList {
    /// Create a source list from templates, keeping their order.
    pub fn new<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            templates: templates.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of configured sources.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no sources are configured.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The raw templates in order.
    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    /// Expand every template for the given app id, preserving order.
    pub fn urls_for(&self, app_id: u32) -> Vec<String> {
        let id = app_id.to_string();
        self.templates
            .iter()
            .map(|t| t.replace(ID_PLACEHOLDER, &id))
            .collect()
    }
}
