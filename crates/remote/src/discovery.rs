//! Live profile discovery.
//!
//! The tool's frontend embeds the available profile names in its index
//! page and bundled scripts. Discovery fetches the index, follows every
//! `<script src>`, and runs the profile pattern over all of it.

use std::sync::LazyLock;

use migrun_core::profile::{extract_profiles, MigrationProfile};
use regex::Regex;
use reqwest::Url;

use crate::api::{ToolApi, ToolApiError};

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// `src` attributes of every `<script>` tag, in document order.
pub fn script_sources(index_html: &str) -> Vec<String> {
    SCRIPT_SRC_RE
        .captures_iter(index_html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Resolve script sources against the index URL, dropping duplicates.
pub fn resolve_script_urls(index_url: &str, sources: &[String]) -> Result<Vec<String>, ToolApiError> {
    let base = Url::parse(index_url)
        .map_err(|e| ToolApiError::InvalidUrl(format!("{index_url}: {e}")))?;

    let mut urls: Vec<String> = Vec::with_capacity(sources.len());
    for src in sources {
        let url = base
            .join(src)
            .map_err(|e| ToolApiError::InvalidUrl(format!("{src}: {e}")))?
            .to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

/// Fetch the index page and its scripts and extract profile names.
///
/// Any failed fetch aborts discovery. An empty result is returned as-is;
/// the caller decides how to degrade.
pub async fn discover_profiles(
    api: &ToolApi,
    index_url: &str,
) -> Result<Vec<MigrationProfile>, ToolApiError> {
    let index = api.fetch_text(index_url).await?;
    let script_urls = resolve_script_urls(index_url, &script_sources(&index))?;

    let mut documents = Vec::with_capacity(script_urls.len() + 1);
    documents.push(index);
    for url in &script_urls {
        tracing::debug!(url = %url, "Fetching frontend script");
        documents.push(api.fetch_text(url).await?);
    }

    let profiles = extract_profiles(documents.iter().map(String::as_str));
    tracing::info!(
        scripts = script_urls.len(),
        profiles = profiles.len(),
        "Profile discovery finished",
    );
    Ok(profiles)
}
