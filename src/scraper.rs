use async_trait::async_trait;
use ::scraper::{ElementRef, Html, Selector};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_default()
});

// Create static selectors to avoid recompiling them each time
static NICKNAME_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.user-screenname").expect("Failed to parse nickname selector")
});

static STATUS_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.user-status").expect("Failed to parse status selector")
});

static BRIEF_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.brief").expect("Failed to parse brief selector")
});

static POST_TEXT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".text").expect("Failed to parse post text selector")
});

/// A scraped user: who they say they are and what they have posted lately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub nickname: String,
    pub intro: String,
    pub status: String,
    pub posts: Vec<String>,
}

/// Where profile pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches pages over HTTP with the shared client.
#[derive(Clone)]
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new() -> Self {
        Self { client: CLIENT.clone() }
    }
}

impl Default for HttpPageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        validate_url(url)?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::FetchError(format!("HTTP {} for {}", status.as_u16(), url)));
        }

        let html = response.text().await?;
        debug!(url, bytes = html.len(), "fetched profile page");
        Ok(html)
    }
}

/// Only absolute http(s) URLs are fetched.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| AppError::FetchError(format!("Invalid URL {:?}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(AppError::FetchError(format!("Unsupported URL scheme: {}", scheme))),
    }
}

pub fn extract_profile(html: &str) -> Result<Profile> {
    let document = Html::parse_document(html);

    let nickname = required_text(&document, &NICKNAME_SELECTOR, "nickname container (div.user-screenname)")?;
    let status = required_text(&document, &STATUS_SELECTOR, "status container (div.user-status)")?;
    let intro = required_text(&document, &BRIEF_SELECTOR, "bio container (div.brief)")?;
    let posts: Vec<String> = document
        .select(&POST_TEXT_SELECTOR)
        .map(element_text)
        .collect();

    debug!(nickname = %nickname, posts = posts.len(), "extracted profile");

    Ok(Profile {
        nickname,
        intro,
        status,
        posts,
    })
}

fn required_text(document: &Html, selector: &Selector, what: &str) -> Result<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .ok_or_else(|| AppError::ExtractionError(format!("missing {}", what)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
