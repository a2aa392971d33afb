//! Marketplace content API: card lookup for catalog registration

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;

use super::check_status;
use super::resilience::RetryPolicy;

pub const CARDS_LIST_PATH: &str = "/content/v2/get/cards/list";

/// What registration needs from a marketplace card
#[derive(Debug, Clone, PartialEq)]
pub struct CardMetadata {
    pub title: Option<String>,
    pub photo_url: String,
}

#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// First card matching `code` in `client`'s cabinet
    async fn card(&self, client: &str, code: &str) -> Result<CardMetadata>;
}

/// API tokens keyed by client name
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, String>,
}

impl TokenStore {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Load a `{"Client": "token"}` JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {}", path.display()))?;
        let tokens: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file: {}", path.display()))?;
        Ok(Self { tokens })
    }

    /// Token of a client; names are matched capitalized ("ип иванов" -> "Ип иванов")
    pub fn token_for(&self, client: &str) -> Result<&str> {
        let key = capitalize(client.trim());
        self.tokens
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("No marketplace token for client '{}'", key))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// First character upper-cased, the rest lower-cased
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Text-search request body for the cards list endpoint
pub fn card_search_body(code: &str) -> Value {
    json!({
        "settings": {
            "filter": { "textSearch": code, "withPhoto": -1 },
            "cursor": { "limit": 100 }
        }
    })
}

/// Title and first photo of the first card in a cards-list response
pub fn first_card(response: &Value, code: &str) -> Result<CardMetadata> {
    let card = response["cards"]
        .as_array()
        .and_then(|cards| cards.first())
        .ok_or_else(|| anyhow!("No marketplace card found for {}", code))?;

    let photo_url = card["photos"]
        .as_array()
        .and_then(|photos| photos.first())
        .and_then(|photo| photo["tm"].as_str())
        .ok_or_else(|| anyhow!("Marketplace card for {} has no photo", code))?;

    Ok(CardMetadata {
        title: card["title"].as_str().map(str::to_string),
        photo_url: photo_url.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    http: reqwest::Client,
    content_url: String,
    tokens: TokenStore,
    retry: RetryPolicy,
}

impl MarketplaceClient {
    pub fn new(http: reqwest::Client, content_url: impl Into<String>, tokens: TokenStore, retry: RetryPolicy) -> Self {
        Self {
            http,
            content_url: content_url.into().trim_end_matches('/').to_string(),
            tokens,
            retry,
        }
    }
}

#[async_trait]
impl ProductLookup for MarketplaceClient {
    async fn card(&self, client: &str, code: &str) -> Result<CardMetadata> {
        if code.trim().is_empty() {
            bail!("Empty product code");
        }
        let token = self.tokens.token_for(client)?;
        let url = format!("{}{}", self.content_url, CARDS_LIST_PATH);
        let body = card_search_body(code);

        let response: Value = self
            .retry
            .execute("cards.list", || {
                let request = self.http.post(&url).header("Authorization", token).json(&body);
                async move {
                    let response = request.send().await.context("cards.list request failed")?;
                    let response = check_status("cards.list", response).await?;
                    response.json::<Value>().await.context("Failed to parse cards.list response")
                }
            })
            .await?;

        first_card(&response, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("ип ИВАНОВ"), "Ип иванов");
        assert_eq!(capitalize("ooo"), "Ooo");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_token_lookup_capitalizes_client() {
        let store = TokenStore::new(HashMap::from([("Ип иванов".to_string(), "tok".to_string())]));
        assert_eq!(store.token_for("ИП Иванов").unwrap(), "tok");
        assert!(store.token_for("ООО Ромашка").is_err());
    }

    #[test]
    fn test_load_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Alpha": "a-token", "Beta": "b-token"}}"#).unwrap();

        let store = TokenStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.token_for("alpha").unwrap(), "a-token");
    }

    #[test]
    fn test_search_body() {
        let body = card_search_body("wild99");
        assert_eq!(body["settings"]["filter"]["textSearch"], "wild99");
        assert_eq!(body["settings"]["filter"]["withPhoto"], -1);
        assert_eq!(body["settings"]["cursor"]["limit"], 100);
    }

    #[test]
    fn test_first_card() {
        let response = json!({
            "cards": [
                {"title": "Кроссовки", "photos": [{"big": "b.webp", "tm": "tm.webp"}, {"tm": "second.webp"}]},
                {"title": "Другое", "photos": [{"tm": "other.webp"}]}
            ]
        });
        assert_eq!(
            first_card(&response, "wild99").unwrap(),
            CardMetadata { title: Some("Кроссовки".into()), photo_url: "tm.webp".into() }
        );
    }

    #[test]
    fn test_first_card_errors() {
        assert!(first_card(&json!({"cards": []}), "wild1").is_err());
        assert!(first_card(&json!({"cards": [{"photos": []}]}), "wild1").is_err());
        assert!(first_card(&json!({}), "wild1").is_err());
    }
}
