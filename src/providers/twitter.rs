//! Twitter API v2 client, OAuth 1.0a user context.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest_oauth1::OAuthClientProvider;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TwitterCredentials;
use crate::error::PlatformError;
use crate::models::{Item, MediaRef, SearchMode, SentPost};
use crate::providers::PlatformClient;

const API_BASE: &str = "https://api.twitter.com/2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TwitterClient {
    http: reqwest::Client,
    credentials: TwitterCredentials,
    username: String,
}

impl TwitterClient {
    pub fn new(credentials: TwitterCredentials, username: &str) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Http(e.to_string()))?;
        Ok(TwitterClient {
            http,
            credentials,
            username: username.trim_start_matches('@').to_string(),
        })
    }

    fn secrets(&self) -> reqwest_oauth1::Secrets<'_> {
        reqwest_oauth1::Secrets::new(
            self.credentials.consumer_key.as_str(),
            self.credentials.consumer_secret.as_str(),
        )
        .token(
            self.credentials.access_token.as_str(),
            self.credentials.access_token_secret.as_str(),
        )
    }

    async fn read_success(response: reqwest::Response) -> Result<String, PlatformError> {
        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|reset| (reset - Utc::now().timestamp()).try_into().ok())
                .map(Duration::from_secs);
            return Err(PlatformError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(PlatformError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
    created_at: Option<String>,
    conversation_id: Option<String>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
}

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTo<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyTo<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

/// Maps a `search/recent` body to items, resolving author handles from the
/// user expansion. Missing timestamps stay `None` and are rejected downstream.
pub(crate) fn parse_search_response(body: &str) -> Result<Vec<Item>, PlatformError> {
    let page: SearchResponse =
        serde_json::from_str(body).map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

    let handles: HashMap<&str, &str> = page
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();

    Ok(page
        .data
        .iter()
        .map(|tweet| Item {
            id: tweet.id.clone(),
            author_handle: tweet
                .author_id
                .as_deref()
                .map(|id| handles.get(id).copied().unwrap_or(id).to_string())
                .unwrap_or_default(),
            text: tweet.text.clone(),
            created_at_epoch_secs: tweet
                .created_at
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.timestamp()),
            conversation_id: tweet.conversation_id.clone(),
            in_reply_to_id: tweet
                .referenced_tweets
                .iter()
                .find(|r| r.kind == "replied_to")
                .map(|r| r.id.clone()),
        })
        .collect())
}

/// The image reference travels as a link at the end of the post.
pub(crate) fn status_text(text: &str, media: Option<&MediaRef>) -> String {
    match media {
        Some(media) if !text.contains(&media.url) => format!("{} {}", text.trim_end(), media.url),
        _ => text.to_string(),
    }
}

#[async_trait]
impl PlatformClient for TwitterClient {
    async fn search_recent(
        &self,
        query: &str,
        limit: usize,
        mode: SearchMode,
    ) -> Result<Vec<Item>, PlatformError> {
        // The endpoint only accepts 10..=100
        let max_results = limit.clamp(10, 100).to_string();
        let sort_order = match mode {
            SearchMode::Latest => "recency",
            SearchMode::Top => "relevancy",
        };
        let params = [
            ("query", query),
            ("max_results", max_results.as_str()),
            ("sort_order", sort_order),
            (
                "tweet.fields",
                "created_at,author_id,conversation_id,referenced_tweets",
            ),
            ("expansions", "author_id"),
            ("user.fields", "username"),
        ];

        debug!(query = %query, limit, "Searching recent tweets");
        let response = self
            .http
            .clone()
            .oauth1(self.secrets())
            .get(format!("{}/tweets/search/recent", API_BASE))
            .query(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        let body = Self::read_success(response).await?;
        let mut items = parse_search_response(&body)?;
        items.truncate(limit);
        Ok(items)
    }

    async fn send_reply(
        &self,
        text: &str,
        reply_to_id: Option<&str>,
        media: Option<&MediaRef>,
    ) -> Result<SentPost, PlatformError> {
        let text = status_text(text, media);
        let payload = serde_json::to_string(&CreateTweet {
            text: &text,
            reply: reply_to_id.map(|id| ReplyTo {
                in_reply_to_tweet_id: id,
            }),
        })
        .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        let response = self
            .http
            .clone()
            .oauth1(self.secrets())
            .post(format!("{}/tweets", API_BASE))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        let body = Self::read_success(response).await?;
        let created: CreateTweetResponse = serde_json::from_str(&body)
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        Ok(SentPost {
            permalink: format!("https://x.com/{}/status/{}", self.username, created.data.id),
            id: created.data.id,
        })
    }
}
