//! Market-news headline feeds.
//!
//! Two JSON sources cover the whole market: the UDN breaking-news feed
//! and the cnyes headline API. Both are fetched once per refresh cycle
//! and shared read-only across every candidate; a dead feed degrades to
//! an empty contribution, never an aborted cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use futures::future::join_all;
use std::time::Duration;
use tracing::warn;

use super::NewsSource;
use crate::net::ResilientClient;
use crate::types::NewsItem;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// ---------------------------------------------------------------------------
// UDN breaking news
// ---------------------------------------------------------------------------

const UDN_URL: &str = "https://udn.com/api/more";

pub struct UdnNews {
    http: ResilientClient,
}

impl UdnNews {
    pub fn new(retries: u32) -> Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)
                .context("Failed to build UDN client")?,
        })
    }

    fn parse_page(body: &serde_json::Value, out: &mut Vec<NewsItem>) {
        let Some(lists) = body.get("lists").and_then(|l| l.as_array()) else {
            return;
        };
        for item in lists {
            let title = item
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .trim();
            if title.is_empty() {
                continue;
            }
            let body_text = item
                .get("paragraph")
                .and_then(|p| p.as_str())
                .unwrap_or("")
                .trim();
            let publish_time = item
                .pointer("/time/date")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .trim();
            let mut url = item
                .get("titleLink")
                .and_then(|l| l.as_str())
                .unwrap_or("")
                .to_string();
            if !url.is_empty() && !url.starts_with("http") {
                url = format!("https://udn.com{url}");
            }
            out.push(NewsItem::raw(title, body_text, publish_time, "聯合新聞網", url));
        }
    }
}

#[async_trait]
impl NewsSource for UdnNews {
    async fn fetch(&self, pages: u32) -> Result<Vec<NewsItem>> {
        let mut out = Vec::new();
        for page in 1..=pages {
            let query = [
                ("page", page.to_string()),
                ("channelId", "1".to_string()),
                ("cate_id", "0".to_string()),
                ("type", "breaknews".to_string()),
            ];
            let headers = [
                ("Referer", "https://udn.com/news/breaknews/1"),
                ("User-Agent", BROWSER_UA),
            ];
            match self.http.get_json(UDN_URL, &query, &headers).await {
                Ok(body) => Self::parse_page(&body, &mut out),
                Err(e) => {
                    warn!(page, error = %e, "UDN page fetch failed");
                    continue;
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "udn"
    }
}

// ---------------------------------------------------------------------------
// cnyes headlines
// ---------------------------------------------------------------------------

const CNYES_URL: &str = "https://api.cnyes.com/media/api/v1/newslist/category/headline";

/// Items per page requested from cnyes.
const CNYES_PAGE_LIMIT: u32 = 30;

pub struct CnyesNews {
    http: ResilientClient,
}

impl CnyesNews {
    pub fn new(retries: u32) -> Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)
                .context("Failed to build cnyes client")?,
        })
    }

    fn parse_page(body: &serde_json::Value, out: &mut Vec<NewsItem>) {
        let Some(data) = body.pointer("/items/data").and_then(|d| d.as_array()) else {
            return;
        };
        for item in data {
            let title = item
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .trim();
            if title.is_empty() {
                continue;
            }
            let summary = item
                .get("summary")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .trim();
            let publish_time = item
                .get("publishAt")
                .and_then(|p| p.as_i64())
                .and_then(|ts| Local.timestamp_opt(ts, 0).single())
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let url = item
                .get("newsId")
                .and_then(|n| n.as_i64())
                .map(|id| format!("https://news.cnyes.com/news/id/{id}"))
                .unwrap_or_default();
            out.push(NewsItem::raw(title, summary, publish_time, "鉅亨網", url));
        }
    }
}

#[async_trait]
impl NewsSource for CnyesNews {
    async fn fetch(&self, pages: u32) -> Result<Vec<NewsItem>> {
        let mut out = Vec::new();
        for page in 1..=pages {
            let query = [
                ("page", page.to_string()),
                ("limit", CNYES_PAGE_LIMIT.to_string()),
                ("isCategoryHeadline", "1".to_string()),
            ];
            let headers = [
                ("Origin", "https://news.cnyes.com"),
                ("Referer", "https://news.cnyes.com/"),
                ("User-Agent", BROWSER_UA),
            ];
            match self.http.get_json(CNYES_URL, &query, &headers).await {
                Ok(body) => Self::parse_page(&body, &mut out),
                Err(e) => {
                    warn!(page, error = %e, "cnyes page fetch failed");
                    continue;
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "cnyes"
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Fetch every source concurrently, concatenating whatever each one
/// managed to produce in source order. A failed source logs and
/// contributes nothing.
pub async fn fetch_all_news(sources: &[Box<dyn NewsSource>], pages: u32) -> Vec<NewsItem> {
    let fetches = sources.iter().map(|s| s.fetch(pages));
    let mut all = Vec::new();
    for (source, result) in sources.iter().zip(join_all(fetches).await) {
        match result {
            Ok(mut items) => all.append(&mut items),
            Err(e) => warn!(source = source.name(), error = %e, "News source failed"),
        }
    }
    all
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
