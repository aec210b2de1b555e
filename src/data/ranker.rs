//! News ranking: sentiment scoring, source weighting, recency decay.
//!
//! A deterministic keyword scorer stands in for the upstream ML
//! sentiment service. Each item gets a POSITIVE/NEGATIVE/NEUTRAL label
//! with a confidence in [0.5, 1.0], then a weighted score combining the
//! source's reliability weight and a publish-time decay; the batch is
//! returned sorted by weighted score, best first.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::types::{NewsItem, Sentiment};

// ---------------------------------------------------------------------------
// Sentiment keywords
// ---------------------------------------------------------------------------

const POSITIVE_TERMS: &[&str] = &[
    "大漲", "上漲", "漲停", "創新高", "新高", "看好", "樂觀", "成長", "利多",
    "買超", "回補", "強勁", "轉盈", "優於預期", "突破",
    "surge", "rally", "record high", "beat", "upgrade", "growth", "strong",
];

const NEGATIVE_TERMS: &[&str] = &[
    "大跌", "下跌", "跌停", "重挫", "新低", "看壞", "悲觀", "衰退", "利空",
    "賣超", "疲弱", "轉虧", "不如預期", "警告", "裁員",
    "plunge", "slump", "crash", "miss", "downgrade", "weak", "layoff",
];

/// Classify text into a sentiment label and a confidence score.
///
/// Confidence is the dominant-term share of all matched terms, so it
/// lives in [0.5, 1.0]; text with no matched terms is NEUTRAL at 0.5.
pub fn score_sentiment(text: &str) -> (Sentiment, f64) {
    let lower = text.to_lowercase();
    let count = |terms: &[&str]| -> usize {
        terms.iter().filter(|t| lower.contains(*t)).count()
    };
    let pos = count(POSITIVE_TERMS);
    let neg = count(NEGATIVE_TERMS);

    if pos + neg == 0 {
        return (Sentiment::Neutral, 0.5);
    }
    let total = (pos + neg) as f64;
    if pos >= neg {
        (Sentiment::Positive, pos as f64 / total)
    } else {
        (Sentiment::Negative, neg as f64 / total)
    }
}

// ---------------------------------------------------------------------------
// Source weights
// ---------------------------------------------------------------------------

const SOURCE_WEIGHTS: &[(&str, f64)] = &[
    ("中央社", 1.2),
    ("經濟日報", 1.1),
    ("聯合新聞網", 1.0),
    ("自由時報", 1.0),
    ("鉅亨網", 0.9),
    ("ETtoday", 0.85),
    ("Yahoo新聞", 0.8),
];

const DEFAULT_SOURCE_WEIGHT: f64 = 0.9;

fn source_weight(source: &str) -> f64 {
    SOURCE_WEIGHTS
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_SOURCE_WEIGHT)
}

// ---------------------------------------------------------------------------
// Recency decay
// ---------------------------------------------------------------------------

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

fn parse_publish_time(raw: &str) -> Option<DateTime<Local>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Local.from_local_datetime(&dt).single();
        }
    }
    // Some feeds only give a date. `get` declines mid-character byte
    // indexes, which non-ASCII timestamps would otherwise trip over.
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Local
                .from_local_datetime(&d.and_hms_opt(0, 0, 0)?)
                .single();
        }
    }
    None
}

/// Newer is heavier: roughly flat for the first day, then −0.07 per
/// day, floored at 0.5. Unparseable timestamps get full weight.
fn time_weight(publish_time: &str) -> f64 {
    let Some(dt) = parse_publish_time(publish_time) else {
        return 1.0;
    };
    let days = (Local::now() - dt).num_seconds().max(0) as f64 / 86_400.0;
    (1.0 - 0.07 * days).max(0.5)
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Annotate items with sentiment and weighted score, sorted descending
/// by weighted score.
pub fn rank_news(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut ranked: Vec<NewsItem> = items
        .into_iter()
        .map(|mut item| {
            let text = format!("{}。{}", item.title, item.body);
            let (sentiment, score) = score_sentiment(&text);
            item.sentiment = sentiment;
            item.sentiment_score = score;
            item.weighted_score =
                score * source_weight(&item.source) * time_weight(&item.publish_time);
            item
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.weighted_score
            .partial_cmp(&a.weighted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
