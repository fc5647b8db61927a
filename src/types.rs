//! Core types for Mnemon

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MnemonError, Result};

/// The summary type recorded for every default summary, regardless of the
/// size tier that produced it. Retrieval looks the default up by this value.
pub const DEFAULT_SUMMARY_TYPE: &str = "abstractive_medium";

/// Reserved list separator; tags containing it are rejected at the boundary
pub const TAG_SEPARATOR: char = ',';

/// A named bucket of memories with a reference count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub description: Option<String>,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single durable text record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub topic_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// A derived textual compression of a memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub memory_id: String,
    pub summary_type: String,
    pub summary_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summarization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Abstractive,
    Extractive,
    QueryFocused,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Abstractive => "abstractive",
            SummaryKind::Extractive => "extractive",
            SummaryKind::QueryFocused => "query_focused",
        }
    }
}

impl std::str::FromStr for SummaryKind {
    type Err = MnemonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abstractive" => Ok(SummaryKind::Abstractive),
            "extractive" => Ok(SummaryKind::Extractive),
            "query_focused" => Ok(SummaryKind::QueryFocused),
            other => Err(MnemonError::InvalidArgument(format!(
                "unknown summary_type '{}' (expected abstractive, extractive, or query_focused)",
                other
            ))),
        }
    }
}

/// Target summary length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLength {
    Short,
    Medium,
    Detailed,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Short => "short",
            SummaryLength::Medium => "medium",
            SummaryLength::Detailed => "detailed",
        }
    }
}

impl std::str::FromStr for SummaryLength {
    type Err = MnemonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "short" => Ok(SummaryLength::Short),
            "medium" => Ok(SummaryLength::Medium),
            "detailed" => Ok(SummaryLength::Detailed),
            other => Err(MnemonError::InvalidArgument(format!(
                "unknown length '{}' (expected short, medium, or detailed)",
                other
            ))),
        }
    }
}

/// Content-length bucket controlling default-summary generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    Tiny,
    Small,
    Large,
}

impl SizeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::Tiny => "tiny",
            SizeTier::Small => "small",
            SizeTier::Large => "large",
        }
    }
}

/// Pick the size tier for a content length (in characters)
pub fn tier_for(content_chars: usize, tiny_threshold: usize, small_threshold: usize) -> SizeTier {
    if content_chars < tiny_threshold {
        SizeTier::Tiny
    } else if content_chars < small_threshold {
        SizeTier::Small
    } else {
        SizeTier::Large
    }
}

/// Shape of a retrieve result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    FullText,
    Summary,
    Both,
}

impl Default for ReturnType {
    fn default() -> Self {
        ReturnType::FullText
    }
}

impl std::str::FromStr for ReturnType {
    type Err = MnemonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full_text" => Ok(ReturnType::FullText),
            "summary" => Ok(ReturnType::Summary),
            "both" => Ok(ReturnType::Both),
            other => Err(MnemonError::InvalidArgument(format!(
                "unknown return_type '{}' (expected full_text, summary, or both)",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreInput {
    pub content: String,
    pub topic: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveInput {
    pub query: String,
    pub max_results: Option<usize>,
    pub topic: Option<String>,
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInput {
    pub memory_id: String,
    pub content: Option<String>,
    pub topic: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteInput {
    pub memory_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeInput {
    pub memory_id: Option<String>,
    pub query: Option<String>,
    pub topic: Option<String>,
    pub summary_type: Option<String>,
    pub length: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeInput {
    #[serde(default)]
    pub reset: bool,
}

// ---------------------------------------------------------------------------
// Tag validation
// ---------------------------------------------------------------------------

/// Validate and normalize a tag list.
///
/// Empty or whitespace-only tags and tags containing the reserved list
/// separator are rejected; duplicates are dropped preserving the first
/// occurrence and its position.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for raw in tags {
        let tag = raw.trim();
        if tag.is_empty() {
            return Err(MnemonError::InvalidArgument(
                "tags must not be empty".to_string(),
            ));
        }
        if tag.contains(TAG_SEPARATOR) {
            return Err(MnemonError::InvalidArgument(format!(
                "tag '{}' contains the reserved separator '{}'",
                tag, TAG_SEPARATOR
            )));
        }
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    Ok(out)
}

/// Synthesize a topic description from its name and the first tags seen
pub fn synthesize_topic_description(name: &str, tags: &[String]) -> String {
    let label = name.replace(['_', '-'], " ");
    if tags.is_empty() {
        format!("Notes about {}", label)
    } else {
        format!("Notes about {} (tags: {})", label, tags.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for(0, 500, 2000), SizeTier::Tiny);
        assert_eq!(tier_for(499, 500, 2000), SizeTier::Tiny);
        assert_eq!(tier_for(500, 500, 2000), SizeTier::Small);
        assert_eq!(tier_for(1999, 500, 2000), SizeTier::Small);
        assert_eq!(tier_for(2000, 500, 2000), SizeTier::Large);
        assert_eq!(tier_for(30_000, 500, 2000), SizeTier::Large);
    }

    #[test]
    fn test_normalize_tags_dedupes_preserving_order() {
        let tags = vec![
            "style".to_string(),
            "prefs".to_string(),
            "style".to_string(),
        ];
        assert_eq!(
            normalize_tags(&tags).unwrap(),
            vec!["style".to_string(), "prefs".to_string()]
        );
    }

    #[test]
    fn test_normalize_tags_rejects_empty() {
        let tags = vec!["ok".to_string(), "   ".to_string()];
        assert!(matches!(
            normalize_tags(&tags),
            Err(MnemonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_normalize_tags_rejects_separator() {
        let tags = vec!["a,b".to_string()];
        assert!(matches!(
            normalize_tags(&tags),
            Err(MnemonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_summary_kind_round_trip() {
        for kind in ["abstractive", "extractive", "query_focused"] {
            let parsed: SummaryKind = kind.parse().unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
        assert!("bogus".parse::<SummaryKind>().is_err());
    }

    #[test]
    fn test_return_type_parse() {
        assert_eq!(
            "full_text".parse::<ReturnType>().unwrap(),
            ReturnType::FullText
        );
        assert_eq!("both".parse::<ReturnType>().unwrap(), ReturnType::Both);
        assert!("everything".parse::<ReturnType>().is_err());
    }

    #[test]
    fn test_topic_description() {
        assert_eq!(
            synthesize_topic_description("user_preferences", &[]),
            "Notes about user preferences"
        );
        assert_eq!(
            synthesize_topic_description("research", &["ml".to_string(), "rust".to_string()]),
            "Notes about research (tags: ml, rust)"
        );
    }
}
