use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::models::job::JobStatus;

/// Kind of a recognized block. Only `LINE` blocks contribute to full text.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    #[serde(other)]
    Other,
}

impl BlockType {
    /// Parse a backend tag, mapping anything unrecognized to `Other`.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(BlockType::Other)
    }
}

/// One unit of recognized content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Block {
    pub fn new(block_type: BlockType, text: Option<&str>) -> Self {
        Self {
            block_type,
            text: text.map(str::to_owned),
            confidence: None,
        }
    }
}

/// One page of a paginated text detection result.
///
/// A present `next_token` means more pages follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResultPage {
    pub job_status: JobStatus,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl ResultPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_block_tag_is_other() {
        assert_eq!(BlockType::from_tag("LINE"), BlockType::Line);
        assert_eq!(BlockType::from_tag("KEY_VALUE_SET"), BlockType::Other);
    }

    #[test]
    fn test_page_deserializes_backend_shape() {
        let page: ResultPage = serde_json::from_value(serde_json::json!({
            "JobStatus": "SUCCEEDED",
            "Blocks": [
                {"BlockType": "PAGE"},
                {"BlockType": "LINE", "Text": "Hello", "Confidence": 99.5},
                {"BlockType": "TABLE"}
            ],
            "NextToken": "token1"
        }))
        .unwrap();

        assert_eq!(page.job_status, JobStatus::Succeeded);
        assert_eq!(page.blocks.len(), 3);
        assert_eq!(page.blocks[1].text.as_deref(), Some("Hello"));
        assert_eq!(page.blocks[2].block_type, BlockType::Other);
        assert!(!page.is_last());
    }
}
