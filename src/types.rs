use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// One merged review + product metadata row. Never mutated after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewRecord {
    pub product_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub product_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub product_description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub rating: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub avg_rating: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub rating_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub store: String,
    /// Upstream data mixes numbers, numeric strings and "None"
    pub price: Option<serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub verified_purchase: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub helpful_vote: u64,
    /// Milliseconds since epoch
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReviewRecord {
    /// Stable id derived from product, reviewer, review time and content.
    /// A review whose body changes gets a new id.
    pub fn record_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.product_id.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.user_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.title.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }

    /// Text that gets chunked and embedded: title, blank line, review body.
    pub fn page_content(&self) -> String {
        let title = self.title.trim();
        let text = self.text.trim();
        if title.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", title, text).trim().to_string()
        }
    }

    pub fn price(&self) -> Option<f64> {
        match self.price.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
            _ => None,
        }
    }

    /// Reject records that cannot produce a meaningful chunk.
    pub fn validate(&self) -> Result<()> {
        match self.product_id.as_deref() {
            Some(id) if !id.trim().is_empty() => {}
            _ => return Err(RagError::Malformed("missing product_id".to_string())),
        }
        if self.page_content().is_empty() {
            return Err(RagError::Malformed(format!(
                "record for product {} has no title or text",
                self.product_id.as_deref().unwrap_or_default()
            )));
        }
        if !self.rating.is_finite() {
            return Err(RagError::Malformed("rating is not a finite number".to_string()));
        }
        Ok(())
    }
}
