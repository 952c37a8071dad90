//! Order identifiers.
//!
//! `<prefix><yyyyMMddHHmmss><16 hex chars>`: a UTC timestamp followed by 64
//! random bits taken from a v4 UUID. No shared counter, so any number of
//! request handlers can call [`OrderIdGenerator::next`] concurrently.

use chrono::Utc;
use uuid::Uuid;

pub const DEFAULT_ORDER_ID_PREFIX: &str = "IIMT";

const RANDOM_SUFFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct OrderIdGenerator {
    prefix: String,
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER_ID_PREFIX)
    }
}

impl OrderIdGenerator {
    /// The prefix must already be URL-path-safe; `DonationConfig::validate`
    /// checks it with [`is_path_safe`].
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn next(&self) -> String {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let random = Uuid::new_v4().simple().to_string().to_uppercase();
        format!(
            "{}{}{}",
            self.prefix,
            timestamp,
            &random[..RANDOM_SUFFIX_LEN]
        )
    }
}

/// True when `value` is usable as a single route segment without escaping.
pub fn is_path_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
