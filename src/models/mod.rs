use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short code -> destination URL mapping.
///
/// The analytics core treats links as read-only: buckets reference a link
/// by id and are purged when the link is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub url: String,
    pub custom_code: Option<String>,
}
