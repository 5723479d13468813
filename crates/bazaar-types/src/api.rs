use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, ContactMethod, Listing, Message, Notification, Rating, User};
use crate::notifications::NotificationKind;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

// -- Profiles --

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub department: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradePremiumRequest {
    #[serde(default = "default_premium_months")]
    pub months: u32,
}

fn default_premium_months() -> u32 {
    1
}

// -- Listings --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListingRequest {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: f64,
    pub contact_method: ContactMethod,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price: Option<f64>,
    pub contact_method: Option<ContactMethod>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingQuery {
    pub category: Option<Category>,
    /// Case-insensitive match against title and description.
    pub q: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub seller_id: Option<Uuid>,
    #[serde(default)]
    pub include_sold: bool,
    #[serde(default)]
    pub sort: ListingSort,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListingResponse {
    #[serde(flatten)]
    pub listing: Listing,
    pub seller: Option<User>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureListingRequest {
    #[serde(default = "default_feature_days")]
    pub days: u32,
}

fn default_feature_days() -> u32 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyViews {
    pub date: chrono::NaiveDate,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingAnalytics {
    pub listing_id: Uuid,
    pub total_views: i64,
    pub total_favorites: i64,
    /// Oldest day first, always seven entries ending today.
    pub views_last_7_days: Vec<DailyViews>,
    /// Favorites per hundred views, one decimal.
    pub engagement_rate: f64,
}

// -- Favorites --

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleFavoriteResponse {
    pub favorited: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub listing: Listing,
}

// -- Ratings --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddRatingRequest {
    pub rating: u8,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(default)]
    pub listing_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingResponse {
    #[serde(flatten)]
    pub rating: Rating,
    pub reviewer_name: String,
    pub listing_title: Option<String>,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub listing_id: Uuid,
    /// Optional first message, appended once the conversation exists.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePreview {
    pub body: String,
    pub sender_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: String,
    pub counterparty_id: Uuid,
    pub counterparty_email: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<MessagePreview>,
    pub unread_count: i64,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation: crate::models::Conversation,
    pub messages: Vec<Message>,
}

// -- Notifications --

/// A notification as presented to clients, with rendered text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind_tag: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub kind: NotificationKind,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind_tag: n.kind.tag().to_string(),
            title: n.kind.title(),
            body: n.kind.body(),
            is_read: n.is_read,
            related_id: n.related_id,
            created_at: n.created_at,
            kind: n.kind,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

// -- Storage --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRef {
    pub bucket: String,
    pub path: String,
    pub url: String,
    pub sha256: String,
    pub size: u64,
}
