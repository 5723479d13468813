use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notifications::NotificationKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub department: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub total_sales: i64,
    pub rating_average: f64,
    pub rating_count: i64,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name shown to other users: the local part of the email address.
    pub fn display_name(&self) -> &str {
        display_name(&self.email)
    }
}

pub fn display_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Product,
    Service,
    Skill,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Service => "service",
            Self::Skill => "skill",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Self::Product),
            "service" => Ok(Self::Service),
            "skill" => Ok(Self::Skill),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Email,
    Phone,
    Both,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Both => "both",
        }
    }

    pub fn needs_phone(&self) -> bool {
        matches!(self, Self::Phone | Self::Both)
    }
}

impl FromStr for ContactMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown contact method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: f64,
    pub contact_method: ContactMethod,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub favorites_count: i64,
    pub is_featured: bool,
    pub featured_until: Option<DateTime<Utc>>,
    pub is_sold: bool,
    pub created_at: DateTime<Utc>,
}

/// A chat between the buyer and the seller of one listing.
/// At most one exists per (buyer, seller, listing) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub listing_id: Uuid,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The other participant, or `None` if `user_id` is not in this conversation.
    pub fn counterparty(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub id: Uuid,
    pub reviewer_id: Uuid,
    pub seller_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub rating: u8,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored notification. Display text is derived from `kind`, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterparty_is_the_other_side() {
        let now = Utc::now();
        let conv = Conversation {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            last_message_at: now,
            created_at: now,
        };

        assert_eq!(conv.counterparty(conv.buyer_id), Some(conv.seller_id));
        assert_eq!(conv.counterparty(conv.seller_id), Some(conv.buyer_id));
        assert_eq!(conv.counterparty(Uuid::new_v4()), None);
    }

    #[test]
    fn display_name_is_email_local_part() {
        assert_eq!(display_name("asha.k@campus.edu"), "asha.k");
        assert_eq!(display_name("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn category_parses_its_own_names() {
        for c in [Category::Product, Category::Service, Category::Skill] {
            assert_eq!(c.as_str().parse::<Category>(), Ok(c));
        }
        assert!("vehicle".parse::<Category>().is_err());
    }
}
