use serde::{Deserialize, Serialize};

use crate::models::Category;

/// What a notification is about. Each variant carries the data needed to
/// render it; title and body text are produced by [`NotificationKind::title`]
/// and [`NotificationKind::body`] when a notification leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationKind {
    Message {
        sender_name: String,
        listing_title: String,
    },
    Rating {
        stars: u8,
        review: Option<String>,
    },
    Sale {
        listing_title: String,
    },
    FeatureExpiry {
        listing_title: String,
    },
    ListingInterest {
        interested_name: String,
        listing_title: String,
    },
    PriceDrop {
        listing_title: String,
        old_price: f64,
        new_price: f64,
    },
    NewListing {
        category: Category,
        listing_title: String,
    },
}

impl NotificationKind {
    /// Stable tag stored alongside the payload.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Rating { .. } => "rating",
            Self::Sale { .. } => "sale",
            Self::FeatureExpiry { .. } => "feature_expiry",
            Self::ListingInterest { .. } => "listing_interest",
            Self::PriceDrop { .. } => "price_drop",
            Self::NewListing { .. } => "new_listing",
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::Message { .. } => "New Message".into(),
            Self::Rating { .. } => "New Rating".into(),
            Self::Sale { .. } => "Item Sold!".into(),
            Self::FeatureExpiry { .. } => "Featured Listing Expired".into(),
            Self::ListingInterest { .. } => "Someone is interested in your listing".into(),
            Self::PriceDrop { .. } => "Price Drop Alert".into(),
            Self::NewListing { .. } => "New Listing in Your Interest".into(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Message {
                sender_name,
                listing_title,
            } => format!("{} sent you a message about \"{}\"", sender_name, listing_title),
            Self::Rating { stars, review } => match review.as_deref().filter(|r| !r.is_empty()) {
                Some(review) => format!("You received a {}-star rating: \"{}\"", stars, review),
                None => format!("You received a {}-star rating", stars),
            },
            Self::Sale { listing_title } => format!(
                "Congratulations! Your listing \"{}\" has been marked as sold.",
                listing_title
            ),
            Self::FeatureExpiry { listing_title } => format!(
                "Your listing \"{}\" is no longer featured.",
                listing_title
            ),
            Self::ListingInterest {
                interested_name,
                listing_title,
            } => format!("{} showed interest in \"{}\"", interested_name, listing_title),
            Self::PriceDrop {
                listing_title,
                old_price,
                new_price,
            } => format!(
                "\"{}\" price dropped from ₹{} to ₹{}",
                listing_title,
                format_price(*old_price),
                format_price(*new_price)
            ),
            Self::NewListing {
                category,
                listing_title,
            } => format!(
                "A new {} listing \"{}\" might interest you",
                category, listing_title
            ),
        }
    }
}

/// Whole amounts print without decimals, everything else with two.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{:.0}", price)
    } else {
        format!("{:.2}", price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_names_sender_and_listing() {
        let kind = NotificationKind::Message {
            sender_name: "asha".into(),
            listing_title: "Calculus textbook".into(),
        };
        assert_eq!(kind.tag(), "message");
        assert_eq!(kind.title(), "New Message");
        assert_eq!(kind.body(), "asha sent you a message about \"Calculus textbook\"");
    }

    #[test]
    fn rating_body_omits_empty_review() {
        let bare = NotificationKind::Rating { stars: 4, review: Some(String::new()) };
        assert_eq!(bare.body(), "You received a 4-star rating");

        let with_review = NotificationKind::Rating { stars: 5, review: Some("Great seller".into()) };
        assert_eq!(with_review.body(), "You received a 5-star rating: \"Great seller\"");
    }

    #[test]
    fn price_drop_formats_amounts() {
        let kind = NotificationKind::PriceDrop {
            listing_title: "Bike".into(),
            old_price: 1200.0,
            new_price: 999.5,
        };
        assert_eq!(kind.body(), "\"Bike\" price dropped from ₹1200 to ₹999.50");
    }

    #[test]
    fn serializes_as_tagged_variant() {
        let kind = NotificationKind::Sale { listing_title: "Lamp".into() };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "sale");
        assert_eq!(json["data"]["listing_title"], "Lamp");
    }
}
