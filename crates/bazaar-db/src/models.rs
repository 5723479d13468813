//! Row mapping between SQLite and the shared model types.
//! Column lists live next to their mappers so the two cannot drift apart.

use rusqlite::Row;

use bazaar_types::models::{Conversation, Listing, Message, Notification, Rating, User};

use crate::row::{json_at, opt_ts_at, opt_uuid_at, parsed_at, ts_at, uuid_at};

/// Credentials row; never leaves the store except for password checks.
pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub const USER_COLUMNS: &str = "id, email, department, bio, profile_image_url, is_premium, \
     premium_expires_at, total_sales, rating_average, rating_count, last_active, created_at";

pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        department: row.get(2)?,
        bio: row.get(3)?,
        profile_image_url: row.get(4)?,
        is_premium: row.get(5)?,
        premium_expires_at: opt_ts_at(row, 6)?,
        total_sales: row.get(7)?,
        rating_average: row.get(8)?,
        rating_count: row.get(9)?,
        last_active: ts_at(row, 10)?,
        created_at: ts_at(row, 11)?,
    })
}

pub const LISTING_COLUMNS: &str = "id, user_id, title, description, category, price, \
     contact_method, phone, image_url, location, tags, view_count, favorites_count, \
     is_featured, featured_until, is_sold, created_at";

pub fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: parsed_at(row, 4)?,
        price: row.get(5)?,
        contact_method: parsed_at(row, 6)?,
        phone: row.get(7)?,
        image_url: row.get(8)?,
        location: row.get(9)?,
        tags: json_at(row, 10)?,
        view_count: row.get(11)?,
        favorites_count: row.get(12)?,
        is_featured: row.get(13)?,
        featured_until: opt_ts_at(row, 14)?,
        is_sold: row.get(15)?,
        created_at: ts_at(row, 16)?,
    })
}

pub const CONVERSATION_COLUMNS: &str =
    "id, buyer_id, seller_id, listing_id, last_message_at, created_at";

pub fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_at(row, 0)?,
        buyer_id: uuid_at(row, 1)?,
        seller_id: uuid_at(row, 2)?,
        listing_id: uuid_at(row, 3)?,
        last_message_at: ts_at(row, 4)?,
        created_at: ts_at(row, 5)?,
    })
}

pub const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, is_read, created_at";

pub fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        conversation_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        body: row.get(3)?,
        is_read: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}

pub const RATING_COLUMNS: &str =
    "id, reviewer_id, seller_id, listing_id, rating, review, created_at";

pub fn rating_from_row(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: uuid_at(row, 0)?,
        reviewer_id: uuid_at(row, 1)?,
        seller_id: uuid_at(row, 2)?,
        listing_id: opt_uuid_at(row, 3)?,
        rating: row.get(4)?,
        review: row.get(5)?,
        created_at: ts_at(row, 6)?,
    })
}

pub const NOTIFICATION_COLUMNS: &str = "id, user_id, payload, is_read, related_id, created_at";

pub fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        kind: json_at(row, 2)?,
        is_read: row.get(3)?,
        related_id: opt_uuid_at(row, 4)?,
        created_at: ts_at(row, 5)?,
    })
}
