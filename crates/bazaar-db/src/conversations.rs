use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

use bazaar_types::api::{ConversationSummary, MessagePreview};
use bazaar_types::models::Conversation;

use crate::error::{DbError, OptionalExt, Result};
use crate::listings::query_listing;
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row};
use crate::row::{now, opt_ts_at, opt_uuid_at, ts, ts_at, uuid_at};
use crate::Database;

impl Database {
    /// Return the conversation for the (buyer, seller, listing) triple,
    /// creating it if none exists. The unique index on the triple makes the
    /// insert a no-op when another writer got there first, so the follow-up
    /// select always lands on the single canonical row.
    ///
    /// The flag is true when this call created the conversation.
    pub fn get_or_create_conversation(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        listing_id: Uuid,
    ) -> Result<(Conversation, bool)> {
        if buyer_id == seller_id {
            return Err(DbError::InvalidInput("cannot start a conversation with yourself".into()));
        }

        self.with_conn_mut(|conn| {
            let listing = query_listing(conn, listing_id)?.ok_or(DbError::NotFound)?;
            if listing.user_id != seller_id {
                return Err(DbError::InvalidInput("seller does not own this listing".into()));
            }

            let stamp = ts(now());
            let inserted = conn.execute(
                "INSERT INTO conversations (id, buyer_id, seller_id, listing_id, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(buyer_id, seller_id, listing_id) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    buyer_id.to_string(),
                    seller_id.to_string(),
                    listing_id.to_string(),
                    stamp,
                ],
            )?;

            let conversation = query_by_triple(conn, buyer_id, seller_id, listing_id)?
                .ok_or(DbError::NotFound)?;
            if inserted == 1 {
                info!(
                    "Conversation {} opened: buyer {} seller {} listing {}",
                    conversation.id, buyer_id, seller_id, listing_id
                );
            }
            Ok((conversation, inserted == 1))
        })
    }

    /// First contact from a buyer about a listing; the seller is the
    /// listing's owner.
    pub fn start_conversation(&self, buyer_id: Uuid, listing_id: Uuid) -> Result<(Conversation, bool)> {
        let listing = self.with_conn(|conn| query_listing(conn, listing_id))?
            .ok_or(DbError::NotFound)?;
        self.get_or_create_conversation(buyer_id, listing.user_id, listing.id)
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Fetch a conversation on behalf of `user_id`, who must take part in it.
    pub fn conversation_for(&self, id: Uuid, user_id: Uuid) -> Result<Conversation> {
        let conversation = self.get_conversation(id)?.ok_or(DbError::NotFound)?;
        if !conversation.is_participant(user_id) {
            return Err(DbError::NotAuthorized);
        }
        Ok(conversation)
    }

    /// The subset of `ids` naming conversations `user_id` takes part in.
    pub fn participating_in(&self, user_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut kept = Vec::with_capacity(ids.len());
            for &id in ids {
                if let Some(conversation) = query_conversation(conn, id)? {
                    if conversation.is_participant(user_id) && !kept.contains(&id) {
                        kept.push(id);
                    }
                }
            }
            Ok(kept)
        })
    }

    /// Every conversation the user takes part in, most recently active first.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.buyer_id, c.seller_id, c.listing_id, c.last_message_at, c.created_at,
                        COALESCE(l.title, 'Listing removed'),
                        u.id, u.email,
                        lm.body, lm.sender_id, lm.created_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id AND m.sender_id != ?1 AND m.is_read = 0)
                 FROM conversations c
                 LEFT JOIN listings l ON l.id = c.listing_id
                 JOIN users u ON u.id = CASE WHEN c.buyer_id = ?1 THEN c.seller_id ELSE c.buyer_id END
                 LEFT JOIN messages lm ON lm.rowid = (
                     SELECT m.rowid FROM messages m
                      WHERE m.conversation_id = c.id
                      ORDER BY m.created_at DESC, m.rowid DESC
                      LIMIT 1)
                 WHERE c.buyer_id = ?1 OR c.seller_id = ?1
                 ORDER BY c.last_message_at DESC, c.created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    let last_message = match (row.get::<_, Option<String>>(9)?, opt_uuid_at(row, 10)?, opt_ts_at(row, 11)?) {
                        (Some(body), Some(sender_id), Some(created_at)) => Some(MessagePreview {
                            body,
                            sender_id,
                            created_at,
                        }),
                        _ => None,
                    };
                    Ok(ConversationSummary {
                        id: uuid_at(row, 0)?,
                        buyer_id: uuid_at(row, 1)?,
                        seller_id: uuid_at(row, 2)?,
                        listing_id: uuid_at(row, 3)?,
                        last_message_at: ts_at(row, 4)?,
                        created_at: ts_at(row, 5)?,
                        listing_title: row.get(6)?,
                        counterparty_id: uuid_at(row, 7)?,
                        counterparty_email: row.get(8)?,
                        last_message,
                        unread_count: row.get(12)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS);
    conn.query_row(&sql, [id.to_string()], conversation_from_row).optional()
}

fn query_by_triple(
    conn: &Connection,
    buyer_id: Uuid,
    seller_id: Uuid,
    listing_id: Uuid,
) -> Result<Option<Conversation>> {
    let sql = format!(
        "SELECT {} FROM conversations WHERE buyer_id = ?1 AND seller_id = ?2 AND listing_id = ?3",
        CONVERSATION_COLUMNS
    );
    conn.query_row(
        &sql,
        params![buyer_id.to_string(), seller_id.to_string(), listing_id.to_string()],
        conversation_from_row,
    )
    .optional()
}
