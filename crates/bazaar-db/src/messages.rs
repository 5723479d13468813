use rusqlite::params;
use uuid::Uuid;

use bazaar_types::models::Message;

use crate::conversations::query_conversation;
use crate::error::{DbError, Result};
use crate::models::{MESSAGE_COLUMNS, message_from_row};
use crate::row::{now, parse_ts, ts};
use crate::Database;

pub const MAX_MESSAGE_CHARS: usize = 4000;

impl Database {
    /// Append a message to a conversation's log and bump the conversation's
    /// `last_message_at`, both in one transaction.
    ///
    /// The stored timestamp never precedes the latest message already in the
    /// conversation, so the log stays ordered even if the clock steps back.
    pub fn append_message(&self, conversation_id: Uuid, sender_id: Uuid, body: &str) -> Result<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(DbError::InvalidInput("message body is empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(DbError::InvalidInput(format!(
                "message body exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let conversation = query_conversation(&tx, conversation_id)?.ok_or(DbError::NotFound)?;
            if !conversation.is_participant(sender_id) {
                return Err(DbError::NotAuthorized);
            }

            let latest: Option<String> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [conversation_id.to_string()],
                |r| r.get(0),
            )?;
            let mut created_at = now();
            if let Some(latest) = latest {
                let latest = parse_ts(&latest)?;
                if latest > created_at {
                    created_at = latest;
                }
            }

            let message = Message {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id,
                body: body.to_string(),
                is_read: false,
                created_at,
            };

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    message.id.to_string(),
                    conversation_id.to_string(),
                    sender_id.to_string(),
                    message.body,
                    ts(created_at),
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
                params![ts(created_at), conversation_id.to_string()],
            )?;
            tx.commit()?;

            Ok(message)
        })
    }

    /// The conversation's messages in the order they were appended.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id.to_string()], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark every unread message the reader did not send as read.
    /// Returns how many messages changed; repeat calls return 0.
    pub fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let conversation = query_conversation(conn, conversation_id)?.ok_or(DbError::NotFound)?;
            if !conversation.is_participant(reader_id) {
                return Err(DbError::NotAuthorized);
            }

            let n = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                params![conversation_id.to_string(), reader_id.to_string()],
            )?;
            Ok(n)
        })
    }

    /// Unread messages addressed to the user across all conversations.
    pub fn unread_message_count(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.buyer_id = ?1 OR c.seller_id = ?1)
                   AND m.sender_id != ?1 AND m.is_read = 0",
                [user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, open_temp, user};

    fn setup() -> (tempfile::TempDir, Database, Uuid, Uuid, Uuid) {
        let (dir, db) = open_temp();
        let buyer = user(&db, "buyer");
        let seller = user(&db, "seller");
        let l = listing(&db, seller, "Microscope", 12000.0);
        let (conv, _) = db.start_conversation(buyer, l.id).unwrap();
        (dir, db, buyer, seller, conv.id)
    }

    #[test]
    fn log_is_ordered_by_time_then_insertion() {
        let (_dir, db, buyer, seller, conv) = setup();
        for i in 0..20 {
            let sender = if i % 2 == 0 { buyer } else { seller };
            db.append_message(conv, sender, &format!("message {}", i)).unwrap();
        }

        let log = db.list_messages(conv).unwrap();
        assert_eq!(log.len(), 20);
        assert!(log.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let bodies: Vec<&str> = log.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies[0], "message 0");
        assert_eq!(bodies[19], "message 19");
    }

    #[test]
    fn append_never_goes_back_in_time() {
        let (_dir, db, buyer, _seller, conv) = setup();
        let future = "2999-01-01T00:00:00.000Z";
        db.append_message(conv, buyer, "first").unwrap();
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE messages SET created_at = ?1", [future])?;
            Ok(())
        })
        .unwrap();

        let next = db.append_message(conv, buyer, "second").unwrap();
        assert_eq!(ts(next.created_at), future);

        let log = db.list_messages(conv).unwrap();
        assert_eq!(log[1].body, "second");
    }

    #[test]
    fn append_updates_last_message_at() {
        let (_dir, db, buyer, _seller, conv) = setup();
        let message = db.append_message(conv, buyer, "hello").unwrap();
        let conversation = db.get_conversation(conv).unwrap().unwrap();
        assert_eq!(conversation.last_message_at, message.created_at);
    }

    #[test]
    fn appended_message_matches_the_logged_copy() {
        let (_dir, db, buyer, _seller, conv) = setup();
        let message = db.append_message(conv, buyer, "hello").unwrap();
        let logged = db.list_messages(conv).unwrap();
        assert_eq!(logged, vec![message]);
    }

    #[test]
    fn append_rejects_empty_body_and_outsiders() {
        let (_dir, db, _buyer, _seller, conv) = setup();
        let outsider = user(&db, "outsider");

        assert!(matches!(db.append_message(conv, outsider, "hi"), Err(DbError::NotAuthorized)));
        assert!(matches!(db.append_message(conv, outsider, "   "), Err(DbError::InvalidInput(_))));
        assert!(matches!(db.append_message(Uuid::new_v4(), outsider, "hi"), Err(DbError::NotFound)));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(db.append_message(conv, outsider, &long), Err(DbError::InvalidInput(_))));
    }

    #[test]
    fn mark_read_skips_own_messages_and_is_idempotent() {
        let (_dir, db, buyer, seller, conv) = setup();
        db.append_message(conv, buyer, "from buyer 1").unwrap();
        db.append_message(conv, seller, "from seller").unwrap();
        db.append_message(conv, buyer, "from buyer 2").unwrap();

        assert_eq!(db.mark_read(conv, seller).unwrap(), 2);
        assert_eq!(db.mark_read(conv, seller).unwrap(), 0);

        for m in db.list_messages(conv).unwrap() {
            if m.sender_id == seller {
                assert!(!m.is_read, "reader's own message must stay unread");
            } else {
                assert!(m.is_read);
            }
        }
        assert_eq!(db.unread_message_count(buyer).unwrap(), 1);
        assert_eq!(db.unread_message_count(seller).unwrap(), 0);
    }

    #[test]
    fn outsiders_cannot_mark_read() {
        let (_dir, db, buyer, _seller, conv) = setup();
        let outsider = user(&db, "outsider");
        db.append_message(conv, buyer, "hello").unwrap();
        assert!(matches!(db.mark_read(conv, outsider), Err(DbError::NotAuthorized)));
    }
}
