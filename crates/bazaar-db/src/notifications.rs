use rusqlite::{Connection, params};
use uuid::Uuid;

use bazaar_types::models::Notification;
use bazaar_types::notifications::NotificationKind;

use crate::error::{DbError, OptionalExt, Result};
use crate::models::{NOTIFICATION_COLUMNS, notification_from_row};
use crate::row::{now, ts, uuid_at};
use crate::Database;

impl Database {
    pub fn create_notification(
        &self,
        user_id: Uuid,
        kind: &NotificationKind,
        related_id: Option<Uuid>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.clone(),
            is_read: false,
            related_id,
            created_at: now(),
        };
        let payload = serde_json::to_string(kind)?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, payload, is_read, related_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                params![
                    notification.id.to_string(),
                    user_id.to_string(),
                    kind.tag(),
                    payload,
                    related_id.map(|r| r.to_string()),
                    ts(notification.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(notification)
    }

    /// The user's notifications, newest first.
    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id.to_string(), unread_only, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when the notification was already read.
    pub fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            check_owner(conn, user_id, id)?;
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                [id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )?;
            Ok(n)
        })
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }

    pub fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            check_owner(conn, user_id, id)?;
            conn.execute("DELETE FROM notifications WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }
}

fn check_owner(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<()> {
    let owner = conn
        .query_row(
            "SELECT user_id FROM notifications WHERE id = ?1",
            [id.to_string()],
            |row| uuid_at(row, 0),
        )
        .optional()?
        .ok_or(DbError::NotFound)?;
    if owner != user_id {
        return Err(DbError::NotAuthorized);
    }
    Ok(())
}
