use chrono::Months;
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use bazaar_types::api::UpdateProfileRequest;
use bazaar_types::models::User;

use crate::error::{DbError, OptionalExt, Result, is_unique_violation};
use crate::models::{AccountRow, USER_COLUMNS, user_from_row};
use crate::row::{now, ts};
use crate::Database;

impl Database {
    // -- Accounts --

    pub fn create_account(&self, id: Uuid, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), email, password_hash, ts(now())],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::Conflict(format!("email {} is already registered", email))
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, created_at FROM accounts WHERE email = ?1",
                [email],
                |row| {
                    Ok(AccountRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Profiles --

    /// Create the profile row on first authenticated access.
    /// Returns true when a row was inserted.
    pub fn ensure_user(&self, id: Uuid, email: &str) -> Result<bool> {
        if self.get_user(id)?.is_some() {
            return Ok(false);
        }

        let created = self.with_conn_mut(|conn| {
            let stamp = ts(now());
            let n = conn.execute(
                "INSERT OR IGNORE INTO users (id, email, last_active, created_at) VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), email, stamp],
            )?;
            Ok(n == 1)
        })?;

        if created {
            debug!("Created profile for {} ({})", email, id);
        }
        Ok(created)
    }

    pub fn touch_last_active(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_active = ?1 WHERE id = ?2",
                params![ts(now()), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn require_user(&self, id: Uuid) -> Result<User> {
        self.get_user(id)?.ok_or(DbError::NotFound)
    }

    pub fn update_profile(&self, id: Uuid, req: &UpdateProfileRequest) -> Result<User> {
        if let Some(bio) = &req.bio {
            if bio.chars().count() > 500 {
                return Err(DbError::InvalidInput("bio is limited to 500 characters".into()));
            }
        }

        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET
                    department = COALESCE(?1, department),
                    bio = COALESCE(?2, bio),
                    profile_image_url = COALESCE(?3, profile_image_url)
                 WHERE id = ?4",
                params![
                    req.department.as_deref().map(str::trim),
                    req.bio.as_deref().map(str::trim),
                    req.profile_image_url,
                    id.to_string()
                ],
            )?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
            query_user(conn, id)?.ok_or(DbError::NotFound)
        })
    }

    /// Extend premium by `months`, counting from the current expiry if it is
    /// still in the future.
    pub fn upgrade_to_premium(&self, id: Uuid, months: u32) -> Result<User> {
        if months == 0 || months > 24 {
            return Err(DbError::InvalidInput("months must be between 1 and 24".into()));
        }

        self.with_conn_mut(|conn| {
            let user = query_user(conn, id)?.ok_or(DbError::NotFound)?;
            let start = match user.premium_expires_at {
                Some(expiry) if user.is_premium && expiry > now() => expiry,
                _ => now(),
            };
            let expires = start
                .checked_add_months(Months::new(months))
                .ok_or_else(|| DbError::InvalidInput("expiry out of range".into()))?;

            conn.execute(
                "UPDATE users SET is_premium = 1, premium_expires_at = ?1 WHERE id = ?2",
                params![ts(expires), id.to_string()],
            )?;
            query_user(conn, id)?.ok_or(DbError::NotFound)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id.to_string()], user_from_row).optional()
}
