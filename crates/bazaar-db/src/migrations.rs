use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE accounts (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                email               TEXT NOT NULL,
                department          TEXT,
                bio                 TEXT,
                profile_image_url   TEXT,
                is_premium          INTEGER NOT NULL DEFAULT 0,
                premium_expires_at  TEXT,
                total_sales         INTEGER NOT NULL DEFAULT 0,
                rating_average      REAL NOT NULL DEFAULT 0,
                rating_count        INTEGER NOT NULL DEFAULT 0,
                last_active         TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE listings (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                category        TEXT NOT NULL CHECK (category IN ('product', 'service', 'skill')),
                price           REAL NOT NULL CHECK (price >= 0),
                contact_method  TEXT NOT NULL CHECK (contact_method IN ('email', 'phone', 'both')),
                phone           TEXT,
                image_url       TEXT,
                location        TEXT,
                tags            TEXT NOT NULL DEFAULT '[]',
                view_count      INTEGER NOT NULL DEFAULT 0,
                favorites_count INTEGER NOT NULL DEFAULT 0,
                is_featured     INTEGER NOT NULL DEFAULT 0,
                featured_until  TEXT,
                is_sold         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_listings_user ON listings(user_id, created_at);
            CREATE INDEX idx_listings_category ON listings(category, created_at);

            CREATE TABLE listing_views (
                id          TEXT PRIMARY KEY,
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                viewer_id   TEXT,
                ip_address  TEXT,
                user_agent  TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_listing_views_listing ON listing_views(listing_id, created_at);

            -- listing_id has no foreign key: conversations outlive deleted listings
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                buyer_id        TEXT NOT NULL REFERENCES users(id),
                seller_id       TEXT NOT NULL REFERENCES users(id),
                listing_id      TEXT NOT NULL,
                last_message_at TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(buyer_id, seller_id, listing_id)
            );

            CREATE INDEX idx_conversations_buyer ON conversations(buyer_id, last_message_at);
            CREATE INDEX idx_conversations_seller ON conversations(seller_id, last_message_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL REFERENCES users(id),
                body            TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);

            CREATE TABLE favorites (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE(user_id, listing_id)
            );

            CREATE INDEX idx_favorites_listing ON favorites(listing_id);

            CREATE TABLE ratings (
                id          TEXT PRIMARY KEY,
                reviewer_id TEXT NOT NULL REFERENCES users(id),
                seller_id   TEXT NOT NULL REFERENCES users(id),
                listing_id  TEXT,
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                review      TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_ratings_seller ON ratings(seller_id, created_at);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL,
                payload     TEXT NOT NULL,
                is_read     INTEGER NOT NULL DEFAULT 0,
                related_id  TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
