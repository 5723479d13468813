use rusqlite::params;
use uuid::Uuid;

use bazaar_types::models::{Category, Favorite, Listing};

use crate::error::{DbError, Result};
use crate::listings::query_listing;
use crate::models::listing_from_row;
use crate::row::{now, ts, ts_at, uuid_at};
use crate::Database;

impl Database {
    /// Flip the user's favorite on a listing. Returns the new state.
    ///
    /// Delete-or-insert runs as one transaction on the writer against the
    /// unique (user, listing) pair, and `favorites_count` moves with it.
    pub fn toggle_favorite(&self, user_id: Uuid, listing_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_listing(&tx, listing_id)?.is_none() {
                return Err(DbError::NotFound);
            }

            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id.to_string(), listing_id.to_string()],
            )?;

            let favorited = if removed > 0 {
                tx.execute(
                    "UPDATE listings SET favorites_count = MAX(favorites_count - 1, 0) WHERE id = ?1",
                    [listing_id.to_string()],
                )?;
                false
            } else {
                tx.execute(
                    "INSERT INTO favorites (id, user_id, listing_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        Uuid::new_v4().to_string(),
                        user_id.to_string(),
                        listing_id.to_string(),
                        ts(now()),
                    ],
                )?;
                tx.execute(
                    "UPDATE listings SET favorites_count = favorites_count + 1 WHERE id = ?1",
                    [listing_id.to_string()],
                )?;
                true
            };

            tx.commit()?;
            Ok(favorited)
        })
    }

    pub fn is_favorited(&self, user_id: Uuid, listing_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id.to_string(), listing_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// The user's favorites with their listings, newest favorite first.
    pub fn list_favorites(&self, user_id: Uuid) -> Result<Vec<(Favorite, Listing)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.user_id, l.title, l.description, l.category, l.price,
                        l.contact_method, l.phone, l.image_url, l.location, l.tags, l.view_count,
                        l.favorites_count, l.is_featured, l.featured_until, l.is_sold, l.created_at,
                        f.id, f.created_at
                 FROM favorites f
                 JOIN listings l ON l.id = f.listing_id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    let listing = listing_from_row(row)?;
                    let favorite = Favorite {
                        id: uuid_at(row, 17)?,
                        user_id,
                        listing_id: listing.id,
                        created_at: ts_at(row, 18)?,
                    };
                    Ok((favorite, listing))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users who favorited the listing.
    pub fn favoriters_of(&self, listing_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM favorites WHERE listing_id = ?1")?;
            let rows = stmt
                .query_map([listing_id.to_string()], |row| uuid_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users who have favorited some other seller's listing in `category`.
    pub fn interested_in_category(&self, category: Category, seller_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT f.user_id
                 FROM favorites f
                 JOIN listings l ON l.id = f.listing_id
                 WHERE l.category = ?1 AND f.user_id != ?2",
            )?;
            let rows = stmt
                .query_map(params![category.as_str(), seller_id.to_string()], |row| uuid_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, open_temp, user};

    #[test]
    fn two_toggles_restore_the_original_state() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let fan = user(&db, "fan");
        let l = listing(&db, owner, "Sketchbook", 150.0);

        let start = db.is_favorited(fan, l.id).unwrap();
        assert!(db.toggle_favorite(fan, l.id).unwrap());
        assert_eq!(db.require_listing(l.id).unwrap().favorites_count, 1);
        assert!(!db.toggle_favorite(fan, l.id).unwrap());

        assert_eq!(db.is_favorited(fan, l.id).unwrap(), start);
        assert_eq!(db.require_listing(l.id).unwrap().favorites_count, 0);
    }

    #[test]
    fn toggling_a_missing_listing_is_not_found() {
        let (_dir, db) = open_temp();
        let fan = user(&db, "fan");
        assert!(matches!(db.toggle_favorite(fan, Uuid::new_v4()), Err(DbError::NotFound)));
    }

    #[test]
    fn favorites_list_newest_first() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let fan = user(&db, "fan");
        let a = listing(&db, owner, "A", 1.0);
        let b = listing(&db, owner, "B", 2.0);
        db.toggle_favorite(fan, a.id).unwrap();
        db.toggle_favorite(fan, b.id).unwrap();

        let favs = db.list_favorites(fan).unwrap();
        assert_eq!(favs.len(), 2);
        assert!(favs[0].0.created_at >= favs[1].0.created_at);
        assert_eq!(db.favoriters_of(a.id).unwrap(), vec![fan]);
    }

    #[test]
    fn category_interest_excludes_the_seller() {
        let (_dir, db) = open_temp();
        let seller = user(&db, "seller");
        let fan = user(&db, "fan");
        let l = listing(&db, seller, "Textbook", 300.0);
        db.toggle_favorite(fan, l.id).unwrap();
        db.toggle_favorite(seller, l.id).unwrap();

        assert_eq!(db.interested_in_category(Category::Product, seller).unwrap(), vec![fan]);
        assert!(db.interested_in_category(Category::Skill, seller).unwrap().is_empty());
    }
}
