use rusqlite::params;
use uuid::Uuid;

use bazaar_types::api::RatingResponse;
use bazaar_types::models::{Rating, display_name};

use crate::error::{DbError, Result};
use crate::listings::query_listing;
use crate::models::rating_from_row;
use crate::row::{now, ts};
use crate::users::query_user;
use crate::Database;

const MAX_REVIEW_CHARS: usize = 1000;

impl Database {
    /// Record a rating and refresh the seller's aggregate in the same
    /// transaction.
    pub fn add_rating(
        &self,
        reviewer_id: Uuid,
        seller_id: Uuid,
        listing_id: Option<Uuid>,
        rating: u8,
        review: Option<&str>,
    ) -> Result<Rating> {
        if !(1..=5).contains(&rating) {
            return Err(DbError::InvalidInput("rating must be between 1 and 5".into()));
        }
        if reviewer_id == seller_id {
            return Err(DbError::InvalidInput("you cannot rate yourself".into()));
        }
        let review = review.map(str::trim).filter(|r| !r.is_empty());
        if review.is_some_and(|r| r.chars().count() > MAX_REVIEW_CHARS) {
            return Err(DbError::InvalidInput(format!(
                "review is limited to {} characters",
                MAX_REVIEW_CHARS
            )));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user(&tx, seller_id)?.is_none() {
                return Err(DbError::NotFound);
            }
            if let Some(listing_id) = listing_id {
                let listing = query_listing(&tx, listing_id)?.ok_or(DbError::NotFound)?;
                if listing.user_id != seller_id {
                    return Err(DbError::InvalidInput("listing does not belong to this seller".into()));
                }
            }

            let rating = Rating {
                id: Uuid::new_v4(),
                reviewer_id,
                seller_id,
                listing_id,
                rating,
                review: review.map(str::to_string),
                created_at: now(),
            };

            tx.execute(
                "INSERT INTO ratings (id, reviewer_id, seller_id, listing_id, rating, review, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rating.id.to_string(),
                    reviewer_id.to_string(),
                    seller_id.to_string(),
                    listing_id.map(|l| l.to_string()),
                    rating.rating,
                    rating.review,
                    ts(rating.created_at),
                ],
            )?;
            tx.execute(
                "UPDATE users SET
                    rating_count = (SELECT COUNT(*) FROM ratings WHERE seller_id = ?1),
                    rating_average = (SELECT ROUND(AVG(rating), 2) FROM ratings WHERE seller_id = ?1)
                 WHERE id = ?1",
                [seller_id.to_string()],
            )?;
            tx.commit()?;

            Ok(rating)
        })
    }

    /// Ratings received by a seller, newest first.
    pub fn list_ratings(&self, seller_id: Uuid) -> Result<Vec<RatingResponse>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.reviewer_id, r.seller_id, r.listing_id, r.rating, r.review, r.created_at,
                        u.email, l.title
                 FROM ratings r
                 LEFT JOIN users u ON u.id = r.reviewer_id
                 LEFT JOIN listings l ON l.id = r.listing_id
                 WHERE r.seller_id = ?1
                 ORDER BY r.created_at DESC",
            )?;
            let rows = stmt
                .query_map([seller_id.to_string()], |row| {
                    let email: Option<String> = row.get(7)?;
                    Ok(RatingResponse {
                        rating: rating_from_row(row)?,
                        reviewer_name: email
                            .as_deref()
                            .map(display_name)
                            .unwrap_or("Anonymous")
                            .to_string(),
                        listing_title: row.get(8)?,
                    })
                })?
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
    fn ratings_update_seller_aggregate() {
        let (_dir, db) = open_temp();
        let seller = user(&db, "seller");
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let l = listing(&db, seller, "Router", 900.0);

        db.add_rating(a, seller, Some(l.id), 5, Some("Smooth deal")).unwrap();
        db.add_rating(b, seller, None, 4, None).unwrap();

        let profile = db.require_user(seller).unwrap();
        assert_eq!(profile.rating_count, 2);
        assert_eq!(profile.rating_average, 4.5);

        let list = db.list_ratings(seller).unwrap();
        assert_eq!(list.len(), 2);
        let with_listing = list.iter().find(|r| r.rating.reviewer_id == a).unwrap();
        assert_eq!(with_listing.reviewer_name, "alice");
        assert_eq!(with_listing.listing_title.as_deref(), Some("Router"));
    }

    #[test]
    fn rejects_out_of_range_and_self_ratings() {
        let (_dir, db) = open_temp();
        let seller = user(&db, "seller");
        let buyer = user(&db, "buyer");

        assert!(matches!(db.add_rating(buyer, seller, None, 0, None), Err(DbError::InvalidInput(_))));
        assert!(matches!(db.add_rating(buyer, seller, None, 6, None), Err(DbError::InvalidInput(_))));
        assert!(matches!(db.add_rating(seller, seller, None, 5, None), Err(DbError::InvalidInput(_))));
        assert!(matches!(db.add_rating(buyer, Uuid::new_v4(), None, 5, None), Err(DbError::NotFound)));
    }

    #[test]
    fn listing_must_belong_to_rated_seller() {
        let (_dir, db) = open_temp();
        let seller = user(&db, "seller");
        let other = user(&db, "other");
        let buyer = user(&db, "buyer");
        let l = listing(&db, other, "Fan", 700.0);

        let err = db.add_rating(buyer, seller, Some(l.id), 3, None).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }
}
