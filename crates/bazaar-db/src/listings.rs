use chrono::{Duration, NaiveDate};
use rusqlite::types::ToSql;
use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

use bazaar_types::api::{
    CreateListingRequest, DailyViews, ListingAnalytics, ListingQuery, ListingSort,
    UpdateListingRequest,
};
use bazaar_types::models::{ContactMethod, Listing};

use crate::error::{DbError, OptionalExt, Result};
use crate::models::{LISTING_COLUMNS, listing_from_row};
use crate::row::{now, ts};
use crate::Database;

const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_TAGS: usize = 10;
const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 100;

impl Database {
    pub fn create_listing(&self, owner_id: Uuid, req: &CreateListingRequest) -> Result<Listing> {
        validate_fields(
            &req.title,
            &req.description,
            req.price,
            req.contact_method,
            req.phone.as_deref(),
            &req.tags,
        )?;

        let id = Uuid::new_v4();
        let tags = serde_json::to_string(&normalize_tags(&req.tags))?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO listings (id, user_id, title, description, category, price,
                    contact_method, phone, image_url, location, tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.to_string(),
                    owner_id.to_string(),
                    req.title.trim(),
                    req.description.trim(),
                    req.category.as_str(),
                    req.price,
                    req.contact_method.as_str(),
                    req.phone.as_deref().map(str::trim),
                    req.image_url,
                    req.location.as_deref().map(str::trim),
                    tags,
                    ts(now()),
                ],
            )?;
            query_listing(conn, id)?.ok_or(DbError::NotFound)
        })
    }

    pub fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        self.with_conn(|conn| query_listing(conn, id))
    }

    pub fn require_listing(&self, id: Uuid) -> Result<Listing> {
        self.get_listing(id)?.ok_or(DbError::NotFound)
    }

    /// Apply a partial update. Returns the listing before and after so
    /// callers can react to changes such as a price drop.
    pub fn update_listing(
        &self,
        owner_id: Uuid,
        id: Uuid,
        req: &UpdateListingRequest,
    ) -> Result<(Listing, Listing)> {
        self.with_conn_mut(|conn| {
            let before = owned_listing(conn, owner_id, id)?;

            let title = req.title.clone().unwrap_or_else(|| before.title.clone());
            let description = req
                .description
                .clone()
                .unwrap_or_else(|| before.description.clone());
            let price = req.price.unwrap_or(before.price);
            let contact_method = req.contact_method.unwrap_or(before.contact_method);
            let phone = req.phone.clone().or_else(|| before.phone.clone());
            let tags = req.tags.clone().unwrap_or_else(|| before.tags.clone());

            validate_fields(&title, &description, price, contact_method, phone.as_deref(), &tags)?;

            conn.execute(
                "UPDATE listings SET title = ?1, description = ?2, category = ?3, price = ?4,
                    contact_method = ?5, phone = ?6, image_url = ?7, location = ?8, tags = ?9
                 WHERE id = ?10",
                params![
                    title.trim(),
                    description.trim(),
                    req.category.unwrap_or(before.category).as_str(),
                    price,
                    contact_method.as_str(),
                    phone.as_deref().map(str::trim),
                    req.image_url.clone().or_else(|| before.image_url.clone()),
                    req.location.clone().or_else(|| before.location.clone()),
                    serde_json::to_string(&normalize_tags(&tags))?,
                    id.to_string(),
                ],
            )?;

            let after = query_listing(conn, id)?.ok_or(DbError::NotFound)?;
            Ok((before, after))
        })
    }

    pub fn delete_listing(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            owned_listing(conn, owner_id, id)?;
            conn.execute("DELETE FROM listings WHERE id = ?1", [id.to_string()])?;
            info!("Listing {} deleted by {}", id, owner_id);
            Ok(())
        })
    }

    /// Filtered listing search. Featured listings always come first.
    pub fn search_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if !query.include_sold {
            clauses.push("is_sold = 0");
        }
        if let Some(category) = query.category {
            clauses.push("category = ?");
            args.push(Box::new(category.as_str()));
        }
        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            clauses.push("(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(q));
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern));
        }
        if let Some(min) = query.min_price {
            clauses.push("price >= ?");
            args.push(Box::new(min));
        }
        if let Some(max) = query.max_price {
            clauses.push("price <= ?");
            args.push(Box::new(max));
        }
        if let Some(seller) = query.seller_id {
            clauses.push("user_id = ?");
            args.push(Box::new(seller.to_string()));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order = match query.sort {
            ListingSort::Newest => "created_at DESC",
            ListingSort::PriceAsc => "price ASC, created_at DESC",
            ListingSort::PriceDesc => "price DESC, created_at DESC",
        };
        let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let offset = query.offset.unwrap_or(0);

        let sql = format!(
            "SELECT {} FROM listings {} ORDER BY is_featured DESC, {} LIMIT {} OFFSET {}",
            LISTING_COLUMNS, filter, order, limit, offset
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
            let rows = stmt
                .query_map(refs.as_slice(), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark a listing sold and credit the sale to its owner.
    pub fn mark_sold(&self, owner_id: Uuid, id: Uuid) -> Result<Listing> {
        self.with_conn_mut(|conn| {
            let listing = owned_listing(conn, owner_id, id)?;
            if listing.is_sold {
                return Err(DbError::Conflict("listing is already sold".into()));
            }

            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE listings SET is_sold = 1, is_featured = 0, featured_until = NULL WHERE id = ?1",
                [id.to_string()],
            )?;
            tx.execute(
                "UPDATE users SET total_sales = total_sales + 1 WHERE id = ?1",
                [owner_id.to_string()],
            )?;
            tx.commit()?;

            query_listing(conn, id)?.ok_or(DbError::NotFound)
        })
    }

    pub fn feature_listing(&self, owner_id: Uuid, id: Uuid, days: u32) -> Result<Listing> {
        if days == 0 || days > 90 {
            return Err(DbError::InvalidInput("days must be between 1 and 90".into()));
        }

        self.with_conn_mut(|conn| {
            let listing = owned_listing(conn, owner_id, id)?;
            if listing.is_sold {
                return Err(DbError::InvalidInput("sold listings cannot be featured".into()));
            }

            let until = now() + Duration::days(i64::from(days));
            conn.execute(
                "UPDATE listings SET is_featured = 1, featured_until = ?1 WHERE id = ?2",
                params![ts(until), id.to_string()],
            )?;
            query_listing(conn, id)?.ok_or(DbError::NotFound)
        })
    }

    /// Clear the featured flag on listings whose period has ended and
    /// return them as they were before the update.
    pub fn expire_featured(&self) -> Result<Vec<Listing>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let expired = {
                let sql = format!(
                    "SELECT {} FROM listings
                     WHERE is_featured = 1 AND featured_until IS NOT NULL AND featured_until <= ?1",
                    LISTING_COLUMNS
                );
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map([ts(now())], listing_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            for listing in &expired {
                tx.execute(
                    "UPDATE listings SET is_featured = 0 WHERE id = ?1",
                    [listing.id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(expired)
        })
    }

    pub fn record_view(
        &self,
        listing_id: Uuid,
        viewer_id: Option<Uuid>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE listings SET view_count = view_count + 1 WHERE id = ?1",
                [listing_id.to_string()],
            )?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
            tx.execute(
                "INSERT INTO listing_views (id, listing_id, viewer_id, ip_address, user_agent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    listing_id.to_string(),
                    viewer_id.map(|v| v.to_string()),
                    ip_address,
                    user_agent,
                    ts(now()),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn listing_analytics(&self, owner_id: Uuid, id: Uuid) -> Result<ListingAnalytics> {
        self.with_conn(|conn| {
            owned_listing(conn, owner_id, id)?;

            let total_views: i64 = conn.query_row(
                "SELECT COUNT(*) FROM listing_views WHERE listing_id = ?1",
                [id.to_string()],
                |r| r.get(0),
            )?;
            let total_favorites: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE listing_id = ?1",
                [id.to_string()],
                |r| r.get(0),
            )?;

            let today = now().date_naive();
            let first_day = today - Duration::days(6);
            let since = format!("{}T00:00:00.000Z", first_day.format("%Y-%m-%d"));

            let mut stmt = conn.prepare(
                "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
                 FROM listing_views
                 WHERE listing_id = ?1 AND created_at >= ?2
                 GROUP BY day",
            )?;
            let counts = stmt
                .query_map(params![id.to_string(), since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ListingAnalytics {
                listing_id: id,
                total_views,
                total_favorites,
                views_last_7_days: bucket_days(first_day, &counts),
                engagement_rate: engagement_rate(total_views, total_favorites),
            })
        })
    }
}

pub(crate) fn query_listing(conn: &Connection, id: Uuid) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS);
    conn.query_row(&sql, [id.to_string()], listing_from_row).optional()
}

fn owned_listing(conn: &Connection, owner_id: Uuid, id: Uuid) -> Result<Listing> {
    let listing = query_listing(conn, id)?.ok_or(DbError::NotFound)?;
    if listing.user_id != owner_id {
        return Err(DbError::NotAuthorized);
    }
    Ok(listing)
}

fn validate_fields(
    title: &str,
    description: &str,
    price: f64,
    contact_method: ContactMethod,
    phone: Option<&str>,
    tags: &[String],
) -> Result<()> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(DbError::InvalidInput(format!(
            "title must be 1-{} characters",
            MAX_TITLE_CHARS
        )));
    }
    let description = description.trim();
    if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(DbError::InvalidInput(format!(
            "description must be 1-{} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(DbError::InvalidInput("price must be a non-negative number".into()));
    }
    if contact_method.needs_phone() && phone.map_or(true, |p| p.trim().is_empty()) {
        return Err(DbError::InvalidInput("a phone number is required for this contact method".into()));
    }
    if tags.len() > MAX_TAGS {
        return Err(DbError::InvalidInput(format!("at most {} tags", MAX_TAGS)));
    }
    Ok(())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn bucket_days(first_day: NaiveDate, counts: &[(String, i64)]) -> Vec<DailyViews> {
    (0..7)
        .map(|offset| {
            let date = first_day + Duration::days(offset);
            let key = date.format("%Y-%m-%d").to_string();
            let views = counts
                .iter()
                .find(|(day, _)| *day == key)
                .map_or(0, |(_, n)| *n);
            DailyViews { date, views }
        })
        .collect()
}

fn engagement_rate(views: i64, favorites: i64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    let rate = favorites as f64 / views as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, open_temp, user};
    use bazaar_types::models::Category;

    #[test]
    fn only_the_owner_may_edit_or_delete() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let other = user(&db, "other");
        let l = listing(&db, owner, "Desk lamp", 300.0);

        let err = db
            .update_listing(other, l.id, &UpdateListingRequest { price: Some(1.0), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, DbError::NotAuthorized));
        assert!(matches!(db.delete_listing(other, l.id), Err(DbError::NotAuthorized)));

        db.delete_listing(owner, l.id).unwrap();
        assert!(db.get_listing(l.id).unwrap().is_none());
    }

    #[test]
    fn update_reports_previous_state() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let l = listing(&db, owner, "Guitar", 5000.0);

        let (before, after) = db
            .update_listing(owner, l.id, &UpdateListingRequest { price: Some(4200.0), ..Default::default() })
            .unwrap();
        assert_eq!(before.price, 5000.0);
        assert_eq!(after.price, 4200.0);
        assert_eq!(after.title, "Guitar");
    }

    #[test]
    fn rejects_blank_title_and_negative_price() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let mut req = CreateListingRequest {
            title: "   ".into(),
            description: "desc".into(),
            category: Category::Skill,
            price: 10.0,
            contact_method: ContactMethod::Email,
            phone: None,
            image_url: None,
            location: None,
            tags: vec![],
        };
        assert!(matches!(db.create_listing(owner, &req), Err(DbError::InvalidInput(_))));

        req.title = "Guitar lessons".into();
        req.price = -1.0;
        assert!(matches!(db.create_listing(owner, &req), Err(DbError::InvalidInput(_))));

        req.price = 10.0;
        req.contact_method = ContactMethod::Phone;
        assert!(matches!(db.create_listing(owner, &req), Err(DbError::InvalidInput(_))));
    }

    #[test]
    fn search_filters_and_puts_featured_first() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let cheap = listing(&db, owner, "Cheap chair", 100.0);
        let pricey = listing(&db, owner, "Fancy chair", 900.0);
        let sold = listing(&db, owner, "Old chair", 50.0);
        db.mark_sold(owner, sold.id).unwrap();
        db.feature_listing(owner, pricey.id, 7).unwrap();

        let all = db
            .search_listings(&ListingQuery { q: Some("CHAIR".into()), sort: ListingSort::PriceAsc, ..Default::default() })
            .unwrap();
        let ids: Vec<Uuid> = all.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![pricey.id, cheap.id]);

        let bounded = db
            .search_listings(&ListingQuery { max_price: Some(500.0), include_sold: true, ..Default::default() })
            .unwrap();
        assert_eq!(bounded.len(), 2);
    }

    #[test]
    fn like_wildcards_in_query_are_literal() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        listing(&db, owner, "Notebook", 20.0);

        let hits = db
            .search_listings(&ListingQuery { q: Some("%".into()), ..Default::default() })
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn mark_sold_credits_owner_once() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let l = listing(&db, owner, "Bicycle", 2500.0);

        assert!(db.mark_sold(owner, l.id).unwrap().is_sold);
        assert!(matches!(db.mark_sold(owner, l.id), Err(DbError::Conflict(_))));
        assert_eq!(db.require_user(owner).unwrap().total_sales, 1);
    }

    #[test]
    fn views_feed_counter_and_analytics() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let viewer = user(&db, "viewer");
        let l = listing(&db, owner, "Kettle", 400.0);

        db.record_view(l.id, Some(viewer), Some("10.0.0.1"), None).unwrap();
        db.record_view(l.id, None, None, None).unwrap();
        db.toggle_favorite(viewer, l.id).unwrap();

        assert_eq!(db.require_listing(l.id).unwrap().view_count, 2);

        let stats = db.listing_analytics(owner, l.id).unwrap();
        assert_eq!(stats.total_views, 2);
        assert_eq!(stats.total_favorites, 1);
        assert_eq!(stats.views_last_7_days.len(), 7);
        assert_eq!(stats.views_last_7_days.last().unwrap().views, 2);
        assert_eq!(stats.engagement_rate, 50.0);

        assert!(matches!(db.listing_analytics(viewer, l.id), Err(DbError::NotAuthorized)));
    }

    #[test]
    fn expired_features_are_cleared() {
        let (_dir, db) = open_temp();
        let owner = user(&db, "owner");
        let l = listing(&db, owner, "Poster", 80.0);
        db.feature_listing(owner, l.id, 1).unwrap();

        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE listings SET featured_until = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                [l.id.to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        let expired = db.expire_featured().unwrap();
        assert_eq!(expired.len(), 1);
        assert!(!db.require_listing(l.id).unwrap().is_featured);
        assert!(db.expire_featured().unwrap().is_empty());
    }
}
