//! REST surface of the marketplace: identity, listings, conversations,
//! notifications and object storage.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod files;
pub mod listings;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod ratings;
pub mod router;
pub mod state;
pub mod storage;
pub mod sweep;
pub mod users;

pub use error::ApiError;
pub use router::router;
pub use state::{AppState, AppStateInner};
