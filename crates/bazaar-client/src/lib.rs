//! Client side of the marketplace: a REST client, the change feed
//! listener, and the live inbox state it keeps up to date.

pub mod error;
pub mod feed;
pub mod http;
pub mod live;
pub mod session;

pub use error::{ClientError, Result};
pub use feed::FeedClient;
pub use http::ApiClient;
pub use live::{LiveInbox, Refresh, Scope};
pub use session::Session;
