use std::sync::Arc;

use bazaar_db::Database;
use bazaar_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
    pub jwt_secret: String,
    /// When set, registration only accepts addresses at this domain.
    pub email_domain: Option<String>,
}

impl AppStateInner {
    /// Run a store call off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> bazaar_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db)).await?;
        Ok(result?)
    }
}
