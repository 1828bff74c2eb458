//! HTTP API for the mentorship service

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::directory::UserDirectory;
use crate::mentorship::RequestManager;
use crate::messaging::Messenger;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub requests: Arc<RequestManager>,
    pub messenger: Arc<Messenger>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let directory: Arc<dyn UserDirectory> = Arc::new(db.clone());
        Self {
            requests: Arc::new(RequestManager::new(db.clone(), directory)),
            messenger: Arc::new(Messenger::new(db.clone())),
            db,
        }
    }
}
