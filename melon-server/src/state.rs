use crate::db::Database;
use crate::session::SessionManager;
use crate::storage::ImageStore;
use uuid::Uuid;

/// Shared handles available to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub session_manager: SessionManager,
    pub image_store: ImageStore,
}

impl AppState {
    pub fn new(db: Database, image_store: ImageStore) -> Self {
        Self {
            session_manager: SessionManager::new(db.clone()),
            db,
            image_store,
        }
    }

    /// Resolve a session token to a user ID, refreshing its expiry.
    pub fn get_authenticated_user_id_from_token(&self, token: &str) -> Option<Uuid> {
        self.session_manager.validate_session(token).ok()
    }
}
