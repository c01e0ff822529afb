mod api;
mod config;
mod db;
mod rate_limit;
mod session;
mod state;
mod storage;
mod tags;
mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use db::repositories::PostRepository;
use rate_limit::RateLimiter;
use state::AppState;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use storage::ImageStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "melon_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::Settings::new().expect("Failed to read configuration");

    let db = db::Database::new(&settings.database.path).expect("Failed to open database");
    db.initialize()
        .expect("Failed to initialize database schema");
    if settings.database.seed_test_data {
        db.seed_test_data().expect("Failed to seed test data");
        tracing::info!("Test data seeded successfully");
    }
    tracing::info!("Database ready at {}", settings.database.path);

    let image_store = ImageStore::new(PathBuf::from(&settings.storage.root))
        .await
        .expect("Failed to initialize image storage");
    let images_dir = image_store.root().to_path_buf();

    let state = AppState::new(db, image_store);

    // Expired sessions are swept once at startup, then hourly
    sweep_sessions(&state);
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            sweep_sessions(&cleanup_state);
        }
    });

    // Image directories whose post is gone are swept on the same cadence
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            sweep_images(&sweep_state).await;
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 100 requests per minute per session
    let rate_limiter = RateLimiter::new(100, 60);

    let app = Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/api/auth/signup", post(api::auth::signup))
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/session", get(api::auth::session))
        .route("/api/auth/password", post(api::auth::change_password))
        // Onboarding
        .route("/api/onboarding", post(api::onboarding::complete_onboarding))
        .route("/api/check-username", get(api::onboarding::check_username))
        // Profiles
        .route("/api/profiles/me", put(api::profiles::update_my_profile))
        .route(
            "/api/profiles/me/avatar",
            put(api::profiles::upload_avatar).delete(api::profiles::delete_avatar),
        )
        .route("/api/profiles/:username", get(api::profiles::get_profile))
        .route(
            "/api/profiles/:username/posts",
            get(api::profiles::get_profile_posts),
        )
        .route(
            "/api/profiles/:username/connections",
            get(api::profiles::get_connections),
        )
        // Posts, feeds, reactions
        .route("/api/posts", post(api::posts::create_post))
        .route("/api/feed", get(api::posts::get_feed))
        .route("/api/posts/:id/replies", get(api::posts::get_replies))
        .route("/api/posts/:id/replies", post(api::posts::create_reply))
        .route("/api/posts/:id/reactions", post(api::reactions::toggle_reaction))
        .route("/api/posts/:id", get(api::posts::get_post))
        .route("/api/posts/:id", delete(api::posts::delete_post))
        .route("/api/tags/:slug", get(api::posts::get_tag_page))
        // Follows
        .route(
            "/api/users/:id/follow",
            post(api::follows::follow_user).delete(api::follows::unfollow_user),
        )
        .route(
            "/api/users/:id/follow-status",
            get(api::follows::get_follow_status),
        )
        // Notifications
        .route("/api/notifications", get(api::notifications::list_notifications))
        .route(
            "/api/notifications/unread-count",
            get(api::notifications::unread_count),
        )
        .route("/api/notifications/read-all", put(api::notifications::mark_all_read))
        .route("/api/notifications/:id/read", put(api::notifications::mark_read))
        // Uploaded images are served straight off disk
        .nest_service("/images", ServeDir::new(images_dir))
        .with_state(state)
        .layer(middleware::from_fn(rate_limit::rate_limit_middleware))
        .layer(axum::Extension(rate_limiter))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .expect("Invalid server address");
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

fn sweep_sessions(state: &AppState) {
    match state.session_manager.cleanup_expired_sessions() {
        Ok(0) => {}
        Ok(count) => tracing::info!("Removed {} expired sessions", count),
        Err(e) => tracing::error!("Session cleanup failed: {}", e),
    }
}

async fn sweep_images(state: &AppState) {
    let post_repo = PostRepository::new(state.db.pool.clone());
    let live_ids: HashSet<String> = match post_repo.get_all_ids() {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            tracing::error!("Failed to list post IDs for image sweep: {}", e);
            return;
        }
    };

    match state.image_store.sweep_orphans(&live_ids).await {
        Ok(0) => {}
        Ok(count) => tracing::info!("Image sweep removed {} orphaned directories", count),
        Err(e) => tracing::error!("Image sweep failed: {}", e),
    }
}

async fn health_check() -> &'static str {
    "OK"
}
