use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub mod auth;
pub mod common;
pub mod incidents;
pub mod me;
pub mod permissions;
pub mod profiles;
pub mod reference;
pub mod system;
pub mod users;

/// Endpoints reachable without a session.
pub fn public() -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/password-policy/check", post(auth::check_password))
        .route("/auth/password-reset/request", post(auth::request_reset))
        .route("/auth/password-reset/complete", post(auth::complete_reset))
}

/// Endpoints that run behind the session middleware.
pub fn protected() -> Router {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(me::me))
        .route("/me/password", post(me::change_password))
        .route("/me/two-factor", post(me::enable_two_factor).delete(me::disable_two_factor))
        .route("/me/two-factor/verify", post(me::verify_two_factor))
        .route("/me/two-factor/recover", post(me::recover))
        .route("/users", get(users::list).post(users::create))
        .route("/users/:id", get(users::get).patch(users::update))
        .route("/users/:id/status", put(users::set_status))
        .route("/users/:id/profile", put(users::assign_profile))
        .route("/users/:id/reset-password", post(users::reset_password))
        .route("/users/:id/unlock", post(users::unlock))
        .route("/users/:id/permissions", get(users::permissions))
        .route("/users/:id/lock", get(users::lock_status))
        .route("/users/:id/explain", get(users::explain))
        .route("/profiles", get(profiles::list).post(profiles::create))
        .route(
            "/profiles/:id",
            get(profiles::get).patch(profiles::update).delete(profiles::delete),
        )
        .route("/profiles/:id/permissions", get(profiles::permissions))
        .route(
            "/profiles/:id/permissions/:permission_id",
            put(profiles::grant).delete(profiles::revoke),
        )
        .route("/permissions", get(permissions::list).post(permissions::create))
        .route("/permissions/:id", delete(permissions::delete))
        .route("/incidents", get(incidents::list))
        .route("/incidents/summary", get(incidents::summary))
        .route("/reference", post(reference::refresh))
        .route("/reference/:type", get(reference::items))
        .route("/reference/:type/resolve", get(reference::resolve))
}
