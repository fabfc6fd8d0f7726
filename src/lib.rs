//! Sign-out kiosk server: kiosk sign-outs, the admin dashboard API and the
//! reset-day archival of each day's records.

pub mod archive;
pub mod auth;
pub mod config;
pub mod db;
pub mod err;
pub mod history;
pub mod models;
pub mod roster;
pub mod signout;
pub mod store;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::auth::AdminGate;
pub use crate::err::Error;
use crate::err::Success;
use crate::store::KioskStore;

pub type Payload<T> = Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KioskStore>,
    pub gate: Arc<AdminGate>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/classes", get(roster::list_classes))
        .route("/api/students/:class_id", get(roster::class_students))
        .route("/api/sign-out", post(signout::sign_out))
        .route("/api/sign-in/:record_id", post(signout::sign_back_in))
        .route("/api/admin/login", post(auth::login_admin))
        .route("/api/admin/logout", post(auth::logout_admin))
        .route("/api/admin/records", get(signout::todays_records))
        .route("/api/reset-day", post(archive::reset_day_handler))
        .route("/api/history", get(history::list_days))
        .route("/api/history/:day", get(history::archive_day))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}
