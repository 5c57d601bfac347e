use std::path::Path as FsPath;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, patch, post},
};
use chrono::Utc;
use padel_models::{Court, NewReservation, NewUser, RegisterOutcome, ReservationDetail};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::ApiError;

pub fn router(pool: SqlitePool, static_dir: &str) -> Router {
    let api_routes = Router::new()
        .route("/getCourts", get(get_courts))
        .route("/register", post(register))
        .route("/reservations/create", post(create_reservation))
        .route("/reservations/user/{user_id}", get(user_reservations))
        .route("/reservations/{id}/cancel", patch(cancel_reservation));

    let index = FsPath::new(static_dir).join("index.html");

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

async fn health(State(pool): State<SqlitePool>) -> (StatusCode, Json<Value>) {
    match padel_db::ping(&pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "connected",
                "timestamp": Utc::now().to_rfc3339(),
                "version": crate::version_string()
            })),
        ),
        Err(e) => {
            warn!("Health check failed: {e:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "database": "disconnected",
                    "error": e.to_string()
                })),
            )
        }
    }
}

async fn get_courts(State(pool): State<SqlitePool>) -> Result<Json<Vec<Court>>, ApiError> {
    let courts = padel_db::list_courts(&pool).await?;
    Ok(Json(courts))
}

async fn register(
    State(pool): State<SqlitePool>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    match padel_db::register_user(&pool, &body).await? {
        RegisterOutcome::Created => {
            info!("New user registered: {} ({})", body.name, body.uid);
            Ok((StatusCode::CREATED, Json(json!({ "message": "User created successfully" }))))
        }
        RegisterOutcome::AlreadyExists => {
            debug!("User already exists: {}", body.uid);
            Ok((StatusCode::OK, Json(json!({ "message": "User already exists" }))))
        }
    }
}

async fn create_reservation(
    State(pool): State<SqlitePool>,
    body: Result<Json<NewReservation>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let id = padel_db::create_reservation(&pool, &body)
        .await
        .inspect_err(|e| {
            if matches!(e, padel_db::BookingError::SlotConflict) {
                warn!(
                    "Court {} already booked between {} and {}",
                    body.court_id, body.start_time, body.end_time
                );
            }
        })?;
    info!(
        "Reservation {id} created: court {} for {} ({} - {})",
        body.court_id, body.user_id, body.start_time, body.end_time
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Reservation created successfully" })),
    ))
}

async fn user_reservations(
    State(pool): State<SqlitePool>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ReservationDetail>>, ApiError> {
    let reservations = padel_db::list_reservations_for_user(&pool, &user_id).await?;
    Ok(Json(reservations))
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    cancel_reason: Option<String>,
}

async fn cancel_reservation(
    State(pool): State<SqlitePool>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // The body is optional; a bare PATCH cancels without a reason.
    let request = if body.is_empty() {
        CancelRequest::default()
    } else {
        Json::<CancelRequest>::from_bytes(&body)?.0
    };

    // Ids are integers, so any other value matches no row.
    match id.parse::<i64>() {
        Ok(id) => {
            let updated =
                padel_db::cancel_reservation(&pool, id, request.cancel_reason.as_deref()).await?;
            info!("Reservation {id} cancelled ({updated} row(s) updated)");
        }
        Err(_) => debug!("Cancel for non-numeric reservation id {id:?} matched nothing"),
    }
    Ok(Json(json!({ "message": "Reservation cancelled successfully" })))
}
