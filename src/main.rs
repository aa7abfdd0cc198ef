use anyhow::Context;
use axum::headers::Origin;
use axum::http::{request::Parts, HeaderValue, Method, StatusCode, Uri};
use axum::routing::{delete, get, patch, post, put};
use axum::{extract::DefaultBodyLimit, http, Extension, Router, TypedHeader};
use log::{error, info};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    db::{setup_db, DBConnection},
    routes::{
        create_expense_route, create_installments_route, create_notification_route,
        delete_expense_route, delete_notification_route, health_check, interested_count_route,
        list_expenses_route, list_notifications_route, mark_notification_read_route,
        receive_webhook_route, register_interest_route, sample_expenses_route,
        send_whatsapp_route, update_expense_route, valid_origin, validate_cors,
        verify_webhook_route,
    },
    whatsapp::{setup_whatsapp, WhatsAppClient, DEFAULT_API_URL},
};

mod db;
mod error;
mod expenses;
mod interested;
mod models;
mod notifications;
mod routes;
#[cfg(test)]
mod test_utils;
mod webhook;
mod whatsapp;

const ALLOWED_LOCALHOST: &str = "http://localhost:";
const ALLOWED_LOOPBACK: &str = "http://127.0.0.1:";

const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct State {
    db: Arc<dyn DBConnection + Send + Sync>,
    whatsapp: Arc<dyn WhatsAppClient + Send + Sync>,
    pub verify_token: String,
    pub allowed_origins: Arc<Vec<String>>,
}

fn required_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

fn parse_allowed_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv::dotenv().ok();
    pretty_env_logger::try_init()?;

    // get values key from env
    let pg_url = required_env("DATABASE_URL")?;
    let port: u16 = std::env::var("PORT")
        .ok()
        .map(|p| p.parse::<u16>())
        .transpose()
        .context("Invalid PORT")?
        .unwrap_or(8080);

    // whatsapp
    let verify_token = required_env("WHATSAPP_VERIFY_TOKEN")?;
    let wa_token = required_env("WHATSAPP_TOKEN")?;
    let wa_phone_id = required_env("WHATSAPP_PHONE_NUMBER_ID")?;
    let wa_api_url =
        std::env::var("WHATSAPP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let whatsapp = setup_whatsapp(&wa_api_url, &wa_phone_id, wa_token)
        .context("Invalid WHATSAPP_API_URL")?;

    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .map(|o| parse_allowed_origins(&o))
        .unwrap_or_default();

    let db = setup_db(pg_url).context("Unable to build DB connection pool")?;
    let state = State {
        db,
        whatsapp,
        verify_token,
        allowed_origins: Arc::new(allowed_origins),
    };

    let addr: std::net::SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("Failed to parse bind/port for webserver")?;

    let server_router = build_router(state);

    // Set up a oneshot channel to handle shutdown signal
    let (tx, rx) = oneshot::channel();

    // Spawn a task to listen for shutdown signals
    tokio::spawn(async move {
        let (mut term_signal, mut int_signal) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("failed to install signal handlers: {e}");
                return;
            }
        };

        tokio::select! {
            _ = term_signal.recv() => {
                info!("Received SIGTERM");
            },
            _ = int_signal.recv() => {
                info!("Received SIGINT");
            },
        }

        let _ = tx.send(());
    });

    let server = axum::Server::bind(&addr).serve(server_router.into_make_service());

    info!("Webserver running on http://{addr}");

    let graceful = server.with_graceful_shutdown(async {
        let _ = rx.await;
    });

    // Await the server to receive the shutdown signal
    if let Err(e) = graceful.await {
        error!("shutdown error: {e}");
    }

    info!("Graceful shutdown complete");

    Ok(())
}

fn build_router(state: State) -> Router {
    let allowed_origins = state.allowed_origins.clone();
    let cors_function = move |origin: &HeaderValue, _request_parts: &Parts| {
        let Ok(origin) = origin.to_str() else {
            return false;
        };

        valid_origin(&allowed_origins, origin)
    };

    Router::new()
        .route("/health-check", get(health_check))
        .route(
            "/webhook",
            get(verify_webhook_route)
                .post(receive_webhook_route)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/notifications",
            get(list_notifications_route).post(create_notification_route),
        )
        .route("/api/notifications/:id", delete(delete_notification_route))
        .route(
            "/api/notifications/:id/read",
            patch(mark_notification_read_route),
        )
        .route(
            "/api/expenses",
            get(list_expenses_route).post(create_expense_route),
        )
        .route("/api/expenses/sample", get(sample_expenses_route))
        .route(
            "/api/expenses/installments",
            post(create_installments_route),
        )
        .route(
            "/api/expenses/:id",
            put(update_expense_route).delete(delete_expense_route),
        )
        .route("/api/interested-users", post(register_interest_route))
        .route("/api/interested-users/count", get(interested_count_route))
        .route("/api/whatsapp/send", post(send_whatsapp_route))
        .fallback(fallback)
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(cors_function))
                .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ]),
        )
        .layer(DefaultBodyLimit::max(1_000_000)) // max 1mb body size
        .layer(Extension(state))
}

async fn fallback(
    origin: Option<TypedHeader<Origin>>,
    Extension(state): Extension<State>,
    uri: Uri,
) -> (StatusCode, String) {
    if let Err((status, msg)) = validate_cors(&state, origin) {
        return (status, msg);
    };

    (StatusCode::NOT_FOUND, format!("No route for {uri}"))
}
