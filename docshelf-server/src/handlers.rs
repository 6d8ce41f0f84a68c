use actix_cors::Cors;
use actix_web::{web, HttpRequest, HttpResponse};
use docshelf::{CategoryId, DocumentId};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/healthcheck", web::get().to(healthcheck))
            .route("/status", web::get().to(status))
            // Reading
            .route("/categories", web::get().to(categories))
            .route("/categoryTree", web::get().to(category_tree))
            .route("/file", web::get().to(file))
            // Sync
            .route("/webhook", web::post().to(webhook)),
    );
}

/// Cross-origin policy for the API: any origin when `origins` is empty,
/// otherwise only the listed ones.
pub fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600);
    if origins.is_empty() {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn data<T: Serialize>(value: T) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "data": value }))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

// ── Health and status ───────────────────────────────────────────────

async fn healthcheck() -> HttpResponse {
    data(serde_json::json!({ "status": "ok" }))
}

async fn status(state: web::Data<AppState>) -> HttpResponse {
    let generation = state.store.generation();
    data(serde_json::json!({
        "published": generation > 0,
        "generation": generation,
        "sync": state.trigger.orchestrator().status(),
    }))
}

// ── Reading ─────────────────────────────────────────────────────────

async fn categories(state: web::Data<AppState>) -> HttpResponse {
    data(state.store.categories())
}

async fn category_tree(state: web::Data<AppState>, query: web::Query<IdQuery>) -> HttpResponse {
    let Some(raw) = query.id.as_deref() else {
        return bad_request("missing query parameter 'id'");
    };
    match raw.parse::<CategoryId>() {
        Ok(id) => data(state.store.category_tree(&id)),
        Err(_) => data(Vec::<()>::new()),
    }
}

async fn file(state: web::Data<AppState>, query: web::Query<IdQuery>) -> HttpResponse {
    let Some(raw) = query.id.as_deref() else {
        return bad_request("missing query parameter 'id'");
    };
    match raw.parse::<DocumentId>() {
        Ok(id) => data(state.store.content(&id).as_ref()),
        Err(_) => data(""),
    }
}

// ── Sync ────────────────────────────────────────────────────────────

async fn webhook(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let Some(secret) = state.webhook_secret.as_deref() else {
        log::warn!("Refusing webhook: no secret configured");
        return HttpResponse::Forbidden().json(serde_json::json!({ "error": "forbidden" }));
    };
    let provided = req
        .headers()
        .get(state.webhook_header.as_str())
        .and_then(|v| v.to_str().ok());
    if provided != Some(secret) {
        log::warn!("Refusing webhook: bad or missing {} header", state.webhook_header);
        return HttpResponse::Forbidden().json(serde_json::json!({ "error": "forbidden" }));
    }

    let outcome = state.trigger.request_sync();
    HttpResponse::Accepted().json(serde_json::json!({ "data": { "outcome": outcome } }))
}
