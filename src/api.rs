//! JSON API routes.
//!
//! Every route answers with the `{success, data?, error?}` envelope except
//! the image proxy, which streams the upstream bytes. Upstream failures are
//! logged in full and reported to callers only as a generic message.

use crate::app_state::AppState;
use crate::error::ScrapeError;
use crate::filters::ListQuery;
use crate::models::{ApiResponse, RankKind};
use actix_web::http::header;
use actix_web::{get, web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RankQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
}

fn error_response(context: &str, e: ScrapeError) -> HttpResponse {
    let status = e.status_code();
    if status.is_server_error() {
        error!("{} failed: {}", context, e);
    } else {
        log::info!("{} rejected: {}", context, e);
    }
    HttpResponse::build(status).json(ApiResponse::<()>::err(e.public_message()))
}

fn respond<T: Serialize>(context: &str, result: crate::error::Result<T>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(ApiResponse::ok(data)),
        Err(e) => error_response(context, e),
    }
}

fn parse_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::err(message))
}

#[get("/api/manga")]
async fn list_manga(data: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    let request = match query.validate() {
        Ok(r) => r,
        Err(e) => return error_response("Manga list", e),
    };
    respond("Manga list", data.pipeline.list(&request).await)
}

#[get("/api/manga/update")]
async fn update_list(data: web::Data<AppState>, query: web::Query<PageQuery>) -> impl Responder {
    respond("Update list", data.pipeline.updates(query.page.as_deref()).await)
}

#[get("/api/manga/{id}")]
async fn manga_detail(data: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let Some(id) = parse_id(&id) else {
        return bad_request("Invalid manga ID");
    };
    respond("Manga detail", data.pipeline.detail(id).await)
}

#[get("/api/rank")]
async fn rank_list(data: web::Data<AppState>, query: web::Query<RankQuery>) -> impl Responder {
    let raw = query.kind.as_deref().unwrap_or("day");
    let Some(kind) = RankKind::parse(raw) else {
        return bad_request("Invalid type. Must be one of: day, week, month, total");
    };
    respond("Rank list", data.pipeline.rank(kind).await)
}

#[get("/api/chapter/{bid}/{cid}")]
async fn chapter(data: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let (bid, cid) = path.into_inner();
    let (Some(bid), Some(cid)) = (parse_id(&bid), parse_id(&cid)) else {
        return bad_request("Invalid manga or chapter ID");
    };
    respond("Chapter", data.pipeline.chapter(bid, cid).await)
}

#[get("/api/image")]
async fn image_proxy(data: web::Data<AppState>, query: web::Query<ImageQuery>) -> impl Responder {
    let Some(url) = query.url.as_deref().filter(|u| !u.is_empty()) else {
        return bad_request("Missing url parameter");
    };
    match data.pipeline.image(url).await {
        Ok(image) => HttpResponse::Ok()
            .content_type(image.content_type)
            .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .body(image.bytes),
        Err(e) => error_response("Image proxy", e),
    }
}

/// Register every API route; `/api/manga/update` precedes `/api/manga/{id}`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_manga)
        .service(update_list)
        .service(manga_detail)
        .service(rank_list)
        .service(chapter)
        .service(image_proxy);
}
