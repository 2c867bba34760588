use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::service::EngagementService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/subjects/{id}").route(web::put().to(register_subject)))
            .service(web::resource("/subjects/{id}/thread").route(web::get().to(list_thread)))
            .service(
                web::resource("/subjects/{id}/pin").route(web::delete().to(unpin_comment)),
            )
            .service(web::resource("/comments").route(web::post().to(add_comment)))
            .service(web::resource("/comments/{id}").route(web::delete().to(delete_comment)))
            .service(web::resource("/comments/{id}/pin").route(web::post().to(pin_comment)))
            .service(
                web::resource("/comments/{id}/like")
                    .route(web::put().to(like_comment))
                    .route(web::delete().to(unlike_comment)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub service: EngagementService,
    pub limiter: RateLimiterFacade,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterSubjectRequest {
    pub owner_id: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/subjects/{id}",
    request_body = RegisterSubjectRequest,
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Subject registered", body = Subject),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn register_subject(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<RegisterSubjectRequest>,
) -> Result<HttpResponse, ApiError> {
    let subject = data
        .service
        .register_subject(Subject {
            id: path.into_inner(),
            owner_id: payload.into_inner().owner_id,
        })
        .await?;
    Ok(HttpResponse::Ok().json(subject))
}

#[utoipa::path(
    get,
    path = "/api/v1/subjects/{id}/thread",
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Annotated comment tree", body = [ThreadNode]),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn list_thread(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let viewer = auth.as_ref().map(|a| a.0.sub.as_str());
    let tree = data.service.list_thread(&path.into_inner(), viewer).await?;
    Ok(HttpResponse::Ok().json(tree))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddCommentRequest {
    pub subject_id: String,
    pub content: String,
    pub parent_id: Option<Id>,
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = AddCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty or too-long content"),
        (status = 404, description = "Subject not found"),
        (status = 409, description = "Invalid parent or owner comment limit"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn add_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<AddCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_comment(&auth.0.sub) {
        return Err(ApiError::TooManyRequests);
    }
    let req = payload.into_inner();
    let comment = data
        .service
        .add_comment(NewComment {
            subject_id: req.subject_id,
            author_id: auth.0.sub,
            content: req.content,
            parent_id: req.parent_id,
        })
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Requester is neither author nor subject owner"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.service
        .delete_comment(path.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/pin",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment pinned"),
        (status = 403, description = "Only the subject owner may pin"),
        (status = 404, description = "Comment not found"),
        (status = 409, description = "Replies are not pinnable")
    )
)]
pub async fn pin_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.service
        .pin_comment(path.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

#[utoipa::path(
    delete,
    path = "/api/v1/subjects/{id}/pin",
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Pin cleared"),
        (status = 403, description = "Only the subject owner may unpin"),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn unpin_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    data.service
        .unpin_comment(&path.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Liked (idempotent)"),
        (status = 404, description = "Comment not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn like_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_like(&auth.0.sub) {
        return Err(ApiError::TooManyRequests);
    }
    data.service
        .like_comment(path.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Unliked (idempotent)"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn unlike_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.service
        .unlike_comment(path.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}
