#![doc = include_str!("../README.md")]

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routemarket::accounts::{self, SignUp, UserRef};
use routemarket::catalog::{self, NewRoute, Upload, DEFAULT_PAGE_SIZE};
use routemarket::{dashboard, entitlement, free_tier, payments, webhooks, MarketContext};
use routemarket_core::db::models::{AccessType, Difficulty};
use routemarket_core::error::{ErrorCode, MarketError};

/// Largest accepted multipart body (GPX plus thumbnail).
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// ─── Error Handling ──────────────────────────────────────────────

/// A marketplace error on its way out as an HTTP response.
pub struct ApiError(MarketError);

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.status().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %err, code = %err.code(), "request failed");
        }

        let body = serde_json::json!({
            "error": {
                "message": err.public_message(),
                "code": err.code(),
                "status": status.as_u16(),
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ─── Bearer Token Extraction ─────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn require_user(ctx: &MarketContext, headers: &HeaderMap) -> ApiResult<UserRef> {
    let token = bearer_token(headers).ok_or(MarketError::Unauthorized(ErrorCode::Unauthorized))?;
    Ok(accounts::authenticate(ctx, token).await?)
}

/// Anonymous when no token is sent; a token that is sent must be valid.
async fn optional_user(ctx: &MarketContext, headers: &HeaderMap) -> ApiResult<Option<UserRef>> {
    match bearer_token(headers) {
        Some(token) => Ok(Some(accounts::authenticate(ctx, token).await?)),
        None => Ok(None),
    }
}

// ─── RouteMarket Builder ────────────────────────────────────────

/// Axum front end for a [`MarketContext`].
///
/// ```rust,ignore
/// let ctx = MarketContext::init(options, adapter).await?;
/// let app = RouteMarket::from_context(ctx).router_with_cors();
/// ```
pub struct RouteMarket {
    ctx: Arc<MarketContext>,
}

impl RouteMarket {
    pub fn from_context(ctx: Arc<MarketContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<MarketContext> {
        &self.ctx
    }

    /// All endpoints under `/api`, with request tracing.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/ok", get(handle_ok))
            // Accounts
            .route("/auth/sign-up", post(handle_sign_up))
            .route("/auth/sign-in", post(handle_sign_in))
            // Catalog
            .route(
                "/routes",
                get(handle_list_routes)
                    .post(handle_create_route)
                    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
            )
            .route("/routes/download/{token}", get(handle_download))
            .route("/routes/{id}", get(handle_get_route))
            .route("/routes/{id}/access", get(handle_route_access))
            // Free tier
            .route("/email/capture", post(handle_email_capture))
            // Payments
            .route("/payments/create-intent", post(handle_create_intent))
            .route("/webhooks/stripe", post(handle_stripe_webhook))
            // Dashboard
            .route("/dashboard", get(handle_dashboard))
            .route("/admin/stats", get(handle_admin_stats))
            .with_state(self.ctx.clone());

        Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
    }

    /// [`Self::router`] with permissive CORS. Configure CORS yourself for production.
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        self.router().layer(cors)
    }
}

// ─── Route Handlers ─────────────────────────────────────────────

async fn handle_ok() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn handle_sign_up(
    State(ctx): State<Arc<MarketContext>>,
    Json(body): Json<SignUp>,
) -> ApiResult<impl IntoResponse> {
    let session = accounts::sign_up(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

async fn handle_sign_in(
    State(ctx): State<Arc<MarketContext>>,
    Json(body): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = accounts::sign_in(&ctx, &body.email, &body.password).await?;
    Ok(Json(session))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<String>,
    limit: Option<String>,
}

fn parse_page_param(value: Option<&str>, default: i64) -> Result<i64, MarketError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| MarketError::invalid_with(ErrorCode::InvalidPagination, format!("not a number: {raw}"))),
    }
}

async fn handle_list_routes(
    State(ctx): State<Arc<MarketContext>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = parse_page_param(query.page.as_deref(), 1)?;
    let limit = parse_page_param(query.limit.as_deref(), DEFAULT_PAGE_SIZE)?;
    Ok(Json(catalog::list_published(&ctx.store, page, limit).await?))
}

async fn handle_get_route(
    State(ctx): State<Arc<MarketContext>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(catalog::get_published(&ctx.store, &id).await?))
}

async fn handle_route_access(
    State(ctx): State<Arc<MarketContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = optional_user(&ctx, &headers).await?;
    let access = entitlement::evaluate(&ctx.store, user.as_ref(), &id).await?;
    Ok(Json(serde_json::json!({ "routeId": id, "access": access })))
}

async fn handle_download(
    State(ctx): State<Arc<MarketContext>>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let location = free_tier::redeem(&ctx.store, &token).await?;
    tracing::info!(route_id = %location.route_id, "free route downloaded");
    Ok((StatusCode::FOUND, [(header::LOCATION, location.gpx_file_url)]).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailCaptureRequest {
    email: String,
    route_id: String,
}

async fn handle_email_capture(
    State(ctx): State<Arc<MarketContext>>,
    Json(body): Json<EmailCaptureRequest>,
) -> ApiResult<impl IntoResponse> {
    // The token only travels by email.
    free_tier::issue_token(&ctx, &body.email, &body.route_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Check your email for the download link",
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentRequest {
    route_id: String,
}

async fn handle_create_intent(
    State(ctx): State<Arc<MarketContext>>,
    headers: HeaderMap,
    Json(body): Json<CreateIntentRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&ctx, &headers).await?;
    Ok(Json(payments::initiate_payment(&ctx, &user, &body.route_id).await?))
}

async fn handle_stripe_webhook(
    State(ctx): State<Arc<MarketContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    let outcome = webhooks::handle_stripe_webhook(&ctx, &body, signature).await?;
    tracing::debug!(?outcome, "stripe webhook handled");
    Ok(Json(serde_json::json!({ "received": true })))
}

async fn handle_dashboard(
    State(ctx): State<Arc<MarketContext>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&ctx, &headers).await?;
    Ok(Json(dashboard::dashboard(&ctx.store, &user).await?))
}

async fn handle_admin_stats(
    State(ctx): State<Arc<MarketContext>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&ctx, &headers).await?;
    Ok(Json(dashboard::admin_stats(&ctx.store, &user).await?))
}

// ─── Route Upload ───────────────────────────────────────────────

fn invalid_field(message: impl Into<String>) -> MarketError {
    MarketError::invalid_with(ErrorCode::InvalidRouteData, message)
}

/// Text fields and files of a route-creation form.
#[derive(Debug, Default)]
struct RouteForm {
    fields: std::collections::HashMap<String, String>,
    gpx: Option<Upload>,
    thumbnail: Option<Upload>,
}

impl RouteForm {
    fn text(&self, name: &str) -> Result<&str, MarketError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| invalid_field(format!("missing field `{name}`")))
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<T, MarketError> {
        self.text(name)?
            .trim()
            .parse()
            .map_err(|_| invalid_field(format!("`{name}` must be a number")))
    }

    fn enum_value<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, MarketError> {
        let raw = self.text(name)?.trim().to_uppercase();
        serde_json::from_value(serde_json::Value::String(raw))
            .map_err(|_| invalid_field(format!("unknown `{name}` value")))
    }

    fn into_parts(self) -> Result<(NewRoute, Upload, Option<Upload>), MarketError> {
        let price = match self.fields.get("price").map(|p| p.trim()).filter(|p| !p.is_empty()) {
            Some(_) => Some(self.number::<f64>("price")?),
            None => None,
        };
        let new = NewRoute {
            title: self.text("title")?.to_string(),
            description: self.fields.get("description").cloned().unwrap_or_default(),
            distance: self.number("distance")?,
            elevation_gain: self.number("elevationGain")?,
            difficulty: self.enum_value::<Difficulty>("difficulty")?,
            location: self.text("location")?.to_string(),
            access_type: self.enum_value::<AccessType>("accessType")?,
            price,
        };
        let gpx = self.gpx.ok_or_else(|| invalid_field("GPX file is required"))?;
        Ok((new, gpx, self.thumbnail))
    }
}

async fn read_route_form(mut multipart: Multipart) -> Result<RouteForm, MarketError> {
    let mut form = RouteForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid_field(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "gpxFile" | "thumbnail" => {
                let file_name = field.file_name().unwrap_or(name.as_str()).to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| invalid_field(format!("could not read `{name}`: {e}")))?;
                let upload = Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                };
                if name == "gpxFile" {
                    form.gpx = Some(upload);
                } else {
                    form.thumbnail = Some(upload);
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| invalid_field(format!("could not read `{name}`: {e}")))?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

async fn handle_create_route(
    State(ctx): State<Arc<MarketContext>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let admin = require_user(&ctx, &headers).await?;
    accounts::require_admin(&admin)?;

    let (new, gpx, thumbnail) = read_route_form(multipart).await?.into_parts()?;
    let route = catalog::create_route(&ctx, &admin, new, gpx, thumbnail).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

// ─── Tests ──────────────────────────────────────────────────────
