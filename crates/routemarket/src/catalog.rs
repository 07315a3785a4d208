// Route catalog: paginated listing, lookup, and admin route creation with
// GPX/thumbnail upload.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use routemarket_core::db::models::{AccessType, Difficulty, Route};
use routemarket_core::error::{ErrorCode, MarketError, Result};
use routemarket_core::utils::generate_id;

use crate::accounts::{require_admin, UserRef};
use crate::context::MarketContext;
use crate::storage::StorageFolder;
use crate::store::MarketStore;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutePage {
    pub routes: Vec<Route>,
    pub pagination: Pagination,
}

/// List published routes, newest first. `page` is 1-based.
pub async fn list_published(store: &MarketStore, page: i64, limit: i64) -> Result<RoutePage> {
    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(MarketError::invalid_with(
            ErrorCode::InvalidPagination,
            format!("page must be >= 1 and limit between 1 and {MAX_PAGE_SIZE}"),
        ));
    }

    let repo = store.repo();
    let routes = repo.list_published_routes(limit, (page - 1) * limit).await?;
    let total = repo.count_published_routes().await?;

    Ok(RoutePage {
        routes,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        },
    })
}

/// A published route by id.
pub async fn get_published(store: &MarketStore, id: &str) -> Result<Route> {
    store
        .repo()
        .find_route(id)
        .await?
        .filter(|r| r.is_published)
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))
}

/// Listing fields of a new route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoute {
    pub title: String,
    pub description: String,
    pub distance: f64,
    pub elevation_gain: i64,
    pub difficulty: Difficulty,
    pub location: String,
    pub access_type: AccessType,
    #[serde(default)]
    pub price: Option<f64>,
}

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn invalid_route(message: impl Into<String>) -> MarketError {
    MarketError::invalid_with(ErrorCode::InvalidRouteData, message)
}

/// Check the listing and normalise its price: FREE routes never carry one.
fn validate(new: &NewRoute) -> Result<Option<f64>> {
    if new.title.trim().is_empty() {
        return Err(invalid_route("title is required"));
    }
    if !new.distance.is_finite() || new.distance < 0.0 {
        return Err(invalid_route("distance must be a non-negative number"));
    }
    if new.elevation_gain < 0 {
        return Err(invalid_route("elevationGain must be non-negative"));
    }
    if let Some(price) = new.price {
        if !price.is_finite() || price <= 0.0 {
            return Err(invalid_route("price must be a positive number"));
        }
    }
    match new.access_type {
        AccessType::Free => Ok(None),
        AccessType::Paid => new
            .price
            .map(Some)
            .ok_or_else(|| invalid_route("PAID routes require a price")),
        AccessType::Premium => Ok(new.price),
    }
}

/// Create and publish a route. Admin only.
pub async fn create_route(
    ctx: &MarketContext,
    admin: &UserRef,
    new: NewRoute,
    gpx: Upload,
    thumbnail: Option<Upload>,
) -> Result<Route> {
    require_admin(admin)?;
    let price = validate(&new)?;
    if gpx.bytes.is_empty() {
        return Err(invalid_route("GPX file is required"));
    }

    let gpx_file_url = ctx
        .storage
        .put(StorageFolder::Gpx, &gpx.file_name, &gpx.content_type, gpx.bytes)
        .await?;
    let thumbnail_url = match thumbnail {
        Some(image) if !image.bytes.is_empty() => Some(
            ctx.storage
                .put(StorageFolder::Images, &image.file_name, &image.content_type, image.bytes)
                .await?,
        ),
        _ => None,
    };

    let now = Utc::now();
    let route = Route {
        id: generate_id(),
        title: new.title.trim().to_string(),
        description: new.description,
        distance: new.distance,
        elevation_gain: new.elevation_gain,
        difficulty: new.difficulty,
        location: new.location,
        access_type: new.access_type,
        price,
        gpx_file_url,
        thumbnail_url,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    let route = ctx.store.repo().insert_route(&route).await?;

    tracing::info!(route_id = %route.id, admin_id = %admin.id, access = ?route.access_type, "route created");
    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(access_type: AccessType, price: Option<f64>) -> NewRoute {
        NewRoute {
            title: "Ridge Loop".into(),
            description: "".into(),
            distance: 12.0,
            elevation_gain: 400,
            difficulty: Difficulty::Moderate,
            location: "Dolomites".into(),
            access_type,
            price,
        }
    }

    #[test]
    fn test_price_rules() {
        assert_eq!(validate(&listing(AccessType::Free, Some(5.0))).unwrap(), None);
        assert_eq!(validate(&listing(AccessType::Paid, Some(12.5))).unwrap(), Some(12.5));
        assert!(validate(&listing(AccessType::Paid, None)).is_err());
        assert_eq!(validate(&listing(AccessType::Premium, None)).unwrap(), None);
        assert!(validate(&listing(AccessType::Premium, Some(-1.0))).is_err());
    }

    #[test]
    fn test_rejects_negative_numbers() {
        let mut new = listing(AccessType::Free, None);
        new.distance = -1.0;
        assert!(validate(&new).is_err());
        let mut new = listing(AccessType::Free, None);
        new.elevation_gain = -5;
        assert!(validate(&new).is_err());
    }
}
