use std::collections::HashMap;

use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, debug};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::ApiResponse;
use crate::core::product::{
    CreateProductRequest, ProductDetail, ProductSummary, ProductWithCategories, PRODUCT_REQUIRED_FIELDS,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::validation::{parse_page, ValidatedJson};
use crate::state::AppState;

pub const PRODUCT_NOT_FOUND: &str = "Product not found";

/// `GET /api/products` body: one page plus the paging inputs that produced it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductPage {
    pub success: bool,
    pub data: Vec<ProductSummary>,
    pub total: i64,
    pub skip: i64,
    pub take: i64,
}

#[utoipa::path(
    get,
    path = "/api/products",
    tag = "products",
    params(
        ("skip" = Option<i64>, Query, description = "Rows to skip (default 0)"),
        ("take" = Option<i64>, Query, description = "Page size (default 10, max 100)")
    ),
    responses(
        (status = 200, description = "Page of products", body = ProductPage),
        (status = 400, description = "Invalid paging parameters", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ProductPage>> {
    let page = parse_page(&query)?;
    let (data, total) = state.catalog.list_products(page).await?;
    debug!(skip = page.skip, take = page.take, returned = data.len(), total, "Listed products");

    Ok(Json(ProductPage {
        success: true,
        data,
        total,
        skip: page.skip,
        take: page.take,
    }))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "products",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product with categories and reviews", body = ProductDetail),
        (status = 404, description = "Product not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<ApiResponse<ProductDetail>>> {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejecting undecodable product id");
            return Err(ApiError::NotFound(PRODUCT_NOT_FOUND.to_string()));
        }
    };
    // A malformed id cannot name a product
    let Ok(id) = Uuid::parse_str(&id) else {
        debug!(id = %id, "Rejecting malformed product id");
        return Err(ApiError::NotFound(PRODUCT_NOT_FOUND.to_string()));
    };

    match state.catalog.find_product(id).await? {
        Some(product) => Ok(Json(ApiResponse::ok(product))),
        None => Err(ApiError::NotFound(PRODUCT_NOT_FOUND.to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/api/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductWithCategories),
        (status = 400, description = "Missing fields or unknown category", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ProductWithCategories>>)> {
    let new_product = payload
        .into_new_product()
        .ok_or_else(|| ApiError::Validation(PRODUCT_REQUIRED_FIELDS.to_string()))?;

    let created = state.catalog.create_product(new_product).await?;
    info!(product_id = %created.product.id, name = %created.product.name, "Product created via API");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}
