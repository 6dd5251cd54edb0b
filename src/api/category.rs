use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, debug};

use crate::api::ApiResponse;
use crate::core::category::{Category, CategoryWithCount, CreateCategoryRequest, CATEGORY_REQUIRED_FIELDS};
use crate::error::{ApiError, ApiResult};
use crate::middleware::validation::ValidatedJson;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "categories",
    responses((status = 200, description = "All categories with product counts", body = [CategoryWithCount]))
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<CategoryWithCount>>>> {
    let categories = state.catalog.list_categories().await?;
    debug!(count = categories.len(), "Listed categories");
    Ok(Json(ApiResponse::ok(categories)))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    tag = "categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Name and slug are required", body = crate::error::ErrorResponse),
        (status = 409, description = "Duplicate name or slug", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Category>>)> {
    let new_category = payload
        .into_new_category()
        .ok_or_else(|| ApiError::Validation(CATEGORY_REQUIRED_FIELDS.to_string()))?;

    let created = state.catalog.create_category(new_category).await?;
    info!(category_id = %created.id, slug = %created.slug, "Category created via API");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}
