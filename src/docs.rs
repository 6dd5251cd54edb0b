use utoipa::OpenApi;

/// OpenAPI document served at `/api/docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ecommerce Backend API",
        version = "1.0.0",
        description = "Catalog endpoints for products and categories, plus liveness and dependency readiness checks."
    ),
    paths(
        crate::api::health::root,
        crate::api::health::live,
        crate::api::health::ready,
        crate::api::product::list_products,
        crate::api::product::get_product,
        crate::api::product::create_product,
        crate::api::category::list_categories,
        crate::api::category::create_category,
    ),
    components(
        schemas(
            crate::api::health::ApiMessage,
            crate::api::health::LivenessResponse,
            crate::api::health::ReadinessSuccess,
            crate::api::health::ReadinessFailure,
            crate::api::product::ProductPage,
            crate::core::product::Product,
            crate::core::product::ProductSummary,
            crate::core::product::ProductDetail,
            crate::core::product::ProductWithCategories,
            crate::core::product::Review,
            crate::core::product::ReviewRating,
            crate::core::product::ReviewAuthor,
            crate::core::product::CreateProductRequest,
            crate::core::category::Category,
            crate::core::category::CategoryWithCount,
            crate::core::category::ProductCount,
            crate::core::category::CreateCategoryRequest,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "products", description = "Product catalog"),
        (name = "categories", description = "Product categories")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/",
            "/api/health",
            "/api/health/db",
            "/api/products",
            "/api/products/{id}",
            "/api/categories",
        ] {
            assert!(paths.contains(&expected), "missing path {}", expected);
        }
    }

    #[test]
    fn test_openapi_serializes() {
        let json = ApiDoc::openapi().to_pretty_json().expect("Should serialize");
        assert!(json.contains("Ecommerce Backend API"));
    }
}
