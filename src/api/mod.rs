use serde::Serialize;

pub mod category;
pub mod health;
pub mod product;

/// Success envelope shared by the catalog endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}
