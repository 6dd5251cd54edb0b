use std::collections::HashSet;
use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use validator::Validate;

use crate::core::category::Category;

pub const PRODUCT_REQUIRED_FIELDS: &str = "Name and price are required";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(new: &NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            description: new.description.clone(),
            price: new.price,
            image: new.image.clone(),
            stock: new.stock,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Rating-only projection of a review, used in product listings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ReviewRating {
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: ReviewAuthor,
}

/// Product as it appears in `GET /api/products`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    #[serde(flatten)]
    pub product: Product,
    pub categories: Vec<Category>,
    pub reviews: Vec<ReviewRating>,
    pub avg_rating: Option<String>,
    pub review_count: usize,
}

impl ProductSummary {
    pub fn new(product: Product, categories: Vec<Category>, ratings: Vec<i32>) -> Self {
        let avg_rating = average_rating(&ratings);
        let reviews: Vec<ReviewRating> = ratings.into_iter().map(|rating| ReviewRating { rating }).collect();
        Self {
            product,
            categories,
            review_count: reviews.len(),
            reviews,
            avg_rating,
        }
    }
}

/// Product as it appears in `GET /api/products/:id`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub categories: Vec<Category>,
    pub reviews: Vec<Review>,
    pub avg_rating: Option<String>,
    pub review_count: usize,
}

impl ProductDetail {
    /// Reviews are expected newest first.
    pub fn new(product: Product, categories: Vec<Category>, reviews: Vec<Review>) -> Self {
        let ratings: Vec<i32> = reviews.iter().map(|r| r.rating).collect();
        Self {
            product,
            categories,
            avg_rating: average_rating(&ratings),
            review_count: reviews.len(),
            reviews,
        }
    }
}

/// Freshly created product with the categories it was connected to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductWithCategories {
    #[serde(flatten)]
    pub product: Product,
    pub categories: Vec<Category>,
}

/// Mean rating rendered with one decimal, rounding halves away from zero.
/// `None` when there are no ratings.
pub fn average_rating(ratings: &[i32]) -> Option<String> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    Some(format!("{:.1}", (mean * 10.0).round() / 10.0))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(
        required(message = "Name and price are required"),
        length(min = 1, message = "Name and price are required")
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    #[validate(
        required(message = "Name and price are required"),
        range(exclusive_min = 0.0, message = "Name and price are required")
    )]
    pub price: Option<f64>,
    pub image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_integer")]
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub category_ids: Option<Vec<Uuid>>,
}

/// Validated input for a product insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub stock: i32,
    pub category_ids: Vec<Uuid>,
}

impl CreateProductRequest {
    pub fn into_new_product(self) -> Option<NewProduct> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let price = self.price.filter(|p| *p > 0.0)?;
        let mut seen = HashSet::new();
        let mut category_ids = self.category_ids.unwrap_or_default();
        category_ids.retain(|id| seen.insert(*id));
        Some(NewProduct {
            name,
            description: self.description,
            price,
            image: self.image,
            stock: self.stock,
            category_ids,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

/// Accepts `19.99` or `"19.99"`. Blank strings count as absent.
fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<NumberOrString>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(NumberOrString::Number(n)) => n,
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("invalid number: {}", s)))?,
    };
    if !value.is_finite() {
        return Err(de::Error::custom("number must be finite"));
    }
    Ok(Some(value))
}

/// Accepts integers, floats (truncated) or numeric strings. Anything else is 0.
fn deserialize_lenient_integer<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed
        .filter(|n| n.is_finite())
        .map(|n| n.trunc().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
        .unwrap_or(0))
}
