use serde::{Serialize, Deserialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use validator::Validate;

pub const CATEGORY_REQUIRED_FIELDS: &str = "Name and slug are required";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(new: NewCategory) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            slug: new.slug,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductCount {
    pub products: i64,
}

/// A category as listed, with the number of products attached to it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    #[serde(rename = "_count")]
    pub count: ProductCount,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(
        required(message = "Name and slug are required"),
        length(min = 1, message = "Name and slug are required")
    )]
    pub name: Option<String>,
    #[validate(
        required(message = "Name and slug are required"),
        length(min = 1, message = "Name and slug are required")
    )]
    pub slug: Option<String>,
}

/// Validated input for a category insert. The slug is always lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
}

impl CreateCategoryRequest {
    pub fn into_new_category(self) -> Option<NewCategory> {
        match (self.name, self.slug) {
            (Some(name), Some(slug)) if !name.is_empty() && !slug.is_empty() => Some(NewCategory {
                name,
                slug: slug.to_lowercase(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slug_is_lowercased() {
        let request: CreateCategoryRequest =
            serde_json::from_value(json!({"name": "Shoes", "slug": "Running-SHOES"})).unwrap();
        assert!(request.validate().is_ok());
        let new = request.into_new_category().unwrap();
        assert_eq!(new.name, "Shoes");
        assert_eq!(new.slug, "running-shoes");
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        for body in [json!({"name": "Shoes"}), json!({"slug": "shoes"}), json!({"name": "", "slug": "shoes"}), json!({})] {
            let request: CreateCategoryRequest = serde_json::from_value(body.clone()).unwrap();
            let errors = request.validate().expect_err("should be rejected");
            let messages: Vec<String> = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .collect();
            assert!(messages.iter().all(|m| m == CATEGORY_REQUIRED_FIELDS), "body {}", body);
            assert!(request.into_new_category().is_none());
        }
    }

    #[test]
    fn test_category_with_count_serialization() {
        let category = Category::new(NewCategory { name: "Shoes".into(), slug: "shoes".into() });
        let listed = CategoryWithCount { category: category.clone(), count: ProductCount { products: 3 } };
        let value = serde_json::to_value(&listed).unwrap();
        assert_eq!(value["name"], "Shoes");
        assert_eq!(value["_count"]["products"], 3);
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["id"], json!(category.id));
    }
}
