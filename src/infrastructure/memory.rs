use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::core::category::{Category, CategoryWithCount, NewCategory, ProductCount};
use crate::core::product::{
    NewProduct, Product, ProductDetail, ProductSummary, ProductWithCategories, Review, ReviewAuthor,
};
use crate::infrastructure::database::{CatalogStore, Page, StoreError};

#[derive(Default)]
struct Catalog {
    categories: Vec<Category>,
    products: Vec<(Product, Vec<Uuid>)>,
    reviews: Vec<Review>,
}

/// In-process `CatalogStore` with the same uniqueness and reference rules as
/// the Postgres schema. Used by router tests and local demos.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<Mutex<Catalog>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        // A poisoned lock only means another test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a review by `author` to an existing product. Each call is one
    /// second newer than the previous so ordering is deterministic.
    pub fn add_review(&self, product_id: Uuid, author: &str, rating: i32) -> Option<Review> {
        let mut catalog = self.lock();
        if !catalog.products.iter().any(|(p, _)| p.id == product_id) {
            return None;
        }
        let user_id = Uuid::new_v4();
        let offset = Duration::seconds(catalog.reviews.len() as i64);
        let review = Review {
            id: Uuid::new_v4(),
            product_id,
            user_id,
            rating,
            comment: None,
            created_at: Utc::now() + offset,
            user: ReviewAuthor { id: user_id, name: author.to_string() },
        };
        catalog.reviews.push(review.clone());
        Some(review)
    }

    fn categories_of(catalog: &Catalog, ids: &[Uuid]) -> Vec<Category> {
        let mut categories: Vec<Category> = catalog
            .categories
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        categories
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_products(&self, page: Page) -> Result<(Vec<ProductSummary>, i64), StoreError> {
        let catalog = self.lock();
        let total = catalog.products.len() as i64;
        let summaries = catalog
            .products
            .iter()
            .skip(page.skip.max(0) as usize)
            .take(page.take.max(0) as usize)
            .map(|(product, category_ids)| {
                let ratings = catalog
                    .reviews
                    .iter()
                    .filter(|r| r.product_id == product.id)
                    .map(|r| r.rating)
                    .collect();
                ProductSummary::new(product.clone(), Self::categories_of(&catalog, category_ids), ratings)
            })
            .collect();
        Ok((summaries, total))
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<ProductDetail>, StoreError> {
        let catalog = self.lock();
        let Some((product, category_ids)) = catalog.products.iter().find(|(p, _)| p.id == id) else {
            return Ok(None);
        };
        let mut reviews: Vec<Review> = catalog.reviews.iter().filter(|r| r.product_id == id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Some(ProductDetail::new(
            product.clone(),
            Self::categories_of(&catalog, category_ids),
            reviews,
        )))
    }

    async fn create_product(&self, new: NewProduct) -> Result<ProductWithCategories, StoreError> {
        let mut catalog = self.lock();
        let all_exist = new
            .category_ids
            .iter()
            .all(|id| catalog.categories.iter().any(|c| c.id == *id));
        if !all_exist {
            return Err(StoreError::InvalidReference("One or more categories do not exist".to_string()));
        }
        let product = Product::new(&new);
        let categories = Self::categories_of(&catalog, &new.category_ids);
        catalog.products.push((product.clone(), new.category_ids));
        Ok(ProductWithCategories { product, categories })
    }

    async fn list_categories(&self) -> Result<Vec<CategoryWithCount>, StoreError> {
        let catalog = self.lock();
        let mut listed: Vec<CategoryWithCount> = catalog
            .categories
            .iter()
            .map(|category| CategoryWithCount {
                category: category.clone(),
                count: ProductCount {
                    products: catalog
                        .products
                        .iter()
                        .filter(|(_, ids)| ids.contains(&category.id))
                        .count() as i64,
                },
            })
            .collect();
        listed.sort_by(|a, b| a.category.name.cmp(&b.category.name));
        Ok(listed)
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category, StoreError> {
        let mut catalog = self.lock();
        if catalog.categories.iter().any(|c| c.name == new.name || c.slug == new.slug) {
            return Err(StoreError::Conflict("Category with this name or slug already exists".to_string()));
        }
        let category = Category::new(new);
        catalog.categories.push(category.clone());
        Ok(category)
    }
}
