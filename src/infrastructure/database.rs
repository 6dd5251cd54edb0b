use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use thiserror::Error;
use tracing::{info, warn, error, debug};
use uuid::Uuid;

use crate::config::Config;
use crate::core::category::{Category, CategoryWithCount, NewCategory, ProductCount};
use crate::core::product::{
    NewProduct, Product, ProductDetail, ProductSummary, ProductWithCategories, Review, ReviewAuthor,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database is not configured")]
    NotConfigured,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidReference(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Offset pagination for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub take: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, take: 10 }
    }
}

/// Process-wide database handle. Holds no pool when `DATABASE_URL` is unset so
/// the API can still start and report the misconfiguration.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Option<PgPool>,
}

impl Database {
    /// Build the pool without connecting; the first query opens a connection.
    pub fn connect_lazy(config: &Config) -> Result<Self, sqlx::Error> {
        if config.database_url.is_empty() {
            warn!("DATABASE_URL is not configured, database features are disabled");
            return Ok(Self::unconfigured());
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(config.probe_timeout)
            .connect_lazy(&config.database_url)?;

        info!(max_connections = config.database_max_connections, "Database pool created");
        Ok(Self { pool: Some(pool) })
    }

    pub fn unconfigured() -> Self {
        Self { pool: None }
    }

    pub fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool.as_ref().ok_or(StoreError::NotConfigured)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Release every pooled connection. Safe to call more than once.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            debug!("Closing database pool");
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

/// Round-trip check used by the readiness sequence.
#[async_trait]
pub trait DatabasePing: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl DatabasePing for Database {
    async fn ping(&self) -> Result<(), StoreError> {
        let pool = self.pool()?;
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
        Ok(())
    }
}

/// Catalog persistence used by the product and category handlers.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// One page of products plus the total product count.
    async fn list_products(&self, page: Page) -> Result<(Vec<ProductSummary>, i64), StoreError>;
    async fn find_product(&self, id: Uuid) -> Result<Option<ProductDetail>, StoreError>;
    async fn create_product(&self, new: NewProduct) -> Result<ProductWithCategories, StoreError>;
    async fn list_categories(&self) -> Result<Vec<CategoryWithCount>, StoreError>;
    async fn create_category(&self, new: NewCategory) -> Result<Category, StoreError>;
}

#[derive(FromRow)]
struct ProductCategoryRow {
    product_id: Uuid,
    #[sqlx(flatten)]
    category: Category,
}

#[derive(FromRow)]
struct RatingRow {
    product_id: Uuid,
    rating: i32,
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    rating: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    user_name: String,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            user: ReviewAuthor { id: row.user_id, name: row.user_name },
        }
    }
}

#[derive(FromRow)]
struct CategoryCountRow {
    #[sqlx(flatten)]
    category: Category,
    product_count: i64,
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, image, stock, created_at, updated_at";

pub struct PgCatalog {
    db: Database,
}

impl PgCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn categories_for(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Category>>, StoreError> {
        let rows = sqlx::query_as::<_, ProductCategoryRow>(
            "SELECT pc.product_id, c.id, c.name, c.slug, c.created_at, c.updated_at \
             FROM product_categories pc JOIN categories c ON c.id = pc.category_id \
             WHERE pc.product_id = ANY($1) ORDER BY c.name",
        )
        .bind(product_ids)
        .fetch_all(self.db.pool()?)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Category>> = HashMap::new();
        for row in rows {
            grouped.entry(row.product_id).or_default().push(row.category);
        }
        Ok(grouped)
    }
}

fn classify_write_error(e: sqlx::Error, conflict: &str, invalid_reference: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(conflict.to_string()),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::InvalidReference(invalid_reference.to_string()),
            _ => {}
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn list_products(&self, page: Page) -> Result<(Vec<ProductSummary>, i64), StoreError> {
        debug!(skip = page.skip, take = page.take, "Listing products");
        let pool = self.db.pool()?;

        let query = format!(
            "SELECT {} FROM products ORDER BY created_at, id LIMIT $1 OFFSET $2",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&query)
            .bind(page.take)
            .bind(page.skip)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Product list query failed");
                e
            })?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let mut categories = self.categories_for(&ids).await?;

        let ratings = sqlx::query_as::<_, RatingRow>(
            "SELECT product_id, rating FROM reviews WHERE product_id = ANY($1) ORDER BY created_at",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;
        let mut ratings_by_product: HashMap<Uuid, Vec<i32>> = HashMap::new();
        for row in ratings {
            ratings_by_product.entry(row.product_id).or_default().push(row.rating);
        }

        let summaries = products
            .into_iter()
            .map(|product| {
                let cats = categories.remove(&product.id).unwrap_or_default();
                let ratings = ratings_by_product.remove(&product.id).unwrap_or_default();
                ProductSummary::new(product, cats, ratings)
            })
            .collect::<Vec<_>>();

        debug!(returned = summaries.len(), total = total, "Products listed");
        Ok((summaries, total))
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<ProductDetail>, StoreError> {
        let pool = self.db.pool()?;
        let query = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let Some(product) = sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
        else {
            debug!(product_id = %id, "No product found");
            return Ok(None);
        };

        let categories = self.categories_for(&[id]).await?.remove(&id).unwrap_or_default();
        let reviews = sqlx::query_as::<_, ReviewRow>(
            "SELECT r.id, r.product_id, r.user_id, r.rating, r.comment, r.created_at, u.name AS user_name \
             FROM reviews r JOIN users u ON u.id = r.user_id \
             WHERE r.product_id = $1 ORDER BY r.created_at DESC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Review::from)
        .collect();

        Ok(Some(ProductDetail::new(product, categories, reviews)))
    }

    async fn create_product(&self, new: NewProduct) -> Result<ProductWithCategories, StoreError> {
        let pool = self.db.pool()?;
        let product = Product::new(&new);
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO products ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            PRODUCT_COLUMNS, PRODUCT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Product>(&query)
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(&product.image)
            .bind(product.stock)
            .bind(product.created_at)
            .bind(product.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        for category_id in &new.category_ids {
            sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES ($1, $2)")
                .bind(inserted.id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    warn!(product_id = %inserted.id, category_id = %category_id, error = %e, "Failed to connect category");
                    classify_write_error(e, "Category already connected", "One or more categories do not exist")
                })?;
        }

        let categories = sqlx::query_as::<_, Category>(
            "SELECT c.id, c.name, c.slug, c.created_at, c.updated_at \
             FROM product_categories pc JOIN categories c ON c.id = pc.category_id \
             WHERE pc.product_id = $1 ORDER BY c.name",
        )
        .bind(inserted.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(product_id = %inserted.id, categories = categories.len(), "Product created");
        Ok(ProductWithCategories { product: inserted, categories })
    }

    async fn list_categories(&self) -> Result<Vec<CategoryWithCount>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryCountRow>(
            "SELECT c.id, c.name, c.slug, c.created_at, c.updated_at, COUNT(pc.product_id) AS product_count \
             FROM categories c LEFT JOIN product_categories pc ON pc.category_id = c.id \
             GROUP BY c.id ORDER BY c.name",
        )
        .fetch_all(self.db.pool()?)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryWithCount {
                category: row.category,
                count: ProductCount { products: row.product_count },
            })
            .collect())
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category, StoreError> {
        let category = Category::new(new);
        let inserted = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, slug, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, slug, created_at, updated_at",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(category.created_at)
        .bind(category.updated_at)
        .fetch_one(self.db.pool()?)
        .await
        .map_err(|e| {
            classify_write_error(
                e,
                "Category with this name or slug already exists",
                "Invalid category reference",
            )
        })?;

        info!(category_id = %inserted.id, slug = %inserted.slug, "Category created");
        Ok(inserted)
    }
}
