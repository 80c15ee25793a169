use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::product::Product;

#[async_trait::async_trait]
pub trait ProductRepository {
    async fn get_product_by_id(&self, id: &str) -> Result<Option<Product>, AppError>;
}

#[async_trait::async_trait]
impl ProductRepository for PostgresRepository {
    async fn get_product_by_id(&self, id: &str) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, short_description, price, mrp, images, sizes, current_size, size_variants,
                   rating::float8 AS rating, review_count, question_count, answer_count, in_stock,
                   what_is_it, what_does_it_do, our_promise, usage, what_makes_it_special
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }
}
