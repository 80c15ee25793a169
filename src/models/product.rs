use rocket::serde::Serialize;
use schemars::JsonSchema;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub short_description: String,
    pub price: i32,
    pub mrp: i32,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub current_size: String,
    pub size_variants: Option<sqlx::types::Json<JsonValue>>,
    pub rating: f64,
    pub review_count: i32,
    pub question_count: i32,
    pub answer_count: i32,
    pub in_stock: bool,
    pub what_is_it: Option<String>,
    pub what_does_it_do: Option<Vec<String>>,
    pub our_promise: Option<String>,
    pub usage: Option<Vec<String>>,
    pub what_makes_it_special: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub short_description: String,
    pub price: i32,
    pub mrp: i32,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub current_size: String,
    /// Per-size pricing, when the product has variants
    pub size_variants: Option<JsonValue>,
    pub rating: f64,
    pub review_count: i32,
    pub question_count: i32,
    pub answer_count: i32,
    pub in_stock: bool,
    pub what_is_it: Option<String>,
    pub what_does_it_do: Option<Vec<String>>,
    pub our_promise: Option<String>,
    pub usage: Option<Vec<String>>,
    pub what_makes_it_special: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            short_description: product.short_description.clone(),
            price: product.price,
            mrp: product.mrp,
            images: product.images.clone(),
            sizes: product.sizes.clone(),
            current_size: product.current_size.clone(),
            size_variants: product.size_variants.as_ref().map(|variants| variants.0.clone()),
            rating: product.rating,
            review_count: product.review_count,
            question_count: product.question_count,
            answer_count: product.answer_count,
            in_stock: product.in_stock,
            what_is_it: product.what_is_it.clone(),
            what_does_it_do: product.what_does_it_do.clone(),
            our_promise: product.our_promise.clone(),
            usage: product.usage.clone(),
            what_makes_it_special: product.what_makes_it_special.clone(),
        }
    }
}
