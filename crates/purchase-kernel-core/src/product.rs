//! Product: a catalog entry offered for sale.

use serde::{Deserialize, Serialize};

use crate::types::ProductKind;

/// Canonical catalog entry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub title: String,
    pub description: String,
    /// Display price, already localized by the store.
    pub formatted_price: String,
    /// Price multiplied by 1,000,000.
    pub price_micros: i64,
    /// ISO 4217 code.
    pub currency_code: String,
    pub kind: ProductKind,
}

/// Catalog entry as handed over by a gateway adapter.
///
/// Every field is optional because stores differ in what they fill in; the
/// adapter has already mapped its wire kind token to [`ProductKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProduct {
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub formatted_price: Option<String>,
    pub price_micros: Option<i64>,
    pub currency_code: Option<String>,
    pub kind: Option<ProductKind>,
}

impl From<&Product> for RawProduct {
    fn from(product: &Product) -> Self {
        Self {
            product_id: Some(product.product_id.clone()),
            title: Some(product.title.clone()),
            description: Some(product.description.clone()),
            formatted_price: Some(product.formatted_price.clone()),
            price_micros: Some(product.price_micros),
            currency_code: Some(product.currency_code.clone()),
            kind: Some(product.kind),
        }
    }
}
