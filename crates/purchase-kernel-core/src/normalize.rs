//! Normalization of store data into canonical records.
//!
//! Both normalizers are total over well-formed input and refuse to default a
//! missing required field. A purchase without a token or product id would slip
//! past lifecycle tracking, so it is rejected instead.

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::product::{Product, RawProduct};
use crate::purchase::{Purchase, RawPurchase};
use crate::types::{OrderId, PurchaseState, PurchaseToken};

/// Receipt fields as they appear in the signed JSON.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptFields {
    order_id: Option<String>,
    package_name: Option<String>,
    product_id: Option<String>,
    purchase_time: Option<i64>,
    purchase_state: Option<i64>,
    purchase_token: Option<String>,
    developer_payload: Option<String>,
    auto_renewing: Option<bool>,
    acknowledged: Option<bool>,
}

fn required_str(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(CoreError::MalformedReceipt(format!("empty field: {field}"))),
        None => Err(CoreError::MalformedReceipt(format!("missing field: {field}"))),
    }
}

/// Parse a raw receipt into a [`Purchase`].
///
/// Every field is read out of `original_json`, the bytes covered by the
/// signature. The raw bytes themselves are carried over untouched.
pub fn normalize_purchase(raw: &RawPurchase) -> Result<Purchase> {
    if raw.original_json.is_empty() {
        return Err(CoreError::MalformedReceipt("empty receipt".into()));
    }

    let fields: ReceiptFields = serde_json::from_slice(&raw.original_json)
        .map_err(|e| CoreError::MalformedReceipt(e.to_string()))?;

    let state_code = fields
        .purchase_state
        .ok_or_else(|| CoreError::MalformedReceipt("missing field: purchaseState".into()))?;
    let state = PurchaseState::from_receipt_code(state_code).ok_or_else(|| {
        CoreError::MalformedReceipt(format!("unknown purchaseState: {state_code}"))
    })?;

    let purchase_time_millis = fields
        .purchase_time
        .ok_or_else(|| CoreError::MalformedReceipt("missing field: purchaseTime".into()))?;

    Ok(Purchase {
        order_id: OrderId::new(required_str(fields.order_id, "orderId")?),
        product_id: required_str(fields.product_id, "productId")?,
        purchase_time_millis,
        purchase_token: PurchaseToken::new(required_str(
            fields.purchase_token,
            "purchaseToken",
        )?),
        state,
        package_name: required_str(fields.package_name, "packageName")?,
        payload: fields.developer_payload.unwrap_or_default(),
        auto_renewing: fields.auto_renewing.unwrap_or(false),
        acknowledged: fields.acknowledged.unwrap_or(false),
        signature: raw.signature.clone(),
        raw_payload: raw.original_json.clone(),
    })
}

fn required_product_field<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| CoreError::MalformedProduct(format!("missing field: {field}")))
}

/// Map an adapter catalog entry into a [`Product`].
pub fn normalize_product(raw: RawProduct) -> Result<Product> {
    let product_id = required_product_field(raw.product_id, "productId")?;
    if product_id.is_empty() {
        return Err(CoreError::MalformedProduct("empty field: productId".into()));
    }

    let price_micros = required_product_field(raw.price_micros, "priceMicros")?;
    if price_micros < 0 {
        return Err(CoreError::MalformedProduct(format!(
            "negative priceMicros for {product_id}"
        )));
    }

    let currency_code = required_product_field(raw.currency_code, "currencyCode")?;
    if currency_code.len() != 3 || !currency_code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(CoreError::MalformedProduct(format!(
            "invalid currency code {currency_code:?} for {product_id}"
        )));
    }

    Ok(Product {
        title: required_product_field(raw.title, "title")?,
        description: required_product_field(raw.description, "description")?,
        formatted_price: required_product_field(raw.formatted_price, "formattedPrice")?,
        kind: required_product_field(raw.kind, "kind")?,
        product_id,
        price_micros,
        currency_code,
    })
}
