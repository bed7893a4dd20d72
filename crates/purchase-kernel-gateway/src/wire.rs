//! Mapping between [`ProductKind`] and the store's product type tokens.
//!
//! Only adapters use this table. Nothing above the gateway layer handles raw
//! store strings.

use purchase_kernel_core::ProductKind;

/// Wire token for one-time products.
pub const ONE_TIME_TOKEN: &str = "inapp";
/// Wire token for subscriptions.
pub const SUBSCRIPTION_TOKEN: &str = "subs";

/// Map a kind to its wire token.
pub fn kind_to_wire(kind: ProductKind) -> &'static str {
    match kind {
        ProductKind::OneTime => ONE_TIME_TOKEN,
        ProductKind::Subscription => SUBSCRIPTION_TOKEN,
    }
}

/// Parse a wire token. Stores are inconsistent about case.
pub fn kind_from_wire(token: &str) -> Option<ProductKind> {
    if token.eq_ignore_ascii_case(ONE_TIME_TOKEN) {
        Some(ProductKind::OneTime)
    } else if token.eq_ignore_ascii_case(SUBSCRIPTION_TOKEN) {
        Some(ProductKind::Subscription)
    } else {
        None
    }
}
