//! Derived cart amounts.
//!
//! Every function here is a pure function of the cart items and the pricing
//! policy. Nothing is cached; callers recompute on every read.

use komorebi_core::Price;
use serde::Serialize;

use crate::cart::CartItem;
use crate::config::PricingPolicy;

/// All derived amounts of a cart at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of quantities.
    pub item_count: u32,
    pub subtotal: Price,
    pub shipping: Price,
    pub tax: Price,
    /// `subtotal + shipping + tax`.
    pub total: Price,
}

/// Sum of quantities across all items.
#[must_use]
pub fn item_count(items: &[CartItem]) -> u32 {
    items
        .iter()
        .fold(0_u32, |acc, item| acc.saturating_add(item.quantity))
}

/// Sum of unit price times quantity.
#[must_use]
pub fn subtotal(items: &[CartItem], policy: &PricingPolicy) -> Price {
    items.iter().fold(Price::zero(policy.currency), |acc, item| {
        acc + item.product.price.times(item.quantity)
    })
}

/// Flat fee below the free-shipping threshold; nothing for an empty cart.
#[must_use]
pub fn shipping(subtotal: Price, policy: &PricingPolicy) -> Price {
    if subtotal.amount > 0 && subtotal.amount < policy.free_shipping_threshold {
        Price::new(policy.shipping_fee, subtotal.currency_code)
    } else {
        Price::zero(subtotal.currency_code)
    }
}

/// Tax on the subtotal, rounded toward zero.
#[must_use]
pub fn tax(subtotal: Price, policy: &PricingPolicy) -> Price {
    subtotal.apply_rate(policy.tax_rate)
}

/// Compute every derived amount.
#[must_use]
pub fn totals(items: &[CartItem], policy: &PricingPolicy) -> CartTotals {
    let subtotal = subtotal(items, policy);
    let shipping = shipping(subtotal, policy);
    let tax = tax(subtotal, policy);
    CartTotals {
        item_count: item_count(items),
        subtotal,
        shipping,
        tax,
        total: subtotal + shipping + tax,
    }
}
