//! Catalog products, categories and seller listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, ProductId, UserId};

/// A product offered on the marketplace.
///
/// Owned by the remote store; the client never mutates a product in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Seller label shown on product cards.
    pub vendor: String,
    /// Account that listed the product, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<UserId>,
    /// Unit price.
    pub price: Price,
    /// Public URL of the primary image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Category slug.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// URL-safe identifier, referenced by [`Product::category`].
    pub slug: String,
    /// Human-readable name.
    pub name: String,
}

/// Errors that can occur when validating a [`ListingDraft`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// The product name is empty.
    #[error("listing name cannot be empty")]
    EmptyName,
    /// The product name is too long.
    #[error("listing name must be at most {max} characters")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The price is zero or negative.
    #[error("listing price must be positive (got {0})")]
    NonPositivePrice(i64),
    /// No category was given.
    #[error("listing category cannot be empty")]
    EmptyCategory,
}

/// A validated product listing awaiting publication by a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    name: String,
    price: Price,
    category: String,
    description: Option<String>,
}

impl ListingDraft {
    /// Maximum length of a listing name, in characters.
    pub const MAX_NAME_CHARS: usize = 120;

    /// Validate and build a listing draft.
    ///
    /// # Errors
    ///
    /// Returns a [`ListingError`] if the name is empty or too long, the price
    /// is not positive, or the category is empty.
    pub fn new(
        name: &str,
        price: Price,
        category: &str,
        description: Option<String>,
    ) -> Result<Self, ListingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListingError::EmptyName);
        }
        if name.chars().count() > Self::MAX_NAME_CHARS {
            return Err(ListingError::NameTooLong {
                max: Self::MAX_NAME_CHARS,
            });
        }
        if price.amount <= 0 {
            return Err(ListingError::NonPositivePrice(price.amount));
        }
        let category = category.trim();
        if category.is_empty() {
            return Err(ListingError::EmptyCategory);
        }

        Ok(Self {
            name: name.to_owned(),
            price,
            category: category.to_owned(),
            description: description.filter(|d| !d.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CurrencyCode;

    fn yen(amount: i64) -> Price {
        Price::new(amount, CurrencyCode::JPY)
    }

    #[test]
    fn test_listing_trims_and_accepts() {
        let draft = ListingDraft::new("  Matcha KitKat ", yen(450), "sweets", None);
        assert!(draft.is_ok());
        assert_eq!(draft.map(|d| d.name().to_owned()).ok().as_deref(), Some("Matcha KitKat"));
    }

    #[test]
    fn test_listing_rejects_invalid() {
        assert_eq!(
            ListingDraft::new(" ", yen(100), "sweets", None),
            Err(ListingError::EmptyName)
        );
        assert_eq!(
            ListingDraft::new("Senbei", yen(0), "savory", None),
            Err(ListingError::NonPositivePrice(0))
        );
        assert_eq!(
            ListingDraft::new("Senbei", yen(300), "", None),
            Err(ListingError::EmptyCategory)
        );
        assert!(matches!(
            ListingDraft::new(&"x".repeat(121), yen(300), "savory", None),
            Err(ListingError::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_blank_description_is_dropped() {
        let draft = ListingDraft::new("Pocky", yen(200), "sweets", Some("  ".to_string()));
        assert_eq!(draft.ok().and_then(|d| d.description().map(str::to_owned)), None);
    }
}
