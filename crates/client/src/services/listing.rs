//! Sell flow: upload a product image and publish a listing.

use komorebi_core::{ListingDraft, Product, UserId};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ClientError, Result, add_breadcrumb};
use crate::gateway::{NewProduct, RemoteGateway};

/// Public bucket holding product images.
pub const IMAGE_BUCKET: &str = "product-images";

/// Largest accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// An image attached to a new listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingImage {
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: String,
}

impl ListingImage {
    /// Guess the content type from a file extension.
    #[must_use]
    pub fn from_path_bytes(path: &std::path::Path, bytes: Vec<u8>) -> Self {
        let content_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "application/octet-stream",
        };
        Self {
            bytes,
            content_type: content_type.to_string(),
        }
    }

    fn extension(&self) -> Option<&'static str> {
        match self.content_type.as_str() {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            _ => None,
        }
    }
}

/// Publishes listings for a seller.
pub struct ListingService<'a, G> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway> ListingService<'a, G> {
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Upload the image (if any) and insert the product with `seller` as its
    /// owner. The vendor label is the seller's display name.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BadRequest` for an empty, oversized or
    /// non-image upload, and the gateway error if any remote step fails.
    #[instrument(skip(self, draft, image), fields(name = draft.name()))]
    pub async fn create_listing(
        &self,
        seller: &UserId,
        draft: &ListingDraft,
        image: Option<ListingImage>,
    ) -> Result<Product> {
        let image_url = match image {
            Some(image) => Some(self.upload_image(seller, image).await?),
            None => None,
        };

        let vendor = self
            .gateway
            .fetch_profiles(std::slice::from_ref(seller))
            .await?
            .into_iter()
            .next()
            .map_or_else(|| seller.to_string(), |p| p.display_name);

        let product = self
            .gateway
            .insert_product(NewProduct {
                name: draft.name().to_owned(),
                vendor,
                seller_id: seller.clone(),
                price: draft.price(),
                image_url,
                category: draft.category().to_owned(),
                description: draft.description().map(str::to_owned),
            })
            .await?;

        tracing::info!(product_id = %product.id, "Published listing");
        add_breadcrumb("sell", "Published listing", Some(&[("product_id", product.id.as_str())]));
        Ok(product)
    }

    async fn upload_image(&self, seller: &UserId, image: ListingImage) -> Result<String> {
        if image.bytes.is_empty() {
            return Err(ClientError::BadRequest("image is empty".to_string()));
        }
        if image.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ClientError::BadRequest(format!(
                "image must be at most {MAX_IMAGE_BYTES} bytes"
            )));
        }
        let Some(extension) = image.extension() else {
            return Err(ClientError::BadRequest(format!(
                "unsupported image type {}",
                image.content_type
            )));
        };

        let path = format!("{seller}/{}.{extension}", Uuid::new_v4());
        self.gateway.ensure_bucket(IMAGE_BUCKET).await?;
        self.gateway
            .upload_object(IMAGE_BUCKET, &path, image.bytes, &image.content_type)
            .await?;
        Ok(self.gateway.public_url(IMAGE_BUCKET, &path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use komorebi_core::{CurrencyCode, Price, Profile};

    use super::*;
    use crate::gateway::InMemoryGateway;

    fn draft() -> ListingDraft {
        ListingDraft::new(
            "Black Sesame Senbei",
            Price::new(450, CurrencyCode::JPY),
            "savory",
            Some("Baked in Kyoto".to_string()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_listing_with_image() {
        let gateway = InMemoryGateway::new();
        let seller = UserId::new("seller-1");
        gateway.seed_profile(Profile {
            user_id: seller.clone(),
            display_name: "Hana".to_string(),
            avatar_url: None,
            bio: None,
        });

        let image = ListingImage::from_path_bytes(Path::new("senbei.PNG"), vec![0x89, 0x50]);
        let product = ListingService::new(&gateway)
            .create_listing(&seller, &draft(), Some(image))
            .await
            .unwrap();

        assert_eq!(product.vendor, "Hana");
        assert_eq!(product.seller_id.as_ref(), Some(&seller));
        let url = product.image_url.unwrap();
        let path = url.strip_prefix("memory://product-images/").unwrap();
        assert!(path.starts_with("seller-1/"));
        assert!(path.ends_with(".png"));
        assert_eq!(gateway.object(IMAGE_BUCKET, path), Some(vec![0x89, 0x50]));
        assert_eq!(gateway.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_image() {
        let gateway = InMemoryGateway::new();
        let image = ListingImage::from_path_bytes(Path::new("notes.txt"), vec![1]);
        let result = ListingService::new(&gateway)
            .create_listing(&UserId::new("s"), &draft(), Some(image))
            .await;
        assert!(matches!(result, Err(ClientError::BadRequest(_))));
        assert!(gateway.list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_without_image() {
        let gateway = InMemoryGateway::new();
        let product = ListingService::new(&gateway)
            .create_listing(&UserId::new("s"), &draft(), None)
            .await
            .unwrap();
        assert!(product.image_url.is_none());
        assert_eq!(product.vendor, "s");
        assert_eq!(product.description.as_deref(), Some("Baked in Kyoto"));
    }
}
