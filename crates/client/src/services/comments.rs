//! Product comments.

use komorebi_core::{CommentRecord, ProductId, UserId};
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::gateway::{NewComment, RemoteGateway};

/// Maximum comment length, in characters.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Reading and posting comments.
pub struct CommentService<'a, G> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway> CommentService<'a, G> {
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Comments on a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns the gateway error.
    pub async fn comments_for(&self, product: &ProductId) -> Result<Vec<CommentRecord>> {
        let mut comments = self
            .gateway
            .fetch_comments(std::slice::from_ref(product))
            .await?;
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    /// Post a comment as `author`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BadRequest` for blank or overlong text.
    #[instrument(skip(self, text))]
    pub async fn post_comment(
        &self,
        author: &UserId,
        product: &ProductId,
        text: &str,
    ) -> Result<CommentRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::BadRequest("comment cannot be empty".to_string()));
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(ClientError::BadRequest(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        let record = self
            .gateway
            .insert_comment(NewComment {
                author_id: author.clone(),
                product_id: product.clone(),
                text: text.to_owned(),
            })
            .await?;
        tracing::info!(comment_id = %record.id, "Posted comment");
        Ok(record)
    }
}
