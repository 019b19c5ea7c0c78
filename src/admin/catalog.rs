use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Board;
use crate::backend::{ObjectStorage, ProductStore};
use crate::error::{Result, StoreError};
use crate::events::Table;
use crate::model::{NewProduct, Product, ProductFilter, ProductStatus, TransactionKind};
use crate::notify::Notifier;

pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Product catalog for the back-office: every non-deleted product matching the
/// filter, whatever its status.
pub struct ProductCatalog {
    store: Arc<dyn ProductStore>,
    filter: ProductFilter,
    rows: Vec<Product>,
}

impl ProductCatalog {
    pub async fn load(store: Arc<dyn ProductStore>, filter: ProductFilter) -> Result<Self> {
        let mut catalog = Self {
            store,
            filter,
            rows: Vec::new(),
        };
        catalog.refresh().await?;
        Ok(catalog)
    }

    pub fn rows(&self) -> &[Product] {
        &self.rows
    }

    pub async fn set_filter(&mut self, filter: ProductFilter) -> Result<()> {
        if self.filter != filter {
            self.filter = filter;
            self.refresh().await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(product_id = %id, status = %status))]
    pub async fn update_status(
        &mut self,
        id: Uuid,
        status: ProductStatus,
        notifier: &dyn Notifier,
    ) -> Result<()> {
        if let Err(err) = self.store.update_product_status(id, status).await {
            warn!(?err, "product status update failed");
            notifier.error("Failed to update product status");
            return Err(err);
        }
        if let Some(row) = self.rows.iter_mut().find(|p| p.id == id) {
            row.status = status;
        }
        notifier.success(&format!("Product status updated to {}", status));
        Ok(())
    }

    /// Soft delete; the row leaves the catalog immediately.
    #[instrument(skip_all, fields(product_id = %id))]
    pub async fn delete(&mut self, id: Uuid, notifier: &dyn Notifier) -> Result<()> {
        if let Err(err) = self.store.soft_delete_product(id).await {
            warn!(?err, "product delete failed");
            notifier.error("Failed to delete product");
            return Err(err);
        }
        self.rows.retain(|p| p.id != id);
        notifier.success("Product deleted successfully");
        Ok(())
    }
}

#[async_trait]
impl Board for ProductCatalog {
    fn tables(&self) -> &'static [Table] {
        &[Table::Products]
    }

    async fn refresh(&mut self) -> Result<()> {
        self.rows = self.store.list_products(&self.filter).await?;
        Ok(())
    }
}

/// Fields of the "add product" form.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub kind: TransactionKind,
}

fn image_content_type(path: &Path) -> Option<(&'static str, String)> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => return None,
    };
    Some((content_type, ext))
}

/// `None` when the file is larger than [`MAX_IMAGE_BYTES`].
async fn read_limited(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > MAX_IMAGE_BYTES {
        return Ok(None);
    }
    tokio::fs::read(path).await.map(Some)
}

/// Uploads an image file under a fresh `<uuid>.<ext>` key and returns its
/// public URL. Only image types up to [`MAX_IMAGE_BYTES`] are accepted.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn upload_image(
    storage: &dyn ObjectStorage,
    path: &Path,
    notifier: &dyn Notifier,
) -> Result<String> {
    let Some((content_type, ext)) = image_content_type(path) else {
        notifier.error("Please upload an image file");
        return Err(StoreError::Validation(format!(
            "{} is not an image file",
            path.display()
        )));
    };

    let bytes = match read_limited(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            notifier.error("Image size should be less than 5MB");
            return Err(StoreError::Validation("image exceeds 5MB".into()));
        }
        Err(err) => {
            warn!(?err, "image read failed");
            notifier.error("Failed to upload image");
            return Err(StoreError::Validation(format!(
                "cannot read {}: {}",
                path.display(),
                err
            )));
        }
    };

    let key = format!("{}.{}", Uuid::new_v4(), ext);
    match storage.upload(&key, bytes, content_type).await {
        Ok(url) => {
            info!(%key, "image uploaded");
            notifier.success("Image uploaded successfully");
            Ok(url)
        }
        Err(err) => {
            warn!(?err, "image upload failed");
            notifier.error("Failed to upload image");
            Err(err)
        }
    }
}

/// Inserts an admin-created product. It starts `pending` and belongs to no
/// seller.
#[instrument(skip_all, fields(title = %draft.title))]
pub async fn add_product(
    store: &dyn ProductStore,
    draft: &ProductDraft,
    image_url: Option<String>,
    notifier: &dyn Notifier,
) -> Result<Product> {
    let invalid = if draft.title.trim().is_empty() {
        Some("title is required")
    } else if draft.category.trim().is_empty() {
        Some("category is required")
    } else if !draft.price.is_finite() || draft.price < 0.0 {
        Some("price must be a non-negative number")
    } else {
        None
    };
    if let Some(msg) = invalid {
        notifier.error(msg);
        return Err(StoreError::Validation(msg.to_string()));
    }

    let new = NewProduct {
        title: draft.title.trim().to_string(),
        description: draft.description.trim().to_string(),
        price: draft.price,
        category: draft.category.trim().to_string(),
        image_url: image_url.unwrap_or_default(),
        seller_id: None,
        status: ProductStatus::Pending,
        kind: draft.kind,
    };
    match store.create_product(&new).await {
        Ok(product) => {
            info!(product_id = %product.id, "product added");
            notifier.success("Product added successfully");
            Ok(product)
        }
        Err(err) => {
            warn!(?err, "product insert failed");
            notifier.error("Failed to add product");
            Err(err)
        }
    }
}
