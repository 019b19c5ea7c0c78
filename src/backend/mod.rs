//! Repository interfaces over the marketplace backend.
//!
//! Workflows only talk to these traits, so they run unchanged against the
//! hosted REST service, the local SQLite store or the in-memory double.

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::events::ChangeFeed;
use crate::model::{
    NewProduct, NewRequest, NewSeller, NewSellerRequest, Product, ProductFilter, ProductStatus,
    Request, RequestProduct, RequestStatus, RequestWithProducts, Seller, SellerRequest,
    SellerRequestStatus, SellerStatus, SellerWithProducts, TransactionKind,
};

pub mod memory;
pub mod rest;
pub mod sqlite;

pub use memory::{FailPoint, MemoryBackend};
pub use rest::RestBackend;
pub use sqlite::SqliteBackend;

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Rows matching `filter`, newest first.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;

    async fn get_product(&self, id: Uuid) -> Result<Product>;

    async fn create_product(&self, product: &NewProduct) -> Result<Product>;

    async fn update_product_status(&self, id: Uuid, status: ProductStatus) -> Result<()>;

    /// Stamps `deleted_at`; the row stays but disappears from listings.
    async fn soft_delete_product(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create_request(&self, request: &NewRequest) -> Result<Request>;

    /// Inserts all link rows in one call. An empty slice is a no-op.
    async fn link_products(&self, links: &[RequestProduct]) -> Result<()>;

    async fn delete_request(&self, id: Uuid) -> Result<()>;

    async fn list_requests(
        &self,
        kind: TransactionKind,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestWithProducts>>;

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<()>;

    /// Creates a request together with its product links.
    ///
    /// The default is a two-phase write: the request row first, then the
    /// links. When the second phase fails the request row is deleted again
    /// and the link error is returned. A failing delete is only logged, which
    /// can leave an orphaned request behind. Backends with real transactions
    /// override this.
    #[instrument(skip_all, fields(kind = %request.kind, items = product_ids.len()))]
    async fn create_request_with_products(
        &self,
        request: &NewRequest,
        product_ids: &[Uuid],
    ) -> Result<Request> {
        let created = self.create_request(request).await?;
        let links: Vec<RequestProduct> = product_ids
            .iter()
            .map(|&product_id| RequestProduct {
                request_id: created.id,
                product_id,
            })
            .collect();

        if let Err(err) = self.link_products(&links).await {
            warn!(?err, request_id = %created.id, "linking products failed; removing request");
            if let Err(cleanup) = self.delete_request(created.id).await {
                error!(?cleanup, request_id = %created.id, "compensating delete failed; request is orphaned");
            }
            return Err(err);
        }

        info!(request_id = %created.id, "request created");
        Ok(created)
    }
}

#[async_trait]
pub trait SellerStore: Send + Sync {
    async fn list_sellers(&self, status: Option<SellerStatus>) -> Result<Vec<SellerWithProducts>>;

    async fn get_seller(&self, id: Uuid) -> Result<Seller>;

    async fn create_seller(&self, seller: &NewSeller) -> Result<Seller>;

    async fn update_seller_status(&self, id: Uuid, status: SellerStatus) -> Result<()>;

    async fn list_seller_requests(&self) -> Result<Vec<SellerRequest>>;

    async fn get_seller_request(&self, id: Uuid) -> Result<SellerRequest>;

    async fn create_seller_request(&self, request: &NewSellerRequest) -> Result<SellerRequest>;

    async fn update_seller_request_status(
        &self,
        id: Uuid,
        status: SellerRequestStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns a publicly resolvable URL.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Everything a full storefront needs from one backend.
pub trait Backend: ProductStore + RequestStore + SellerStore + ObjectStorage {
    fn changes(&self) -> &ChangeFeed;
}
