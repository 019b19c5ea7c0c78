//! Repository traits over the local SQLite store.
//!
//! Uploaded objects are written below a directory on disk and addressed with
//! `file://` URLs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{Backend, ObjectStorage, ProductStore, RequestStore, SellerStore};
use crate::config::Config;
use crate::db::{self, Pool};
use crate::error::{Result, StoreError};
use crate::events::{ChangeFeed, ChangeOp, Table};
use crate::model::{
    NewProduct, NewRequest, NewSeller, NewSellerRequest, Product, ProductFilter, ProductStatus,
    Request, RequestProduct, RequestStatus, RequestWithProducts, Seller, SellerRequest,
    SellerRequestStatus, SellerStatus, SellerWithProducts, TransactionKind,
};

pub struct SqliteBackend {
    pool: Pool,
    objects_dir: PathBuf,
    changes: ChangeFeed,
}

impl SqliteBackend {
    pub fn new(pool: Pool, objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            objects_dir: objects_dir.into(),
            changes: ChangeFeed::new(),
        }
    }

    /// Opens (and migrates) the database named by the configuration.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let pool = db::init_pool(&cfg.database_url()).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool, Path::new(&cfg.app.data_dir).join("objects")))
    }

    /// Fresh migrated in-memory database, mainly for tests.
    pub async fn in_memory(objects_dir: impl Into<PathBuf>) -> Result<Self> {
        let pool = db::init_pool("sqlite::memory:").await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool, objects_dir))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl ProductStore for SqliteBackend {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        db::list_products(&self.pool, filter).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Product> {
        db::get_product(&self.pool, id).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let row = db::insert_product(&self.pool, product).await?;
        self.changes.publish(Table::Products, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_product_status(&self, id: Uuid, status: ProductStatus) -> Result<()> {
        db::set_product_status(&self.pool, id, status).await?;
        self.changes.publish(Table::Products, ChangeOp::Update);
        Ok(())
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<()> {
        db::soft_delete_product(&self.pool, id).await?;
        self.changes.publish(Table::Products, ChangeOp::Update);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for SqliteBackend {
    async fn create_request(&self, request: &NewRequest) -> Result<Request> {
        let row = db::insert_request(&self.pool, request).await?;
        self.changes.publish(Table::Requests, ChangeOp::Insert);
        Ok(row)
    }

    async fn link_products(&self, links: &[RequestProduct]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        db::insert_links(&self.pool, links).await?;
        self.changes.publish(Table::RequestProducts, ChangeOp::Insert);
        Ok(())
    }

    async fn delete_request(&self, id: Uuid) -> Result<()> {
        db::delete_request(&self.pool, id).await?;
        self.changes.publish(Table::Requests, ChangeOp::Delete);
        Ok(())
    }

    async fn list_requests(
        &self,
        kind: TransactionKind,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestWithProducts>> {
        db::list_requests(&self.pool, kind, status).await
    }

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<()> {
        db::set_request_status(&self.pool, id, status).await?;
        self.changes.publish(Table::Requests, ChangeOp::Update);
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %request.kind, items = product_ids.len()))]
    async fn create_request_with_products(
        &self,
        request: &NewRequest,
        product_ids: &[Uuid],
    ) -> Result<Request> {
        let row = db::insert_request_with_products(&self.pool, request, product_ids).await?;
        self.changes.publish(Table::Requests, ChangeOp::Insert);
        if !product_ids.is_empty() {
            self.changes.publish(Table::RequestProducts, ChangeOp::Insert);
        }
        info!(request_id = %row.id, "request created");
        Ok(row)
    }
}

#[async_trait]
impl SellerStore for SqliteBackend {
    async fn list_sellers(&self, status: Option<SellerStatus>) -> Result<Vec<SellerWithProducts>> {
        db::list_sellers(&self.pool, status).await
    }

    async fn get_seller(&self, id: Uuid) -> Result<Seller> {
        db::get_seller(&self.pool, id).await
    }

    async fn create_seller(&self, seller: &NewSeller) -> Result<Seller> {
        let row = db::insert_seller(&self.pool, seller).await?;
        self.changes.publish(Table::Sellers, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_seller_status(&self, id: Uuid, status: SellerStatus) -> Result<()> {
        db::set_seller_status(&self.pool, id, status).await?;
        self.changes.publish(Table::Sellers, ChangeOp::Update);
        Ok(())
    }

    async fn list_seller_requests(&self) -> Result<Vec<SellerRequest>> {
        db::list_seller_requests(&self.pool).await
    }

    async fn get_seller_request(&self, id: Uuid) -> Result<SellerRequest> {
        db::get_seller_request(&self.pool, id).await
    }

    async fn create_seller_request(&self, request: &NewSellerRequest) -> Result<SellerRequest> {
        let row = db::insert_seller_request(&self.pool, request).await?;
        self.changes.publish(Table::SellerRequests, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_seller_request_status(
        &self,
        id: Uuid,
        status: SellerRequestStatus,
    ) -> Result<()> {
        db::set_seller_request_status(&self.pool, id, status).await?;
        self.changes.publish(Table::SellerRequests, ChangeOp::Update);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for SqliteBackend {
    #[instrument(skip_all, fields(key = %key, size = bytes.len()))]
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(StoreError::Validation(format!("invalid object key {:?}", key)));
        }
        let io_err = |e: std::io::Error| StoreError::Persistence(format!("object write failed: {}", e));
        tokio::fs::create_dir_all(&self.objects_dir)
            .await
            .map_err(io_err)?;
        let path = self.objects_dir.join(key);
        tokio::fs::write(&path, bytes).await.map_err(io_err)?;
        let absolute = tokio::fs::canonicalize(&path).await.map_err(io_err)?;
        Ok(format!("file://{}", absolute.display()))
    }
}

impl Backend for SqliteBackend {
    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeEvent;

    #[tokio::test]
    async fn transactional_submit_publishes_changes() {
        let td = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::in_memory(td.path()).await.unwrap();
        let mut sub = backend.changes().subscribe();

        let request = NewRequest {
            user_name: "A".into(),
            user_email: "a@x.com".into(),
            user_phone: "1".into(),
            kind: TransactionKind::Donate,
            status: RequestStatus::Pending,
        };
        let err = backend
            .create_request_with_products(&request, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(backend
            .list_requests(TransactionKind::Donate, None)
            .await
            .unwrap()
            .is_empty());

        backend.create_request_with_products(&request, &[]).await.unwrap();
        let change = sub.next_change(&[Table::Requests]).await;
        assert_eq!(
            change,
            Some(ChangeEvent {
                table: Table::Requests,
                op: ChangeOp::Insert
            })
        );
    }

    #[tokio::test]
    async fn upload_writes_under_objects_dir() {
        let td = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::in_memory(td.path().join("objects")).await.unwrap();
        let url = backend
            .upload("abc.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("abc.png"));
        assert_eq!(std::fs::read(td.path().join("objects/abc.png")).unwrap(), vec![1, 2, 3]);

        let err = backend.upload("../x.png", vec![], "image/png").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
