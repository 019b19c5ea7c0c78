//! In-process backend used by tests and demos.
//!
//! Holds every table in memory and can be told to fail specific operations,
//! which is how the compensation path of request submission is exercised.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Backend, ObjectStorage, ProductStore, RequestStore, SellerStore};
use crate::error::{Result, StoreError};
use crate::events::{ChangeFeed, ChangeOp, Table};
use crate::model::{
    NewProduct, NewRequest, NewSeller, NewSellerRequest, Product, ProductFilter, ProductStatus,
    ProductSummary, Request, RequestProduct, RequestStatus, RequestWithProducts, Seller,
    SellerRequest, SellerRequestStatus, SellerStatus, SellerWithProducts, TransactionKind,
};

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ListProducts,
    CreateRequest,
    LinkProducts,
    DeleteRequest,
    UpdateRequest,
    CreateSeller,
    UpdateSellerRequest,
    Upload,
}

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    requests: Vec<Request>,
    request_products: Vec<RequestProduct>,
    sellers: Vec<Seller>,
    seller_requests: Vec<SellerRequest>,
    objects: Vec<(String, String)>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    failures: Mutex<HashSet<FailPoint>>,
    changes: ChangeFeed,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call of `point` fails until [`Self::clear_failures`].
    pub async fn fail_on(&self, point: FailPoint) {
        self.failures.lock().await.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    async fn check(&self, point: FailPoint) -> Result<()> {
        if self.failures.lock().await.contains(&point) {
            return Err(StoreError::Persistence(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    /// Inserts a fully formed product, bypassing `create_product` defaults.
    pub async fn seed_product(&self, product: Product) {
        self.tables.lock().await.products.push(product);
    }

    pub async fn seed_seller_request(&self, request: SellerRequest) {
        self.tables.lock().await.seller_requests.push(request);
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.tables.lock().await.requests.clone()
    }

    pub async fn request_products(&self) -> Vec<RequestProduct> {
        self.tables.lock().await.request_products.clone()
    }

    pub async fn sellers(&self) -> Vec<Seller> {
        self.tables.lock().await.sellers.clone()
    }

    pub async fn objects(&self) -> Vec<(String, String)> {
        self.tables.lock().await.objects.clone()
    }
}

/// Newest first, with later insertions winning ties.
fn newest_first<T>(rows: &mut Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<Utc>) {
    rows.reverse();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl ProductStore for MemoryBackend {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.check(FailPoint::ListProducts).await?;
        let tables = self.tables.lock().await;
        let mut rows: Vec<Product> = tables
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        newest_first(&mut rows, |p| p.created_at);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn get_product(&self, id: Uuid) -> Result<Product> {
        let tables = self.tables.lock().await;
        tables
            .products
            .iter()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let row = Product {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: product.price,
            category: product.category.clone(),
            image_url: product.image_url.clone(),
            seller_id: product.seller_id,
            status: product.status,
            kind: product.kind,
            deleted_at: None,
        };
        self.tables.lock().await.products.push(row.clone());
        self.changes.publish(Table::Products, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_product_status(&self, id: Uuid, status: ProductStatus) -> Result<()> {
        {
            let mut tables = self.tables.lock().await;
            let row = tables
                .products
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::not_found("product", id))?;
            row.status = status;
        }
        self.changes.publish(Table::Products, ChangeOp::Update);
        Ok(())
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<()> {
        {
            let mut tables = self.tables.lock().await;
            let row = tables
                .products
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::not_found("product", id))?;
            row.deleted_at = Some(Utc::now());
        }
        self.changes.publish(Table::Products, ChangeOp::Update);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryBackend {
    async fn create_request(&self, request: &NewRequest) -> Result<Request> {
        self.check(FailPoint::CreateRequest).await?;
        let row = Request {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_name: request.user_name.clone(),
            user_email: request.user_email.clone(),
            user_phone: request.user_phone.clone(),
            status: request.status,
            kind: request.kind,
            notes: None,
        };
        self.tables.lock().await.requests.push(row.clone());
        self.changes.publish(Table::Requests, ChangeOp::Insert);
        Ok(row)
    }

    async fn link_products(&self, links: &[RequestProduct]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        self.check(FailPoint::LinkProducts).await?;
        self.tables
            .lock()
            .await
            .request_products
            .extend_from_slice(links);
        self.changes.publish(Table::RequestProducts, ChangeOp::Insert);
        Ok(())
    }

    async fn delete_request(&self, id: Uuid) -> Result<()> {
        self.check(FailPoint::DeleteRequest).await?;
        {
            let mut tables = self.tables.lock().await;
            tables.requests.retain(|r| r.id != id);
            tables.request_products.retain(|l| l.request_id != id);
        }
        self.changes.publish(Table::Requests, ChangeOp::Delete);
        Ok(())
    }

    async fn list_requests(
        &self,
        kind: TransactionKind,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestWithProducts>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Request> = tables
            .requests
            .iter()
            .filter(|r| r.kind == kind && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| r.created_at);

        Ok(rows
            .into_iter()
            .map(|request| {
                let products = tables
                    .request_products
                    .iter()
                    .filter(|l| l.request_id == request.id)
                    .filter_map(|l| tables.products.iter().find(|p| p.id == l.product_id))
                    .cloned()
                    .collect();
                RequestWithProducts { request, products }
            })
            .collect())
    }

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<()> {
        self.check(FailPoint::UpdateRequest).await?;
        {
            let mut tables = self.tables.lock().await;
            let row = tables
                .requests
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::not_found("request", id))?;
            row.status = status;
        }
        self.changes.publish(Table::Requests, ChangeOp::Update);
        Ok(())
    }
}

#[async_trait]
impl SellerStore for MemoryBackend {
    async fn list_sellers(&self, status: Option<SellerStatus>) -> Result<Vec<SellerWithProducts>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Seller> = tables
            .sellers
            .iter()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        newest_first(&mut rows, |s| s.created_at);

        Ok(rows
            .into_iter()
            .map(|seller| {
                let products = tables
                    .products
                    .iter()
                    .filter(|p| p.seller_id == Some(seller.id))
                    .map(ProductSummary::from)
                    .collect();
                SellerWithProducts { seller, products }
            })
            .collect())
    }

    async fn get_seller(&self, id: Uuid) -> Result<Seller> {
        let tables = self.tables.lock().await;
        tables
            .sellers
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("seller", id))
    }

    async fn create_seller(&self, seller: &NewSeller) -> Result<Seller> {
        self.check(FailPoint::CreateSeller).await?;
        let row = Seller {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_id: seller.user_id,
            company_name: seller.company_name.clone(),
            contact_name: seller.contact_name.clone(),
            email: seller.email.clone(),
            phone: seller.phone.clone(),
            status: seller.status,
        };
        self.tables.lock().await.sellers.push(row.clone());
        self.changes.publish(Table::Sellers, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_seller_status(&self, id: Uuid, status: SellerStatus) -> Result<()> {
        {
            let mut tables = self.tables.lock().await;
            let row = tables
                .sellers
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| StoreError::not_found("seller", id))?;
            row.status = status;
        }
        self.changes.publish(Table::Sellers, ChangeOp::Update);
        Ok(())
    }

    async fn list_seller_requests(&self) -> Result<Vec<SellerRequest>> {
        let mut rows = self.tables.lock().await.seller_requests.clone();
        newest_first(&mut rows, |r| r.created_at);
        Ok(rows)
    }

    async fn get_seller_request(&self, id: Uuid) -> Result<SellerRequest> {
        let tables = self.tables.lock().await;
        tables
            .seller_requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("seller request", id))
    }

    async fn create_seller_request(&self, request: &NewSellerRequest) -> Result<SellerRequest> {
        let row = SellerRequest {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            company_name: request.company_name.clone(),
            contact_name: request.contact_name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            business_description: request.business_description.clone(),
            product_categories: request.product_categories.clone(),
            status: SellerRequestStatus::Pending,
        };
        self.tables.lock().await.seller_requests.push(row.clone());
        self.changes.publish(Table::SellerRequests, ChangeOp::Insert);
        Ok(row)
    }

    async fn update_seller_request_status(
        &self,
        id: Uuid,
        status: SellerRequestStatus,
    ) -> Result<()> {
        self.check(FailPoint::UpdateSellerRequest).await?;
        {
            let mut tables = self.tables.lock().await;
            let row = tables
                .seller_requests
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::not_found("seller request", id))?;
            row.status = status;
        }
        self.changes.publish(Table::SellerRequests, ChangeOp::Update);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(&self, key: &str, _bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.check(FailPoint::Upload).await?;
        self.tables
            .lock()
            .await
            .objects
            .push((key.to_string(), content_type.to_string()));
        Ok(format!("memory://objects/{}", key))
    }
}

impl Backend for MemoryBackend {
    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Contact;

    fn contact() -> Contact {
        Contact {
            name: "A".into(),
            email: "a@x.com".into(),
            phone: "555".into(),
        }
    }

    #[tokio::test]
    async fn two_phase_write_compensates_on_link_failure() {
        let backend = MemoryBackend::new();
        backend.fail_on(FailPoint::LinkProducts).await;

        let req = NewRequest::pending(TransactionKind::Buy, &contact());
        let err = backend
            .create_request_with_products(&req, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(backend.requests().await.is_empty());
    }

    #[tokio::test]
    async fn failed_compensation_leaves_orphan_and_returns_link_error() {
        let backend = MemoryBackend::new();
        backend.fail_on(FailPoint::LinkProducts).await;
        backend.fail_on(FailPoint::DeleteRequest).await;

        let req = NewRequest::pending(TransactionKind::Donate, &contact());
        let err = backend
            .create_request_with_products(&req, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("LinkProducts"));
        assert_eq!(backend.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get_product(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
