//! Buy and donate selection lists and their submission as requests.
//!
//! The store owns two independent ordered lists of products. Submitting a
//! list persists one request plus one link row per entry through
//! [`RequestStore::create_request_with_products`] and clears the list only
//! when that succeeded; on any failure the list is left as it was.
//!
//! The store does not refuse an empty list or de-duplicate entries; the
//! listing and the submission form do that before calling in.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::RequestStore;
use crate::error::Result;
use crate::model::{Contact, NewRequest, Product, Request, TransactionKind};

/// Identifiers handed back after a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedRequest {
    pub id: Uuid,
    pub reference_number: String,
    pub request: Request,
}

pub struct CartStore {
    requests: Arc<dyn RequestStore>,
    buy: Vec<Product>,
    donate: Vec<Product>,
}

impl CartStore {
    pub fn new(requests: Arc<dyn RequestStore>) -> Self {
        Self {
            requests,
            buy: Vec::new(),
            donate: Vec::new(),
        }
    }

    pub fn items(&self, kind: TransactionKind) -> &[Product] {
        match kind {
            TransactionKind::Buy => &self.buy,
            TransactionKind::Donate => &self.donate,
        }
    }

    fn list_mut(&mut self, kind: TransactionKind) -> &mut Vec<Product> {
        match kind {
            TransactionKind::Buy => &mut self.buy,
            TransactionKind::Donate => &mut self.donate,
        }
    }

    pub fn contains(&self, kind: TransactionKind, product_id: Uuid) -> bool {
        self.items(kind).iter().any(|p| p.id == product_id)
    }

    pub fn add(&mut self, kind: TransactionKind, product: Product) {
        self.list_mut(kind).push(product);
    }

    /// Drops the first entry with `product_id`; absent ids are ignored.
    pub fn remove(&mut self, kind: TransactionKind, product_id: Uuid) {
        let list = self.list_mut(kind);
        if let Some(pos) = list.iter().position(|p| p.id == product_id) {
            list.remove(pos);
        }
    }

    pub fn clear(&mut self, kind: TransactionKind) {
        self.list_mut(kind).clear();
    }

    #[instrument(skip_all, fields(kind = %kind, items = self.items(kind).len()))]
    pub async fn submit(
        &mut self,
        kind: TransactionKind,
        contact: &Contact,
    ) -> Result<SubmittedRequest> {
        let product_ids: Vec<Uuid> = self.items(kind).iter().map(|p| p.id).collect();
        let new_request = NewRequest::pending(kind, contact);

        let request = match self
            .requests
            .create_request_with_products(&new_request, &product_ids)
            .await
        {
            Ok(request) => request,
            Err(err) => {
                warn!(?err, "submission failed; keeping list");
                return Err(err);
            }
        };

        self.clear(kind);
        let submitted = SubmittedRequest {
            id: request.id,
            reference_number: request.reference_number(),
            request,
        };
        info!(reference = %submitted.reference_number, "request submitted");
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::model::{ProductStatus, RequestStatus};
    use chrono::Utc;

    fn product(price: f64) -> Product {
        Product {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: format!("item {}", price),
            description: String::new(),
            price,
            category: "Lab".into(),
            image_url: String::new(),
            seller_id: None,
            status: ProductStatus::Active,
            kind: TransactionKind::Buy,
            deleted_at: None,
        }
    }

    fn contact() -> Contact {
        Contact {
            name: "A".into(),
            email: "a@x.com".into(),
            phone: "555".into(),
        }
    }

    #[test]
    fn add_then_remove_restores_list() {
        let mut cart = CartStore::new(Arc::new(MemoryBackend::new()));
        let a = product(100.0);
        let b = product(250.0);
        cart.add(TransactionKind::Buy, a.clone());
        let before = cart.items(TransactionKind::Buy).to_vec();

        cart.add(TransactionKind::Buy, b.clone());
        cart.remove(TransactionKind::Buy, b.id);
        assert_eq!(cart.items(TransactionKind::Buy), before.as_slice());

        cart.remove(TransactionKind::Buy, Uuid::new_v4());
        assert_eq!(cart.items(TransactionKind::Buy), before.as_slice());
        assert!(cart.items(TransactionKind::Donate).is_empty());
    }

    #[test]
    fn remove_only_drops_first_duplicate() {
        let mut cart = CartStore::new(Arc::new(MemoryBackend::new()));
        let a = product(100.0);
        cart.add(TransactionKind::Donate, a.clone());
        cart.add(TransactionKind::Donate, a.clone());
        cart.remove(TransactionKind::Donate, a.id);
        assert_eq!(cart.items(TransactionKind::Donate).len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut cart = CartStore::new(Arc::new(MemoryBackend::new()));
        cart.clear(TransactionKind::Buy);
        assert!(cart.items(TransactionKind::Buy).is_empty());
        cart.add(TransactionKind::Buy, product(1.0));
        cart.add(TransactionKind::Buy, product(2.0));
        cart.clear(TransactionKind::Buy);
        assert!(cart.items(TransactionKind::Buy).is_empty());
    }

    #[tokio::test]
    async fn successful_submit_persists_and_clears() {
        let backend = Arc::new(MemoryBackend::new());
        let mut cart = CartStore::new(backend.clone());
        let p1 = product(100.0);
        let p2 = product(250.0);
        cart.add(TransactionKind::Buy, p1.clone());
        cart.add(TransactionKind::Buy, p2.clone());

        let submitted = cart.submit(TransactionKind::Buy, &contact()).await.unwrap();

        let requests = backend.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, RequestStatus::Pending);
        assert_eq!(requests[0].user_email, "a@x.com");
        let links = backend.request_products().await;
        let linked: Vec<Uuid> = links.iter().map(|l| l.product_id).collect();
        assert_eq!(linked, vec![p1.id, p2.id]);
        assert!(links.iter().all(|l| l.request_id == submitted.id));
        assert!(cart.items(TransactionKind::Buy).is_empty());
        assert!(submitted.reference_number.starts_with("RQ-"));
    }

    #[tokio::test]
    async fn link_failure_keeps_list_and_removes_request() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_on(FailPoint::LinkProducts).await;
        let mut cart = CartStore::new(backend.clone());
        cart.add(TransactionKind::Buy, product(100.0));

        assert!(cart.submit(TransactionKind::Buy, &contact()).await.is_err());
        assert_eq!(cart.items(TransactionKind::Buy).len(), 1);
        assert!(backend.requests().await.is_empty());
    }

    #[tokio::test]
    async fn request_failure_keeps_list() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_on(FailPoint::CreateRequest).await;
        let mut cart = CartStore::new(backend.clone());
        cart.add(TransactionKind::Donate, product(0.0));

        assert!(cart.submit(TransactionKind::Donate, &contact()).await.is_err());
        assert_eq!(cart.items(TransactionKind::Donate).len(), 1);
    }
}
