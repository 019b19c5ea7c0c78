use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use labmart::backend::{FailPoint, MemoryBackend, RequestStore};
use labmart::cart::CartStore;
use labmart::listing::ProductListing;
use labmart::model::{
    Contact, NewRequest, Product, ProductStatus, Request, RequestProduct, RequestStatus,
    RequestWithProducts, TransactionKind,
};
use labmart::notify::{Level, RecordingNotifier};
use labmart::submission::submit_request;
use labmart::StoreError;

fn product(title: &str, kind: TransactionKind, category: &str, price: f64, age_min: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        created_at: Utc::now() - Duration::minutes(age_min),
        title: title.into(),
        description: String::new(),
        price,
        category: category.into(),
        image_url: String::new(),
        seller_id: None,
        status: ProductStatus::Active,
        kind,
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

#[tokio::test]
async fn two_item_buy_submission() {
    let backend = Arc::new(MemoryBackend::new());
    let p1 = product("p1", TransactionKind::Buy, "Lab", 100.0, 2);
    let p2 = product("p2", TransactionKind::Buy, "Lab", 250.0, 1);
    let mut cart = CartStore::new(backend.clone());
    cart.add(TransactionKind::Buy, p1.clone());
    cart.add(TransactionKind::Buy, p2.clone());

    let notes = RecordingNotifier::new();
    let confirmation = submit_request(&mut cart, TransactionKind::Buy, &contact(), &notes)
        .await
        .unwrap();

    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, RequestStatus::Pending);
    assert_eq!(requests[0].kind, TransactionKind::Buy);
    let links = backend.request_products().await;
    assert_eq!(
        links,
        vec![
            RequestProduct {
                request_id: requests[0].id,
                product_id: p1.id
            },
            RequestProduct {
                request_id: requests[0].id,
                product_id: p2.id
            },
        ]
    );
    assert!(cart.items(TransactionKind::Buy).is_empty());

    assert_eq!(confirmation.request_id, requests[0].id);
    assert_eq!(confirmation.items.len(), 2);
    assert_eq!(confirmation.items[1].price, Some(250.0));
    assert!(confirmation.render_text().contains("Quote Request Confirmation"));
    let seen = notes.take();
    assert_eq!(seen[0].level, Level::Success);
    assert_eq!(seen[0].message, "Quote request submitted successfully");
}

#[tokio::test]
async fn donation_snapshot_has_no_prices() {
    let backend = Arc::new(MemoryBackend::new());
    let mut cart = CartStore::new(backend.clone());
    cart.add(
        TransactionKind::Donate,
        product("Gloves", TransactionKind::Donate, "Hygiene", 0.0, 1),
    );
    let notes = RecordingNotifier::new();
    let confirmation = submit_request(&mut cart, TransactionKind::Donate, &contact(), &notes)
        .await
        .unwrap();
    assert_eq!(confirmation.items[0].price, None);
    assert_eq!(notes.take()[0].message, "Donation request submitted successfully");
}

#[tokio::test]
async fn phase_two_failure_keeps_cart_and_leaves_no_request() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_on(FailPoint::LinkProducts).await;
    let mut cart = CartStore::new(backend.clone());
    cart.add(
        TransactionKind::Buy,
        product("p1", TransactionKind::Buy, "Lab", 100.0, 1),
    );
    let before = cart.items(TransactionKind::Buy).to_vec();

    let notes = RecordingNotifier::new();
    let err = submit_request(&mut cart, TransactionKind::Buy, &contact(), &notes)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert_eq!(cart.items(TransactionKind::Buy), before.as_slice());
    assert!(backend.requests().await.is_empty());
    assert_eq!(notes.take()[0].message, "Failed to submit request");

    // Once the backend recovers the same cart goes through.
    backend.clear_failures().await;
    submit_request(&mut cart, TransactionKind::Buy, &contact(), &notes)
        .await
        .unwrap();
    assert_eq!(backend.requests().await.len(), 1);
}

#[tokio::test]
async fn donate_listing_narrows_by_category() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .seed_product(product("Soap", TransactionKind::Donate, "Hygiene", 0.0, 1))
        .await;
    backend
        .seed_product(product("Masks", TransactionKind::Donate, "Hygiene", 0.0, 2))
        .await;
    backend
        .seed_product(product("Textbook", TransactionKind::Donate, "Books", 0.0, 3))
        .await;
    backend
        .seed_product(product("Microscope", TransactionKind::Buy, "Optics", 900.0, 4))
        .await;
    let mut inactive = product("Old kit", TransactionKind::Donate, "Kits", 0.0, 5);
    inactive.status = ProductStatus::Inactive;
    backend.seed_product(inactive).await;

    let mut listing = ProductListing::load(backend.clone(), TransactionKind::Donate, None).await;
    assert_eq!(listing.products().len(), 3);
    assert!(listing
        .products()
        .iter()
        .all(|p| p.kind == TransactionKind::Donate && p.status == ProductStatus::Active));
    let all_categories = listing.categories().to_vec();
    assert_eq!(all_categories, vec!["Books", "Hygiene"]);

    listing.select_category(Some("Hygiene".into())).await;
    let titles: Vec<&str> = listing.products().iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Soap", "Masks"]);
    assert!(listing
        .categories()
        .iter()
        .all(|c| all_categories.contains(c)));
}

/// Records every call and fails `link_products`, so the default two-phase
/// submission can be observed from outside.
#[derive(Default)]
struct ScriptedRequests {
    calls: Mutex<Vec<String>>,
    fail_delete: bool,
}

#[async_trait]
impl RequestStore for ScriptedRequests {
    async fn create_request(&self, request: &NewRequest) -> labmart::Result<Request> {
        self.calls.lock().await.push("create".into());
        Ok(Request {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_name: request.user_name.clone(),
            user_email: request.user_email.clone(),
            user_phone: request.user_phone.clone(),
            status: request.status,
            kind: request.kind,
            notes: None,
        })
    }

    async fn link_products(&self, links: &[RequestProduct]) -> labmart::Result<()> {
        self.calls.lock().await.push(format!("link {}", links.len()));
        Err(StoreError::Persistence("link rejected".into()))
    }

    async fn delete_request(&self, _id: Uuid) -> labmart::Result<()> {
        self.calls.lock().await.push("delete".into());
        if self.fail_delete {
            return Err(StoreError::Persistence("delete rejected".into()));
        }
        Ok(())
    }

    async fn list_requests(
        &self,
        _kind: TransactionKind,
        _status: Option<RequestStatus>,
    ) -> labmart::Result<Vec<RequestWithProducts>> {
        Ok(Vec::new())
    }

    async fn update_request_status(&self, _id: Uuid, _status: RequestStatus) -> labmart::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn compensation_runs_after_link_failure() {
    for fail_delete in [false, true] {
        let store = Arc::new(ScriptedRequests {
            fail_delete,
            ..Default::default()
        });
        let mut cart = CartStore::new(store.clone());
        cart.add(
            TransactionKind::Buy,
            product("p1", TransactionKind::Buy, "Lab", 1.0, 1),
        );
        cart.add(
            TransactionKind::Buy,
            product("p2", TransactionKind::Buy, "Lab", 2.0, 1),
        );

        let err = cart.submit(TransactionKind::Buy, &contact()).await.unwrap_err();
        // The link error is what surfaces, even when the cleanup also failed.
        assert!(matches!(err, StoreError::Persistence(msg) if msg == "link rejected"));
        assert_eq!(
            *store.calls.lock().await,
            vec!["create".to_string(), "link 2".to_string(), "delete".to_string()]
        );
        assert_eq!(cart.items(TransactionKind::Buy).len(), 2);
    }
}
