use serde::Serialize;
use tracing::instrument;

use crate::backend::{ProductStore, RequestStore, SellerStore};
use crate::error::Result;
use crate::model::{
    ProductFilter, ProductStatus, RequestStatus, RequestWithProducts, SellerStatus,
    TransactionKind,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SellerCounts {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub suspended: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProductCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Dashboard counters. Soft-deleted products are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    pub buy_requests: RequestCounts,
    pub donate_requests: RequestCounts,
    pub sellers: SellerCounts,
    pub products: ProductCounts,
}

fn request_counts(rows: &[RequestWithProducts]) -> RequestCounts {
    let count = |s: RequestStatus| rows.iter().filter(|r| r.request.status == s).count();
    RequestCounts {
        total: rows.len(),
        pending: count(RequestStatus::Pending),
        approved: count(RequestStatus::Approved),
        rejected: count(RequestStatus::Rejected),
    }
}

/// The four reads run concurrently; the first failure fails the whole load.
#[instrument(skip_all)]
pub async fn load_stats(
    requests: &dyn RequestStore,
    sellers: &dyn SellerStore,
    products: &dyn ProductStore,
) -> Result<AdminStats> {
    let all_products = ProductFilter::default();
    let (buy, donate, seller_rows, product_rows) = futures::try_join!(
        requests.list_requests(TransactionKind::Buy, None),
        requests.list_requests(TransactionKind::Donate, None),
        sellers.list_sellers(None),
        products.list_products(&all_products),
    )?;

    let seller_count = |s: SellerStatus| seller_rows.iter().filter(|r| r.seller.status == s).count();
    let product_count = |s: ProductStatus| product_rows.iter().filter(|p| p.status == s).count();

    Ok(AdminStats {
        buy_requests: request_counts(&buy),
        donate_requests: request_counts(&donate),
        sellers: SellerCounts {
            total: seller_rows.len(),
            pending: seller_count(SellerStatus::Pending),
            active: seller_count(SellerStatus::Active),
            suspended: seller_count(SellerStatus::Suspended),
        },
        products: ProductCounts {
            total: product_rows.len(),
            active: product_count(ProductStatus::Active),
            inactive: product_count(ProductStatus::Inactive),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::model::{Contact, NewProduct, NewRequest, NewSeller};

    #[tokio::test]
    async fn counts_by_status() {
        let backend = MemoryBackend::new();
        let contact = Contact {
            name: "A".into(),
            email: "a@x.com".into(),
            phone: "1".into(),
        };
        let buy = backend
            .create_request(&NewRequest::pending(TransactionKind::Buy, &contact))
            .await
            .unwrap();
        backend
            .create_request(&NewRequest::pending(TransactionKind::Buy, &contact))
            .await
            .unwrap();
        backend
            .create_request(&NewRequest::pending(TransactionKind::Donate, &contact))
            .await
            .unwrap();
        backend
            .update_request_status(buy.id, RequestStatus::Approved)
            .await
            .unwrap();
        backend
            .create_seller(&NewSeller {
                user_id: None,
                company_name: "Acme".into(),
                contact_name: "R".into(),
                email: "r@acme.test".into(),
                phone: "1".into(),
                status: SellerStatus::Active,
            })
            .await
            .unwrap();
        let product = backend
            .create_product(&NewProduct {
                title: "Beaker".into(),
                description: String::new(),
                price: 10.0,
                category: "Glassware".into(),
                image_url: String::new(),
                seller_id: None,
                status: ProductStatus::Inactive,
                kind: TransactionKind::Buy,
            })
            .await
            .unwrap();

        let stats = load_stats(&backend, &backend, &backend).await.unwrap();
        assert_eq!(
            stats.buy_requests,
            RequestCounts {
                total: 2,
                pending: 1,
                approved: 1,
                rejected: 0
            }
        );
        assert_eq!(stats.donate_requests.total, 1);
        assert_eq!(stats.sellers.active, 1);
        assert_eq!(stats.products.inactive, 1);

        backend.soft_delete_product(product.id).await.unwrap();
        let stats = load_stats(&backend, &backend, &backend).await.unwrap();
        assert_eq!(stats.products.total, 0);

        backend.fail_on(FailPoint::ListProducts).await;
        assert!(load_stats(&backend, &backend, &backend).await.is_err());
    }
}
