//! Storefront product grid state.
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::ProductStore;
use crate::cart::CartStore;
use crate::error::{Result, StoreError};
use crate::model::{Product, ProductFilter, ProductStatus, TransactionKind};
use crate::notify::Notifier;

/// Active products of one kind, optionally narrowed to a category and capped
/// at a row limit. Every setter re-fetches when its value actually changed.
pub struct ProductListing {
    store: Arc<dyn ProductStore>,
    kind: TransactionKind,
    category: Option<String>,
    limit: Option<usize>,
    products: Vec<Product>,
    categories: Vec<String>,
}

impl ProductListing {
    /// Builds the listing and performs the first fetch.
    pub async fn load(
        store: Arc<dyn ProductStore>,
        kind: TransactionKind,
        limit: Option<usize>,
    ) -> Self {
        let mut listing = Self {
            store,
            kind,
            category: None,
            limit,
            products: Vec::new(),
            categories: Vec::new(),
        };
        listing.refresh().await;
        listing
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Sorted distinct categories of the rows currently shown.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    fn filter(&self) -> ProductFilter {
        ProductFilter {
            kind: Some(self.kind),
            status: Some(ProductStatus::Active),
            category: self.category.clone(),
            seller_id: None,
            limit: self.limit,
        }
    }

    /// A failed read leaves the grid empty instead of surfacing an error.
    #[instrument(skip_all, fields(kind = %self.kind, category = ?self.category))]
    pub async fn refresh(&mut self) {
        match self.store.list_products(&self.filter()).await {
            Ok(rows) => {
                let distinct: BTreeSet<String> = rows.iter().map(|p| p.category.clone()).collect();
                self.categories = distinct.into_iter().collect();
                self.products = rows;
                debug!(rows = self.products.len(), "listing refreshed");
            }
            Err(err) => {
                warn!(?err, "product fetch failed; showing empty listing");
                self.products.clear();
                self.categories.clear();
            }
        }
    }

    pub async fn set_kind(&mut self, kind: TransactionKind) {
        if self.kind != kind {
            self.kind = kind;
            self.refresh().await;
        }
    }

    pub async fn set_limit(&mut self, limit: Option<usize>) {
        if self.limit != limit {
            self.limit = limit;
            self.refresh().await;
        }
    }

    pub async fn select_category(&mut self, category: Option<String>) {
        if self.category != category {
            self.category = category;
            self.refresh().await;
        }
    }

    pub fn is_selected(&self, cart: &CartStore, product_id: Uuid) -> bool {
        cart.contains(self.kind, product_id)
    }

    /// Adds or removes `product` from the cart list of this listing's kind.
    /// Returns whether the product is selected afterwards.
    pub fn toggle(&self, cart: &mut CartStore, product: &Product) -> bool {
        if self.is_selected(cart, product.id) {
            cart.remove(self.kind, product.id);
            false
        } else {
            cart.add(self.kind, product.clone());
            true
        }
    }
}

/// Product detail "add" action: puts the product into the list matching its
/// own kind unless it is already there.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn add_to_cart_by_id(
    store: &dyn ProductStore,
    cart: &mut CartStore,
    notifier: &dyn Notifier,
    id: Uuid,
) -> Result<Product> {
    let product = store.get_product(id).await?;
    let kind = product.kind;

    if cart.contains(kind, product.id) {
        let message = match kind {
            TransactionKind::Buy => "Product already in cart",
            TransactionKind::Donate => "Product already in donation list",
        };
        notifier.error(message);
        return Err(StoreError::Validation(message.to_string()));
    }

    cart.add(kind, product.clone());
    notifier.success(match kind {
        TransactionKind::Buy => "Added to buy cart",
        TransactionKind::Donate => "Added to donation list",
    });
    Ok(product)
}
