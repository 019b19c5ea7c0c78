use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Board;
use crate::backend::SellerStore;
use crate::error::{Result, StoreError};
use crate::events::Table;
use crate::model::{
    Seller, SellerRequest, SellerRequestStatus, SellerStatus, SellerWithProducts,
};
use crate::notify::Notifier;

/// Registered sellers with a lookup of their products.
pub struct SellerBoard {
    store: Arc<dyn SellerStore>,
    status: Option<SellerStatus>,
    rows: Vec<SellerWithProducts>,
}

impl SellerBoard {
    pub async fn load(store: Arc<dyn SellerStore>, status: Option<SellerStatus>) -> Result<Self> {
        let mut board = Self {
            store,
            status,
            rows: Vec::new(),
        };
        board.refresh().await?;
        Ok(board)
    }

    pub fn rows(&self) -> &[SellerWithProducts] {
        &self.rows
    }

    pub async fn set_status_filter(&mut self, status: Option<SellerStatus>) -> Result<()> {
        if self.status != status {
            self.status = status;
            self.refresh().await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(seller_id = %id, status = %status))]
    pub async fn update_status(
        &mut self,
        id: Uuid,
        status: SellerStatus,
        notifier: &dyn Notifier,
    ) -> Result<()> {
        if let Err(err) = self.store.update_seller_status(id, status).await {
            warn!(?err, "seller status update failed");
            notifier.error("Failed to update seller status");
            return Err(err);
        }
        if let Some(row) = self.rows.iter_mut().find(|r| r.seller.id == id) {
            row.seller.status = status;
        }
        notifier.success(&format!("Seller status updated to {}", status));
        Ok(())
    }
}

#[async_trait]
impl Board for SellerBoard {
    fn tables(&self) -> &'static [Table] {
        &[Table::Sellers, Table::Products]
    }

    async fn refresh(&mut self) -> Result<()> {
        self.rows = self.store.list_sellers(self.status).await?;
        Ok(())
    }
}

/// Seller applications, newest first.
pub struct SellerApplications {
    store: Arc<dyn SellerStore>,
    rows: Vec<SellerRequest>,
}

impl SellerApplications {
    pub async fn load(store: Arc<dyn SellerStore>) -> Result<Self> {
        let mut board = Self {
            store,
            rows: Vec::new(),
        };
        board.refresh().await?;
        Ok(board)
    }

    pub fn rows(&self) -> &[SellerRequest] {
        &self.rows
    }

    pub fn pending(&self) -> impl Iterator<Item = &SellerRequest> {
        self.rows
            .iter()
            .filter(|r| r.status == SellerRequestStatus::Pending)
    }

    fn set_local_status(&mut self, id: Uuid, status: SellerRequestStatus) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.status = status;
        }
    }

    /// Creates an active seller from the application, then marks the
    /// application approved. The two writes are not atomic: when the second
    /// one fails the seller row stays.
    #[instrument(skip_all, fields(application_id = %id))]
    pub async fn approve(&mut self, id: Uuid, notifier: &dyn Notifier) -> Result<Seller> {
        let result = self.approve_inner(id).await;
        match &result {
            Ok(seller) => {
                info!(seller_id = %seller.id, "seller account created");
                self.set_local_status(id, SellerRequestStatus::Approved);
                notifier.success("Seller account created successfully");
            }
            Err(err) => {
                warn!(?err, "seller approval failed");
                notifier.error("Failed to approve seller request");
            }
        }
        result
    }

    async fn approve_inner(&self, id: Uuid) -> Result<Seller> {
        let application = self.store.get_seller_request(id).await?;
        if application.status != SellerRequestStatus::Pending {
            return Err(StoreError::Validation(format!(
                "seller request is already {}",
                application.status
            )));
        }
        let seller = self
            .store
            .create_seller(&application.to_active_seller())
            .await?;
        self.store
            .update_seller_request_status(id, SellerRequestStatus::Approved)
            .await?;
        Ok(seller)
    }

    #[instrument(skip_all, fields(application_id = %id))]
    pub async fn reject(&mut self, id: Uuid, notifier: &dyn Notifier) -> Result<()> {
        if let Err(err) = self
            .store
            .update_seller_request_status(id, SellerRequestStatus::Rejected)
            .await
        {
            warn!(?err, "seller rejection failed");
            notifier.error("Failed to reject seller request");
            return Err(err);
        }
        self.set_local_status(id, SellerRequestStatus::Rejected);
        notifier.success("Seller request rejected");
        Ok(())
    }
}

#[async_trait]
impl Board for SellerApplications {
    fn tables(&self) -> &'static [Table] {
        &[Table::SellerRequests]
    }

    async fn refresh(&mut self) -> Result<()> {
        self.rows = self.store.list_seller_requests().await?;
        Ok(())
    }
}
