use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Board;
use crate::backend::RequestStore;
use crate::error::{Result, StoreError};
use crate::events::Table;
use crate::export::requests_csv;
use crate::model::{RequestStatus, RequestWithProducts, TransactionKind};
use crate::notify::Notifier;

/// Buy or donate requests with their products, newest first.
pub struct RequestBoard {
    store: Arc<dyn RequestStore>,
    kind: TransactionKind,
    status: Option<RequestStatus>,
    rows: Vec<RequestWithProducts>,
}

impl RequestBoard {
    pub async fn load(
        store: Arc<dyn RequestStore>,
        kind: TransactionKind,
        status: Option<RequestStatus>,
    ) -> Result<Self> {
        let mut board = Self {
            store,
            kind,
            status,
            rows: Vec::new(),
        };
        board.refresh().await?;
        Ok(board)
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn rows(&self) -> &[RequestWithProducts] {
        &self.rows
    }

    pub fn find(&self, id: Uuid) -> Option<&RequestWithProducts> {
        self.rows.iter().find(|r| r.request.id == id)
    }

    pub async fn set_status_filter(&mut self, status: Option<RequestStatus>) -> Result<()> {
        if self.status != status {
            self.status = status;
            self.refresh().await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(request_id = %id, status = %status))]
    pub async fn update_status(
        &mut self,
        id: Uuid,
        status: RequestStatus,
        notifier: &dyn Notifier,
    ) -> Result<()> {
        if status == RequestStatus::Pending {
            let err = StoreError::Validation("requests can only be approved or rejected".into());
            notifier.error("Failed to update request status");
            return Err(err);
        }
        if let Err(err) = self.store.update_request_status(id, status).await {
            warn!(?err, "request status update failed");
            notifier.error("Failed to update request status");
            return Err(err);
        }

        if let Some(row) = self.rows.iter_mut().find(|r| r.request.id == id) {
            row.request.status = status;
        }
        info!("request status updated");
        notifier.success(&format!("Request {} successfully", status));
        Ok(())
    }

    pub fn to_csv(&self) -> String {
        requests_csv(&self.rows)
    }
}

#[async_trait]
impl Board for RequestBoard {
    fn tables(&self) -> &'static [Table] {
        &[Table::Requests, Table::RequestProducts]
    }

    async fn refresh(&mut self) -> Result<()> {
        self.rows = self.store.list_requests(self.kind, self.status).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::model::{Contact, NewRequest};
    use crate::notify::{Level, RecordingNotifier};

    async fn seeded() -> (Arc<MemoryBackend>, Uuid) {
        let backend = Arc::new(MemoryBackend::new());
        let contact = Contact {
            name: "A".into(),
            email: "a@x.com".into(),
            phone: "555".into(),
        };
        let req = backend
            .create_request_with_products(&NewRequest::pending(TransactionKind::Buy, &contact), &[])
            .await
            .unwrap();
        backend
            .create_request_with_products(&NewRequest::pending(TransactionKind::Donate, &contact), &[])
            .await
            .unwrap();
        (backend, req.id)
    }

    #[tokio::test]
    async fn board_lists_one_kind_and_updates_locally() {
        let (backend, id) = seeded().await;
        let notes = RecordingNotifier::new();
        let mut board = RequestBoard::load(backend.clone(), TransactionKind::Buy, None)
            .await
            .unwrap();
        assert_eq!(board.rows().len(), 1);

        board
            .update_status(id, RequestStatus::Approved, &notes)
            .await
            .unwrap();
        assert_eq!(board.find(id).unwrap().request.status, RequestStatus::Approved);
        assert_eq!(backend.requests().await[0].status, RequestStatus::Approved);
        assert_eq!(notes.take()[0].message, "Request approved successfully");

        board
            .set_status_filter(Some(RequestStatus::Pending))
            .await
            .unwrap();
        assert!(board.rows().is_empty());
    }

    #[tokio::test]
    async fn failed_update_leaves_rows_untouched() {
        let (backend, id) = seeded().await;
        let notes = RecordingNotifier::new();
        let mut board = RequestBoard::load(backend.clone(), TransactionKind::Buy, None)
            .await
            .unwrap();
        backend.fail_on(FailPoint::UpdateRequest).await;

        assert!(board
            .update_status(id, RequestStatus::Rejected, &notes)
            .await
            .is_err());
        assert_eq!(board.find(id).unwrap().request.status, RequestStatus::Pending);
        let seen = notes.take();
        assert_eq!(seen[0].level, Level::Error);
        assert_eq!(seen[0].message, "Failed to update request status");
    }
}
