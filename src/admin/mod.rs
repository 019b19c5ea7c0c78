//! Back-office boards.
//!
//! Each board holds the rows it last fetched plus its filters. Status changes
//! go to the backend first and are then applied to the local rows without a
//! re-fetch; [`follow`] re-fetches when the change feed reports a write to one
//! of the board's tables.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::events::{Subscription, Table};

pub mod catalog;
pub mod requests;
pub mod sellers;
pub mod stats;

pub use catalog::{add_product, upload_image, ProductCatalog, ProductDraft, MAX_IMAGE_BYTES};
pub use requests::RequestBoard;
pub use sellers::{SellerApplications, SellerBoard};
pub use stats::{load_stats, AdminStats};

#[async_trait]
pub trait Board: Send {
    /// Tables whose changes make this board stale.
    fn tables(&self) -> &'static [Table];

    async fn refresh(&mut self) -> Result<()>;
}

/// Waits for the next relevant change and re-fetches the board.
/// Returns `Ok(false)` once the feed has closed.
pub async fn follow<B: Board + ?Sized>(board: &mut B, sub: &mut Subscription) -> Result<bool> {
    match sub.next_change(board.tables()).await {
        Some(change) => {
            debug!(table = change.table.as_str(), op = ?change.op, "board stale; refreshing");
            board.refresh().await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
