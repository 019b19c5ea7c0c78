//! Table change notifications.
//!
//! Backends publish a [`ChangeEvent`] after every successful write; admin
//! boards subscribe and re-fetch when a table they display changes. The feed
//! is independent of how the hosted service delivers its own realtime
//! notifications.
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Requests,
    RequestProducts,
    Sellers,
    SellerRequests,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Requests => "requests",
            Table::RequestProducts => "request_products",
            Table::Sellers => "sellers",
            Table::SellerRequests => "seller_requests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, table: Table, op: ChangeOp) {
        let delivered = self.tx.send(ChangeEvent { table, op }).unwrap_or(0);
        debug!(table = table.as_str(), ?op, delivered, "change published");
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Waits for the next change touching one of `tables`; an empty slice
    /// matches every table. A lagged receiver may have missed a relevant
    /// event, so lag is reported as a synthetic update on the first filtered
    /// table (`Products` when unfiltered). Returns `None` only once the feed
    /// is gone.
    pub async fn next_change(&mut self, tables: &[Table]) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if tables.is_empty() || tables.contains(&event.table) => {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "change subscription lagged");
                    return Some(ChangeEvent {
                        table: tables.first().copied().unwrap_or(Table::Products),
                        op: ChangeOp::Update,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_skips_unrelated_tables() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe();
        feed.publish(Table::Products, ChangeOp::Insert);
        feed.publish(Table::Requests, ChangeOp::Update);

        let event = sub.next_change(&[Table::Requests]).await.unwrap();
        assert_eq!(event.table, Table::Requests);
        assert_eq!(event.op, ChangeOp::Update);
    }

    #[tokio::test]
    async fn closed_feed_ends_subscription() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe();
        drop(feed);
        assert!(sub.next_change(&[Table::Sellers]).await.is_none());
    }

    #[tokio::test]
    async fn lagged_subscription_reports_an_update() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe();
        for _ in 0..FEED_CAPACITY + 1 {
            feed.publish(Table::RequestProducts, ChangeOp::Insert);
        }

        let event = sub.next_change(&[Table::Requests]).await.unwrap();
        assert_eq!(
            event,
            ChangeEvent {
                table: Table::Requests,
                op: ChangeOp::Update
            }
        );
    }

    #[tokio::test]
    async fn unfiltered_subscription_sees_lag_and_every_table() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe();
        for _ in 0..FEED_CAPACITY * 2 {
            feed.publish(Table::Sellers, ChangeOp::Insert);
        }
        let lagged = sub.next_change(&[]).await.unwrap();
        assert_eq!(lagged.op, ChangeOp::Update);

        let next = sub.next_change(&[]).await.unwrap();
        assert_eq!(next.table, Table::Sellers);
        assert_eq!(next.op, ChangeOp::Insert);
        drop(feed);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        ChangeFeed::new().publish(Table::Sellers, ChangeOp::Delete);
    }
}
