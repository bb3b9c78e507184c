use forecast_core::StockUpdate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Latest update per symbol (snapshot for new subscribers)
pub type UpdateCache = Arc<RwLock<HashMap<String, StockUpdate>>>;

/// Fan-out of live update events.
///
/// Every receiver sees every symbol's events; transports filter by symbol
/// for their own subscribers. Slow receivers lag and drop old events rather
/// than stall the scheduler.
pub struct UpdateBroadcast {
    updates: broadcast::Sender<StockUpdate>,
    latest: UpdateCache,
}

impl UpdateBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            updates,
            latest: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StockUpdate> {
        self.updates.subscribe()
    }

    /// Update the cache and broadcast. Returns the number of receivers
    /// the event reached.
    pub async fn publish(&self, update: StockUpdate) -> usize {
        {
            let mut cache = self.latest.write().await;
            cache.insert(update.symbol.clone(), update.clone());
        }
        // No receivers is not an error; the cache still holds the event.
        self.updates.send(update).unwrap_or(0)
    }

    pub async fn latest(&self, symbol: &str) -> Option<StockUpdate> {
        self.latest.read().await.get(symbol).cloned()
    }

    pub async fn forget(&self, symbol: &str) {
        self.latest.write().await.remove(symbol);
    }
}

impl Default for UpdateBroadcast {
    fn default() -> Self {
        Self::new(2048)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn update(symbol: &str, price: f64) -> StockUpdate {
        StockUpdate {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            price,
            change: 0.0,
            predictions: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_receiver_and_cache() {
        let publisher = UpdateBroadcast::default();
        let mut rx = publisher.subscribe();

        assert_eq!(publisher.publish(update("AAPL", 190.0)).await, 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.symbol, "AAPL");

        publisher.publish(update("AAPL", 191.0)).await;
        assert_eq!(publisher.latest("AAPL").await.unwrap().price, 191.0);
        assert!(publisher.latest("MSFT").await.is_none());

        publisher.forget("AAPL").await;
        assert!(publisher.latest("AAPL").await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_receivers() {
        let publisher = UpdateBroadcast::new(4);
        assert_eq!(publisher.publish(update("TSLA", 250.0)).await, 0);
        assert!(publisher.latest("TSLA").await.is_some());
    }
}
