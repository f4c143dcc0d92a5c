use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published by the services. Delivery is fire-and-forget:
/// losing an event never fails the operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // Cart events
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartItemUpdated {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemsRemoved {
        user_id: Uuid,
    },

    // Coupon events
    CouponCreated(Uuid),
    CouponRedeemed {
        code: String,
    },
    CouponDeactivated {
        code: String,
    },
    CouponDeleted(Uuid),
    RewardCouponIssued {
        user_id: Uuid,
        code: String,
    },

    // Checkout / order events
    CardSessionCreated {
        session_id: String,
    },
    WalletRequestCreated {
        payment_id: String,
    },
    OrderCreated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Event dropped: {}", err);
        }
    }
}

/// Creates an event channel pair with the given capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains incoming events, logging each one. Embedders that react to events
/// (webhooks, projections) replace this loop with their own consumer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::RewardCouponIssued { user_id, code } => {
                info!(user_id = %user_id, code = %code, "Reward coupon issued");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(8);
        sender
            .send(Event::OrderCreated(Uuid::nil()))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        // must not panic or error
        sender.send_or_log(Event::ProductDeleted(Uuid::nil())).await;
    }
}
