use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Strategic optimization events
    StrategicRunCompleted {
        run_id: Uuid,
        product_id: Uuid,
        iterations: u32,
        objective_value: f64,
    },
    StrategicRunSkipped {
        product_id: Uuid,
        history_days: usize,
    },
    ParametersActivated {
        product_id: Uuid,
        policy_id: Uuid,
        reorder_point: i32,
        safety_stock: i32,
        order_quantity: i32,
    },

    // Tactical control events
    ReplenishmentOrdered {
        action_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        cost: f64,
        expected_delivery: DateTime<Utc>,
    },
    HeuristicFallbackUsed {
        product_id: Uuid,
        reason: String,
    },
    TacticalCycleCompleted {
        products_processed: usize,
        actions_emitted: usize,
        fallbacks: usize,
    },

    // Coordination events
    ConsistencyDeviation {
        product_id: Uuid,
        tactical_avg_quantity: f64,
        strategic_order_quantity: f64,
        deviation: f64,
    },
    TuningProposed {
        parameter: String,
        current_value: f64,
        proposed_value: f64,
        reason: String,
    },
    CoordinationCompleted {
        flagged_products: usize,
        proposals: usize,
    },

    // Generic event with a message payload
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Define a trait for handling events. Handlers implementing this trait will process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

// Function to process incoming events and log or escalate them as appropriate.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::StrategicRunCompleted {
                run_id,
                product_id,
                iterations,
                objective_value,
            } => {
                if let Err(e) =
                    handle_strategic_run_completed(run_id, product_id, iterations, objective_value)
                        .await
                {
                    error!(
                        "Failed to handle strategic run completion: run_id={}, error={}",
                        run_id, e
                    );
                }
            }
            Event::StrategicRunSkipped {
                product_id,
                history_days,
            } => {
                info!(
                    "Strategic optimization skipped: product={}, history_days={} (insufficient)",
                    product_id, history_days
                );
            }
            Event::ParametersActivated {
                product_id,
                policy_id,
                reorder_point,
                safety_stock,
                order_quantity,
            } => {
                if let Err(e) = handle_parameters_activated(
                    product_id,
                    policy_id,
                    reorder_point,
                    safety_stock,
                    order_quantity,
                )
                .await
                {
                    error!(
                        "Failed to handle parameter activation: product_id={}, error={}",
                        product_id, e
                    );
                }
            }
            Event::ReplenishmentOrdered {
                action_id,
                product_id,
                quantity,
                cost,
                expected_delivery,
            } => {
                if let Err(e) = handle_replenishment_ordered(
                    action_id,
                    product_id,
                    quantity,
                    cost,
                    expected_delivery,
                )
                .await
                {
                    error!(
                        "Failed to handle replenishment order: action_id={}, error={}",
                        action_id, e
                    );
                }
            }
            Event::HeuristicFallbackUsed { product_id, reason } => {
                warn!(
                    "Tactical solver fell back to heuristic policy: product={}, reason={}",
                    product_id, reason
                );
            }
            Event::TacticalCycleCompleted {
                products_processed,
                actions_emitted,
                fallbacks,
            } => {
                info!(
                    "Tactical cycle completed: processed={}, actions={}, fallbacks={}",
                    products_processed, actions_emitted, fallbacks
                );
            }
            Event::ConsistencyDeviation {
                product_id,
                tactical_avg_quantity,
                strategic_order_quantity,
                deviation,
            } => {
                warn!(
                    "Tactical orders deviate from strategic policy: product={}, tactical_avg={:.1}, strategic={:.1}, deviation={:.0}%",
                    product_id,
                    tactical_avg_quantity,
                    strategic_order_quantity,
                    deviation * 100.0
                );
            }
            Event::TuningProposed {
                parameter,
                current_value,
                proposed_value,
                reason,
            } => {
                info!(
                    "Adaptive tuning proposal: {} {} -> {} ({})",
                    parameter, current_value, proposed_value, reason
                );
            }
            Event::CoordinationCompleted {
                flagged_products,
                proposals,
            } => {
                info!(
                    "Coordination cycle completed: flagged={}, proposals={}",
                    flagged_products, proposals
                );
            }
            Event::Generic {
                message,
                timestamp,
                metadata,
            } => {
                info!(
                    "Generic event at {}: {} metadata={:?}",
                    timestamp, message, metadata
                );
            }
        }
    }

    info!("Event processing loop terminated");
}

async fn handle_strategic_run_completed(
    run_id: Uuid,
    product_id: Uuid,
    iterations: u32,
    objective_value: f64,
) -> Result<(), String> {
    info!(
        "Strategic optimization completed: run={}, product={}, iterations={}, objective={:.2}",
        run_id, product_id, iterations, objective_value
    );
    Ok(())
}

async fn handle_parameters_activated(
    product_id: Uuid,
    policy_id: Uuid,
    reorder_point: i32,
    safety_stock: i32,
    order_quantity: i32,
) -> Result<(), String> {
    info!(
        "Replenishment parameters activated: product={}, policy={}, ROP={}, SS={}, OQ={}",
        product_id, policy_id, reorder_point, safety_stock, order_quantity
    );
    Ok(())
}

async fn handle_replenishment_ordered(
    action_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    cost: f64,
    expected_delivery: DateTime<Utc>,
) -> Result<(), String> {
    info!(
        "Replenishment order placed: action={}, product={}, quantity={}, cost={:.2}, delivery={}",
        action_id, product_id, quantity, cost, expected_delivery
    );

    if quantity > 10_000 {
        warn!(
            "Unusually large replenishment order: product {} ordered {} units",
            product_id, quantity
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        let product_id = Uuid::new_v4();
        sender
            .send(Event::StrategicRunSkipped {
                product_id,
                history_days: 12,
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::StrategicRunSkipped {
                product_id: got,
                history_days,
            }) => {
                assert_eq!(got, product_id);
                assert_eq!(history_days, 12);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::with_data("orphan".to_string())).await;
        assert!(result.is_err());
    }

    #[test]
    fn events_serialize_round_trip() {
        let event = Event::TuningProposed {
            parameter: "prediction_horizon".to_string(),
            current_value: 7.0,
            proposed_value: 8.0,
            reason: "service level below target".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::TuningProposed { parameter, .. } => {
                assert_eq!(parameter, "prediction_horizon");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
