use evbus::event::IntegrationEvent;
use evbus_macros::integration_event;

#[integration_event]
struct OrderCreated {
    order_id: String,
    total_cents: u64,
}

fn main() {
    assert_eq!(OrderCreated::KIND, "OrderCreated");

    let event = OrderCreated {
        order_id: "o-1".into(),
        total_cents: 1200,
    };
    let cloned = event.clone();
    let json = serde_json::to_value(&cloned).unwrap();
    assert_eq!(json["order_id"], "o-1");
    let _ = format!("{event:?}");
}
