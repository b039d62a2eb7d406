use evbus::event::IntegrationEvent;
use evbus_macros::integration_event;
use serde::{Deserialize, Serialize};

#[integration_event(kind = "orders.updated")]
#[derive(PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderUpdated {
    order_id: String,
    status_code: u8,
}

fn main() {
    assert_eq!(OrderUpdated::KIND, "orders.updated");

    let event: OrderUpdated =
        serde_json::from_str(r#"{"orderId":"o-2","statusCode":3}"#).unwrap();
    assert_eq!(
        event,
        OrderUpdated {
            order_id: "o-2".into(),
            status_code: 3,
        }
    );
}
