use evbus::event::{EventEnvelope, IntegrationEvent};
use evbus_macros::integration_event;

#[integration_event(kind = "inventory.changed")]
#[serde(tag = "type")]
enum InventoryChanged {
    Reserved { sku: String, quantity: u32 },
    Released { sku: String },
}

fn main() {
    assert_eq!(InventoryChanged::KIND, "inventory.changed");

    let envelope = EventEnvelope::wrap(&InventoryChanged::Released { sku: "A-1".into() }).unwrap();
    assert_eq!(envelope.kind(), "inventory.changed");
    let back: InventoryChanged = envelope.decode().unwrap();
    assert!(matches!(back, InventoryChanged::Released { .. }));
}
