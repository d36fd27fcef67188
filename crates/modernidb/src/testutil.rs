//! Shared fixtures for unit tests.

use crate::{Factory, IndexParams, ModernIdb, SchemaDescriptor, StoreParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Widget {
    pub id: String,
    pub qty: u32,
    pub tags: Vec<String>,
}

pub(crate) fn widget(id: &str, qty: u32, tags: &[&str]) -> Widget {
    Widget {
        id: id.to_owned(),
        qty,
        tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
    }
}

pub(crate) fn schema() -> SchemaDescriptor {
    SchemaDescriptor::builder()
        .store::<Widget>("widgets")
        .index("by_qty")
        .index("by_tag")
        .store::<Value>("orders")
        .build()
}

/// "inventory" at version 1, open: `widgets` keyed by `id` with `by_qty`
/// and a multi-entry `by_tag`, and an auto-increment `orders` store.
pub(crate) fn widgets_db() -> (Factory, ModernIdb) {
    let factory = Factory::in_memory();
    let db = ModernIdb::builder(&factory, "inventory")
        .schema(schema())
        .on_init(|ctx| {
            let widgets = ctx
                .manager
                .create_object_store::<Widget>("widgets", StoreParams::new().key_path("id"))?;
            widgets.create_index("by_qty", "qty", IndexParams::new())?;
            widgets.create_index("by_tag", "tags", IndexParams::new().multi_entry(true))?;
            ctx.manager
                .create_object_store::<Value>("orders", StoreParams::new().auto_increment(true))?;
            Ok(())
        })
        .build()
        .unwrap();
    db.open().unwrap();
    (factory, db)
}
