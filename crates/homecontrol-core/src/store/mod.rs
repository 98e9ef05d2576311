// ── Device state and subscriptions ──
//
// Concurrent device storage plus the callback registry that fans out
// applied changes.

mod property_store;
mod publisher;

pub use property_store::PropertyStore;
pub use publisher::{Callback, Message, Publisher};
