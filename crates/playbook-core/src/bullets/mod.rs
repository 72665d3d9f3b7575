//! Bullet entities and the canonical bullet store.

mod store;
mod types;

pub use store::BulletStore;
pub use types::{Bullet, BulletId};
