//! # Pools
//!
//! Sorted structure-of-arrays storage with deferred, batched mutation.
//!
//! Two front ends share one maintenance core:
//! - [`DataPool`] - compile-time typed, any tuple of 1 to 8 component types
//! - [`ComponentPool`] - one runtime-sized element of raw bytes, with an
//!   optional destructor callback
//!
//! ## Maintenance
//!
//! ```text
//!          ┌───────────────┐   remove pass   ┌───────────────┐
//! remove ─►│ remove queue  ├────────────────►│ removed store │─► dropped next call
//!          └───────────────┘        │        └───────────────┘
//!                                   ▼
//!                           ┌───────────────┐
//!                           │ primary store │  ids strictly ascending
//!                           └───────────────┘
//!                                   ▲
//!          ┌───────────────┐        │
//! insert ─►│ insert queue  ├────────┘ insert pass (sort, keep last, merge)
//!          └───────────────┘
//! ```

mod columns;
mod component_pool;
mod data_pool;
mod entity_list;
mod store;

pub use columns::Columns;
pub use component_pool::{ComponentPool, Destructor, INSERT_CAPACITY_STEP};
pub use data_pool::{DataPool, PoolSender};
pub use entity_list::EntityList;
