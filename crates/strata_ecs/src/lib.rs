//! # STRATA ECS Storage Engine
//!
//! Entity storage for simulations that mutate in batches:
//! - Sorted structure-of-arrays pools keyed by 32-bit ids
//! - Insert/remove requests queued from any thread
//! - One maintenance call per frame applies them all at once
//!
//! ## Architecture Rules
//!
//! 1. **Readers never see a half-applied frame** - Mutation only happens in
//!    `maintenance()`, which takes `&mut self`
//! 2. **Ids stay sorted** - Lookups are binary searches, iteration is in id order
//! 3. **Changes are observable for one frame** - Inserted offsets and removed
//!    rows from the last maintenance call stay readable until the next one
//!
//! ## Example
//!
//! ```rust
//! use strata_ecs::{DataPool, IdAllocator, IdGroup};
//!
//! let ids = IdAllocator::new(IdGroup::default());
//! let mut positions = DataPool::<([f32; 3],)>::new();
//!
//! let player = ids.generate_id()?;
//! positions.insert(player, ([0.0, 1.0, 0.0],));
//! positions.maintenance()?;
//!
//! assert!(positions.exists(player));
//! assert_eq!(positions.inserted(), 1);
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod id;
pub mod pool;

pub use config::PoolConfig;
pub use error::{EcsError, EcsResult};
pub use id::{Id, IdAllocator, IdGroup, IndexSnapshot, LiveIds, NameMap};
pub use pool::{Columns, ComponentPool, DataPool, Destructor, EntityList, PoolSender};
