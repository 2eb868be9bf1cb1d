//! Queue module: schema, lease manager, queue handle and scoped reads.
//!
//! Layering, leaf to root:
//! - `schema`: table layout and statements
//! - `lease`: synchronous lease/ack/change_lease, one transaction each
//! - `handle`: async `Queue` bound to a name
//! - `scoped`: ack-on-success / release-on-failure wrappers and `Drain`

mod handle;
mod lease;
mod schema;
mod scoped;

pub use handle::Queue;
pub use lease::LeaseManager;
pub use schema::{Schema, TABLE};
pub use scoped::{Drain, LeaseGuard};
