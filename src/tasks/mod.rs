//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is in use.
//!
//! # Tasks
//! - Garbage collection: removes unobserved entries whose `gc_time` has elapsed

mod gc;

pub use gc::{spawn_gc_task, MIN_GC_INTERVAL};
