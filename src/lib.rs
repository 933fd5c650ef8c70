//! Incremental generational GC core for embedding in a tagged-pointer host
//! runtime.
//!
//! The host is a single-image interpreter whose values are tagged machine
//! words. This crate replaces part of a legacy stop-the-world mark-sweep
//! discipline with a generational collector for two homogeneous object
//! kinds (cons cells, symbols), built on top of a general-purpose memory
//! pool manager contract (the [`mpm`] module) rather than any one
//! concrete allocator. Other object kinds remain with the host's legacy
//! mark-sweep heap during the transition period; see [`legacy`].
//!
//! Start with [`arena::Arena::init`].

pub mod alloc;
pub mod arena;
pub mod config;
pub mod error;
pub mod finalize;
pub mod format;
pub mod forwarding;
pub mod hooks;
pub mod legacy;
pub mod logging;
pub mod mpm;
pub mod parking;
pub mod pool;
pub mod roots;
pub mod scanners;
pub mod stats;
pub mod tag;
pub mod threads;
pub mod value;

pub use arena::Arena;
pub use config::{GenerationDesc, IgcConfig};
pub use error::{IgcError, Result};
pub use roots::RootId;
pub use threads::ThreadId;
pub use value::{Cons, Symbol, SymbolRedirect, Tag, TaggedRef};
