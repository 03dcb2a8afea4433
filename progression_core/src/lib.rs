//! # Progression Core
//!
//! The runtime of the narrative progression engine. This crate interfaces
//! with `dialogue_graph`, walks authored graphs as per-session state
//! machines, and keeps the surrounding guarantees honest: bounded resources,
//! exactly-once reward delivery, and a session that can always reach an
//! ending.
//!
//! ## Core Components
//!
//! - **session**: The dialogue state machine with backstory digressions,
//!   loop guarding, and forced progression repair
//! - **events**: The synchronous, fault-isolating event bus every component
//!   publishes on
//! - **rewards**: The idempotent progression guard for critical rewards
//! - **economy**: Bounded resources with momentum and threshold semantics
//! - **engine**: The facade wiring all of the above onto one bus per save
//!
//! ## Design Philosophy
//!
//! - **Event-Driven**: Components never call each other's effects directly;
//!   persistence, inventory, and rendering react to bus events
//! - **Fail-Loud, Recover-Quietly**: Every error is reported on the bus
//!   before it is returned, and blocked sessions self-repair rather than
//!   deadlock
//! - **Idempotent at the Edges**: Reward delivery tolerates repeated calls
//!   from every call site that might race a completion

pub mod economy;
pub mod engine;
pub mod error;
pub mod events;
pub mod rewards;
pub mod session;

pub use economy::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use rewards::*;
pub use session::*;
