//! Client-side reconciliation state machines.
//!
//! Pure state, no I/O: the embedding client (web, mobile, tests) feeds in
//! server events and clock readings and acts on the returned effects.

pub mod outbox;
pub mod reactions;
pub mod session;

pub use outbox::{LocalMessage, Outbox, Reconciliation, SendState};
pub use reactions::{PendingReactions, RolledBack, REACTION_TIMEOUT};
pub use session::{ClientSession, Subscription, TypingDebouncer, TYPING_IDLE};
