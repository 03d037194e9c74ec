//! Session lifecycle: `Unauthenticated -> Authenticated -> RoomPending -> InRoom`.
//!
//! [`SessionStateMachine`] is the pure transition logic. [`SessionDriver`]
//! owns it together with the content bridge and surface, and serializes every
//! input (UI commands, API replies, bridge messages, navigation) through one
//! command loop.

pub mod driver;
pub mod machine;

pub use driver::{SessionCommand, SessionDriver, SessionEvent, SessionHandle};
pub use machine::{
    Completion, PendingRoomOp, RoomAction, SessionPhase, SessionState, SessionStateMachine,
};
