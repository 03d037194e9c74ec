use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::CredentialStore;
use crate::error::{AppError, Result};
use crate::models::{ApiResponse, Credential, RoomId, RoomSession, Username};
use crate::security::{clean_room_input, generate_room_code};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomAction {
    Create,
    Join,
}

/// An in-flight create/join. `id` ties the eventual reply to this attempt.
#[derive(Clone)]
pub struct PendingRoomOp {
    pub id: Uuid,
    pub action: RoomAction,
    pub room_id: RoomId,
    pub username: Username,
    pub token: String,
}

impl fmt::Debug for PendingRoomOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRoomOp")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("room_id", &self.room_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        credential: Credential,
    },
    RoomPending {
        credential: Credential,
        op: PendingRoomOp,
    },
    InRoom {
        credential: Credential,
        session: RoomSession,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticated,
    RoomPending,
    InRoom,
}

impl SessionPhase {
    fn label(self) -> &'static str {
        match self {
            SessionPhase::Unauthenticated => "unauthenticated",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::RoomPending => "room_pending",
            SessionPhase::InRoom => "in_room",
        }
    }
}

/// Result of feeding an API reply back into the machine.
#[derive(Debug)]
pub enum Completion {
    Entered(RoomSession),
    Reverted(AppError),
    /// The reply belongs to an operation the machine has moved past.
    Stale,
}

/// Owns the credential and the current room session, and decides every
/// transition between them.
pub struct SessionStateMachine {
    state: SessionState,
    store: Arc<dyn CredentialStore>,
}

impl SessionStateMachine {
    /// Start from whatever the store holds: `Authenticated` when a complete
    /// credential is persisted, `Unauthenticated` otherwise.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Self {
        let state = match store.load() {
            Ok(Some(credential)) => {
                tracing::info!(username = %credential.username, "Restored saved credential");
                SessionState::Authenticated { credential }
            }
            Ok(None) => SessionState::Unauthenticated,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential store");
                SessionState::Unauthenticated
            }
        };

        Self { state, store }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionState::Authenticated { .. } => SessionPhase::Authenticated,
            SessionState::RoomPending { .. } => SessionPhase::RoomPending,
            SessionState::InRoom { .. } => SessionPhase::InRoom,
        }
    }

    /// Room id input and create/join triggers are usable except while a
    /// request is in flight.
    pub fn controls_enabled(&self) -> bool {
        self.phase() != SessionPhase::RoomPending
    }

    pub fn credential(&self) -> Option<&Credential> {
        match &self.state {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { credential }
            | SessionState::RoomPending { credential, .. }
            | SessionState::InRoom { credential, .. } => Some(credential),
        }
    }

    pub fn room_session(&self) -> Option<&RoomSession> {
        match &self.state {
            SessionState::InRoom { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingRoomOp> {
        match &self.state {
            SessionState::RoomPending { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Auth callback from the entry surface.
    ///
    /// A failed save is logged and the in-memory transition still happens;
    /// the user is simply asked to sign in again next launch.
    pub fn on_auth_success(&mut self, username: &str, token: &str) -> Result<()> {
        self.expect_phase(SessionPhase::Unauthenticated, "complete sign-in")?;

        let credential = Credential::from_auth_callback(username, token)?;
        if let Err(e) = self.store.save(&credential) {
            tracing::warn!(error = %e, "Could not persist credential");
        }

        tracing::info!(username = %credential.username, "Signed in");
        self.state = SessionState::Authenticated { credential };
        Ok(())
    }

    /// Pick up a credential the store gained since startup. Returns whether
    /// the machine is now authenticated.
    pub fn reload_from_store(&mut self) -> bool {
        if let SessionState::Unauthenticated = self.state {
            if let Ok(Some(credential)) = self.store.load() {
                self.state = SessionState::Authenticated { credential };
            }
        }
        self.phase() != SessionPhase::Unauthenticated
    }

    /// `Authenticated -> RoomPending` for a create. An empty room input gets a
    /// generated code.
    pub fn begin_create(&mut self, raw_room_id: &str) -> Result<PendingRoomOp> {
        self.begin(RoomAction::Create, raw_room_id)
    }

    /// `Authenticated -> RoomPending` for a join. The room input is required.
    pub fn begin_join(&mut self, raw_room_id: &str) -> Result<PendingRoomOp> {
        self.begin(RoomAction::Join, raw_room_id)
    }

    fn begin(&mut self, action: RoomAction, raw_room_id: &str) -> Result<PendingRoomOp> {
        let action_label = match action {
            RoomAction::Create => "create a room",
            RoomAction::Join => "join a room",
        };
        self.expect_phase(SessionPhase::Authenticated, action_label)?;
        let credential = match &self.state {
            SessionState::Authenticated { credential } => credential.clone(),
            _ => return Err(self.invalid_state(action_label)),
        };

        let cleaned = clean_room_input(raw_room_id);
        let room_id = if cleaned.is_empty() && action == RoomAction::Create {
            generate_room_code()
        } else if cleaned.is_empty() {
            return Err(AppError::Validation(
                "Enter a valid 4-letter room code (A-Z)".to_string(),
            ));
        } else {
            RoomId::parse(&cleaned)?
        };
        let username = Username::from_untrusted(&credential.username)?;

        let op = PendingRoomOp {
            id: Uuid::new_v4(),
            action,
            room_id,
            username,
            token: credential.token.clone(),
        };

        tracing::debug!(op_id = %op.id, room_id = %op.room_id, ?action, "Room request pending");
        self.state = SessionState::RoomPending {
            credential,
            op: op.clone(),
        };
        Ok(op)
    }

    /// Feed the outcome of operation `op_id` back in.
    ///
    /// Only the operation the machine is waiting for can move it; anything
    /// else is reported as [`Completion::Stale`] and changes nothing.
    pub fn complete(&mut self, op_id: Uuid, outcome: Result<ApiResponse>) -> Completion {
        let is_current = matches!(&self.state, SessionState::RoomPending { op, .. } if op.id == op_id);
        if !is_current {
            tracing::debug!(op_id = %op_id, "Discarding stale room reply");
            return Completion::Stale;
        }

        let (credential, op) =
            match std::mem::replace(&mut self.state, SessionState::Unauthenticated) {
                SessionState::RoomPending { credential, op } => (credential, op),
                other => {
                    self.state = other;
                    return Completion::Stale;
                }
            };

        match outcome.and_then(|reply| authoritative_room_id(&op, &reply)) {
            Ok(room_id) => {
                let session = RoomSession::new(
                    room_id,
                    op.username,
                    credential.token.clone(),
                    op.action == RoomAction::Create,
                );
                tracing::info!(
                    room_id = %session.room_id(),
                    is_host = session.is_host(),
                    "Entered room"
                );
                self.state = SessionState::InRoom {
                    credential,
                    session: session.clone(),
                };
                Completion::Entered(session)
            }
            Err(e) => {
                tracing::info!(error = %e, "Room request failed");
                self.state = SessionState::Authenticated { credential };
                Completion::Reverted(e)
            }
        }
    }

    /// `InRoom -> Authenticated`. The session is dropped; its room id is
    /// returned for reporting.
    pub fn leave(&mut self) -> Result<RoomId> {
        self.expect_phase(SessionPhase::InRoom, "leave a room")?;
        match std::mem::replace(&mut self.state, SessionState::Unauthenticated) {
            SessionState::InRoom {
                credential,
                session,
            } => {
                self.state = SessionState::Authenticated { credential };
                Ok(session.room_id().clone())
            }
            other => {
                self.state = other;
                Err(self.invalid_state("leave a room"))
            }
        }
    }

    /// Drop the credential and any room from every state, and clear the
    /// persisted store. A pending request becomes stale.
    pub fn logout(&mut self) -> Result<()> {
        self.state = SessionState::Unauthenticated;
        self.store.clear()
    }

    fn expect_phase(&self, expected: SessionPhase, action: &'static str) -> Result<()> {
        if self.phase() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn invalid_state(&self, action: &'static str) -> AppError {
        AppError::InvalidState {
            state: self.phase().label(),
            action,
        }
    }
}

/// The server's room id wins when present. A create must echo one; a join
/// may omit it and keep the requested id.
fn authoritative_room_id(op: &PendingRoomOp, reply: &ApiResponse) -> Result<RoomId> {
    match (reply.room_id.as_deref(), op.action) {
        (Some(id), _) => RoomId::parse(id)
            .map_err(|_| AppError::Protocol(format!("server returned malformed room id {:?}", id))),
        (None, RoomAction::Join) => Ok(op.room_id.clone()),
        (None, RoomAction::Create) => Err(AppError::Protocol(
            "create reply is missing roomId".to_string(),
        )),
    }
}
