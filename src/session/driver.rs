use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::api::RoomApiClient;
use crate::bridge::{BridgeConnections, ContentBridge, ContentMessage, NavigationDecision};
use crate::error::{AppError, ErrorKind, Result};
use crate::models::ApiResponse;
use crate::security::sanitize;
use crate::session::{Completion, PendingRoomOp, RoomAction, SessionPhase, SessionStateMachine};
use crate::surface::ContentSurface;

const COMMAND_BUFFER: usize = 64;
const EVENT_NAME_MAX: usize = 64;
const EVENT_DATA_MAX: usize = 1024;

/// Commands accepted by the session driver
#[derive(Debug)]
pub enum SessionCommand {
    NavigationRequested {
        url: String,
        reply: oneshot::Sender<bool>,
    },
    PageFinished {
        url: String,
    },
    CreateRoom {
        room_input: String,
    },
    JoinRoom {
        room_input: String,
    },
    LeaveRoom,
    Logout,
    Bridge {
        key: Uuid,
        message: ContentMessage,
        reply: oneshot::Sender<Result<()>>,
    },
    CheckBridgeKey {
        key: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Events for whatever renders the native controls
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        phase: SessionPhase,
    },
    ControlsEnabled {
        enabled: bool,
    },
    Status {
        message: String,
    },
    Notice {
        message: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    RoomEntered {
        room_id: String,
        username: String,
        is_host: bool,
    },
    GameEvent {
        event: String,
        data: String,
    },
}

type RoomReply = (Uuid, Result<ApiResponse>);

/// Single owner of the session state machine, the content bridge and the
/// surface. Everything that changes them arrives as a [`SessionCommand`].
pub struct SessionDriver {
    machine: SessionStateMachine,
    api: RoomApiClient,
    bridge: ContentBridge,
    surface: Box<dyn ContentSurface>,
    connections: Arc<BridgeConnections>,
    commands: mpsc::Receiver<SessionCommand>,
    replies_tx: mpsc::UnboundedSender<RoomReply>,
    replies_rx: mpsc::UnboundedReceiver<RoomReply>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionDriver {
    pub fn new(
        machine: SessionStateMachine,
        api: RoomApiClient,
        bridge: ContentBridge,
        surface: Box<dyn ContentSurface>,
        connections: Arc<BridgeConnections>,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Self {
            machine,
            api,
            bridge,
            surface,
            connections,
            commands: cmd_rx,
            replies_tx,
            replies_rx,
            events: event_tx,
        };

        (driver, SessionHandle { sender: cmd_tx }, event_rx)
    }

    pub async fn run(mut self) {
        tracing::info!(phase = ?self.machine.phase(), "Session driver started");
        self.present();
        self.emit_phase();

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some((op_id, outcome)) = self.replies_rx.recv() => {
                    self.on_room_reply(op_id, outcome);
                }
            }
        }

        self.bridge.close();
        self.surface.close();
        self.connections.close_except(None);
        tracing::info!("Session driver stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::NavigationRequested { url, reply } => {
                let _ = reply.send(self.on_navigation(&url));
            }
            SessionCommand::PageFinished { url } => {
                if let Some(script) = self.bridge.injection_script(&url) {
                    self.surface.evaluate_script(&script);
                }
            }
            SessionCommand::CreateRoom { room_input } => {
                let begun = self.machine.begin_create(&room_input);
                self.start_room_request(begun);
            }
            SessionCommand::JoinRoom { room_input } => {
                let begun = self.machine.begin_join(&room_input);
                self.start_room_request(begun);
            }
            SessionCommand::LeaveRoom => {
                if let Err(e) = self.leave_room() {
                    self.emit_error(&e);
                }
            }
            SessionCommand::Logout => self.logout(),
            SessionCommand::Bridge {
                key,
                message,
                reply,
            } => {
                let _ = reply.send(self.on_bridge_message(key, message));
            }
            SessionCommand::CheckBridgeKey { key, reply } => {
                let _ = reply.send(self.bridge.is_active_key(key));
            }
            // Handled by the run loop
            SessionCommand::Shutdown => {}
        }
    }

    /// Whether the surface may load `url`.
    fn on_navigation(&mut self, url: &str) -> bool {
        match self.bridge.evaluate_navigation(url) {
            NavigationDecision::Allow => true,
            NavigationDecision::Block { reason } => {
                let violation = AppError::BridgeViolation(format!("Navigation blocked: {}", reason));
                tracing::warn!(error = %violation, "Navigation refused");
                self.emit(SessionEvent::Notice {
                    message: violation.user_message(),
                });
                false
            }
            NavigationDecision::AuthComplete => {
                self.on_auth_complete();
                false
            }
        }
    }

    /// The entry surface reached the auth-complete page. If the credential
    /// did not arrive over the bridge, it may still have been written to the
    /// store by the auth page.
    fn on_auth_complete(&mut self) {
        if self.machine.phase() == SessionPhase::Unauthenticated
            && !self.machine.reload_from_store()
        {
            tracing::warn!("Auth completed without a credential");
            self.emit(SessionEvent::Notice {
                message: "Sign-in did not complete. Please try again.".to_string(),
            });
            self.present();
            return;
        }

        self.present();
        self.emit_phase();
    }

    fn start_room_request(&mut self, begun: Result<PendingRoomOp>) {
        let op = match begun {
            Ok(op) => op,
            Err(e) => {
                self.emit_error(&e);
                return;
            }
        };

        let status = match op.action {
            RoomAction::Create => format!("Creating room {}...", op.room_id),
            RoomAction::Join => format!("Joining room {}...", op.room_id),
        };
        self.emit_phase();
        self.emit(SessionEvent::Status { message: status });

        let api = self.api.clone();
        let replies = self.replies_tx.clone();
        tokio::spawn(async move {
            let outcome = match op.action {
                RoomAction::Create => {
                    api.create_room(&op.token, op.room_id.as_str(), op.username.as_str())
                        .await
                }
                RoomAction::Join => {
                    api.join_room(&op.token, op.room_id.as_str(), op.username.as_str())
                        .await
                }
            };
            // The driver is gone if this fails; nothing is waiting for it.
            let _ = replies.send((op.id, outcome));
        });
    }

    fn on_room_reply(&mut self, op_id: Uuid, outcome: Result<ApiResponse>) {
        match self.machine.complete(op_id, outcome) {
            Completion::Entered(session) => {
                let url = self.bridge.open_room(session.clone());
                self.connections.close_except(self.bridge.active_key());
                self.surface.load_url(&url);

                self.emit_phase();
                self.emit(SessionEvent::RoomEntered {
                    room_id: session.room_id().to_string(),
                    username: session.username().to_string(),
                    is_host: session.is_host(),
                });
            }
            Completion::Reverted(e) => {
                self.emit_phase();
                self.emit_error(&e);
            }
            Completion::Stale => {}
        }
    }

    fn on_bridge_message(&mut self, key: Uuid, message: ContentMessage) -> Result<()> {
        if let Err(e) = self.bridge.authorize(key, &message) {
            tracing::warn!(error = %e, "Bridge message refused");
            return Err(e);
        }

        match message {
            ContentMessage::AuthSuccess { username, token } => {
                self.machine.on_auth_success(&username, &token)?;
                self.present();
                self.emit_phase();
                Ok(())
            }
            ContentMessage::LeaveRoom => self.leave_room(),
            ContentMessage::GameEvent { event, data } => {
                self.emit(SessionEvent::GameEvent {
                    event: sanitize(Some(&event), EVENT_NAME_MAX),
                    data: sanitize(Some(&data), EVENT_DATA_MAX),
                });
                Ok(())
            }
        }
    }

    fn leave_room(&mut self) -> Result<()> {
        let room_id = self.machine.leave()?;
        self.present();
        self.emit_phase();
        self.emit(SessionEvent::Status {
            message: format!("Left room {}", room_id),
        });
        Ok(())
    }

    fn logout(&mut self) {
        if let Err(e) = self.machine.logout() {
            tracing::warn!(error = %e, "Could not clear stored credential");
            self.emit_error(&e);
        }
        self.present();
        self.emit_phase();
    }

    /// Bring the surface in line with the machine's phase. Unauthenticated
    /// gets a fresh entry surface; authenticated without a room gets none.
    fn present(&mut self) {
        match self.machine.phase() {
            SessionPhase::Unauthenticated => {
                let url = self.bridge.open_entry();
                self.surface.load_url(&url);
            }
            SessionPhase::Authenticated => {
                if self.bridge.active_kind().is_some() {
                    self.bridge.close();
                    self.surface.close();
                }
            }
            SessionPhase::RoomPending | SessionPhase::InRoom => {}
        }

        let dropped = self.connections.close_except(self.bridge.active_key());
        if dropped > 0 {
            tracing::debug!(dropped, "Closed bridge connections of old surfaces");
        }
    }

    fn emit_phase(&self) {
        self.emit(SessionEvent::StateChanged {
            phase: self.machine.phase(),
        });
        self.emit(SessionEvent::ControlsEnabled {
            enabled: self.machine.controls_enabled(),
        });
    }

    fn emit_error(&self, e: &AppError) {
        self.emit(SessionEvent::Error {
            kind: e.kind(),
            message: e.user_message(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Cloneable front door to a running [`SessionDriver`].
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn create_room(&self, room_input: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::CreateRoom {
            room_input: room_input.into(),
        })
        .await
    }

    pub async fn join_room(&self, room_input: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::JoinRoom {
            room_input: room_input.into(),
        })
        .await
    }

    pub async fn leave_room(&self) -> Result<()> {
        self.send(SessionCommand::LeaveRoom).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.send(SessionCommand::Logout).await
    }

    /// Ask whether the surface may navigate to `url`.
    pub async fn request_navigation(&self, url: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::NavigationRequested {
            url: url.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn page_finished(&self, url: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::PageFinished { url: url.into() })
            .await
    }

    pub async fn bridge_message(&self, key: Uuid, message: ContentMessage) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Bridge {
            key,
            message,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn check_bridge_key(&self, key: Uuid) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::CheckBridgeKey { key, reply })
            .await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.sender.send(cmd).await.map_err(|_| stopped())
    }
}

fn stopped() -> AppError {
    AppError::InvalidState {
        state: "stopped",
        action: "reach the session",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, MemoryCredentialStore};
    use crate::config::Config;
    use crate::models::Credential;
    use std::sync::Mutex;
    use url::Url;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(String),
        Script(String),
        Close,
    }

    #[derive(Clone, Default)]
    struct RecordingSurface {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingSurface {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContentSurface for RecordingSurface {
        fn load_url(&mut self, url: &Url) {
            self.calls.lock().unwrap().push(Call::Load(url.to_string()));
        }

        fn evaluate_script(&mut self, script: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Script(script.to_string()));
        }

        fn close(&mut self) {
            self.calls.lock().unwrap().push(Call::Close);
        }
    }

    struct Harness {
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        surface: RecordingSurface,
        store: Arc<MemoryCredentialStore>,
    }

    fn start(store: MemoryCredentialStore) -> Harness {
        let config = Config::from_lookup(|key| match key {
            // Nothing listens here; room requests fail fast.
            "ROOMHOST_API_BASE" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(store);
        let machine = SessionStateMachine::restore(store.clone());
        let api = RoomApiClient::new(&config).unwrap();
        let bridge = ContentBridge::new(&config).unwrap();
        let surface = RecordingSurface::default();
        let (driver, handle, events) = SessionDriver::new(
            machine,
            api,
            bridge,
            Box::new(surface.clone()),
            Arc::new(BridgeConnections::new()),
        );
        tokio::spawn(driver.run());

        Harness {
            handle,
            events,
            surface,
            store,
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Key of the entry surface, read from the script injected on page load.
    async fn entry_key(h: &Harness) -> Uuid {
        h.handle
            .page_finished("https://roomhost.app/index.com.html")
            .await
            .unwrap();
        // Round-trip so the page_finished command has been processed.
        h.handle.request_navigation("about:blank").await.unwrap();

        let script = h
            .surface
            .calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                Call::Script(s) => Some(s),
                _ => None,
            })
            .expect("entry script injected");
        let start = script.find("BRIDGE_KEY='").unwrap() + "BRIDGE_KEY='".len();
        Uuid::parse_str(&script[start..start + 36]).unwrap()
    }

    #[tokio::test]
    async fn test_unauthenticated_start_loads_entry_page() {
        let h = start(MemoryCredentialStore::new());
        h.handle.request_navigation("about:blank").await.unwrap();

        assert_eq!(
            h.surface.calls()[0],
            Call::Load("https://roomhost.app/index.com.html".to_string())
        );
    }

    #[tokio::test]
    async fn test_navigation_policy_is_applied() {
        let mut h = start(MemoryCredentialStore::new());

        assert!(h
            .handle
            .request_navigation("https://roomhost.app/help")
            .await
            .unwrap());
        assert!(!h
            .handle
            .request_navigation("https://evil.example/phish")
            .await
            .unwrap());

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice { message }
                if message == "Navigation blocked: https://evil.example is outside the trusted origin"
        )));
    }

    #[tokio::test]
    async fn test_auth_success_over_bridge_signs_in() {
        let mut h = start(MemoryCredentialStore::new());
        let key = entry_key(&h).await;

        h.handle
            .bridge_message(
                key,
                ContentMessage::AuthSuccess {
                    username: "alice".to_string(),
                    token: "tok123".to_string(),
                },
            )
            .await
            .expect("Auth message should be accepted");

        assert_eq!(h.store.load().unwrap().unwrap().username, "alice");
        assert!(!h.handle.check_bridge_key(key).await.unwrap());
        assert_eq!(h.surface.calls().last(), Some(&Call::Close));

        let events = drain(&mut h.events);
        assert!(events.contains(&SessionEvent::StateChanged {
            phase: SessionPhase::Authenticated
        }));
    }

    #[tokio::test]
    async fn test_entry_surface_cannot_send_room_messages() {
        let h = start(MemoryCredentialStore::new());
        let key = entry_key(&h).await;

        let err = h
            .handle
            .bridge_message(key, ContentMessage::LeaveRoom)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BridgeViolation(_)));
    }

    #[tokio::test]
    async fn test_auth_complete_without_credential_reloads_entry() {
        let mut h = start(MemoryCredentialStore::new());

        let allowed = h
            .handle
            .request_navigation("https://roomhost.app/index.html")
            .await
            .unwrap();
        assert!(!allowed);

        let loads = h
            .surface
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Load(_)))
            .count();
        assert_eq!(loads, 2);
        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Notice { message } if message.contains("Sign-in"))));
    }

    #[tokio::test]
    async fn test_invalid_room_input_reports_validation_error() {
        let mut h = start(MemoryCredentialStore::with_credential(Credential {
            username: "alice".to_string(),
            token: "tok123".to_string(),
        }));

        h.handle.join_room("12").await.unwrap();
        h.handle.request_navigation("about:blank").await.unwrap();

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error {
                kind: ErrorKind::Validation,
                ..
            }
        )));
        assert!(!events.contains(&SessionEvent::StateChanged {
            phase: SessionPhase::RoomPending
        }));
    }

    #[tokio::test]
    async fn test_unreachable_server_reverts_to_authenticated() {
        let mut h = start(MemoryCredentialStore::with_credential(Credential {
            username: "alice".to_string(),
            token: "tok123".to_string(),
        }));

        h.handle.create_room("").await.unwrap();

        let mut saw_pending = false;
        loop {
            match h.events.recv().await.expect("driver running") {
                SessionEvent::StateChanged {
                    phase: SessionPhase::RoomPending,
                } => saw_pending = true,
                SessionEvent::Error { kind, .. } => {
                    assert_eq!(kind, ErrorKind::Transport);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_pending);
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_shows_entry() {
        let h = start(MemoryCredentialStore::with_credential(Credential {
            username: "alice".to_string(),
            token: "tok123".to_string(),
        }));

        h.handle.logout().await.unwrap();
        h.handle.request_navigation("about:blank").await.unwrap();

        assert_eq!(h.store.load().unwrap(), None);
        assert_eq!(
            h.surface.calls().last(),
            Some(&Call::Load("https://roomhost.app/index.com.html".to_string()))
        );
    }

    #[tokio::test]
    async fn test_handle_after_shutdown_reports_stopped() {
        let h = start(MemoryCredentialStore::new());
        h.handle.shutdown().await.unwrap();

        // The driver drops its receiver once the loop ends.
        let mut result = Ok(());
        for _ in 0..50 {
            result = h.handle.leave_room().await;
            if result.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            result,
            Err(AppError::InvalidState {
                state: "stopped",
                ..
            })
        ));
    }
}
