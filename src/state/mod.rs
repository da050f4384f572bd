pub mod game;
pub mod rooms;
pub mod scheduler;
pub mod scoring;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};

use crate::{
    config::AppConfig, dao::session_store::SessionStore, error::ServiceError,
    services::identity::IdentityVerifier,
};

pub use self::sse::SseHub;
use self::{rooms::RoomRegistry, scheduler::SessionScheduler};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

type GateMap = DashMap<String, Arc<Mutex<()>>>;

const LOBBY_SSE_CAPACITY: usize = 64;

/// Central application state: storage handle, live rooms and their timers.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    identity: Arc<dyn IdentityVerifier>,
    config: Arc<AppConfig>,
    rooms: RoomRegistry,
    scheduler: SessionScheduler,
    lobby: SseHub,
    room_gates: Arc<GateMap>,
    degraded: watch::Sender<bool>,
}

/// Exclusive access to one room, released on drop.
///
/// The gate entry is removed with its last holder, so rooms that are gone or
/// never existed leave nothing behind.
pub struct RoomGate {
    guard: Option<OwnedMutexGuard<()>>,
    code: String,
    gates: Arc<GateMap>,
}

impl Drop for RoomGate {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.gates
            .remove_if(&self.code, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, identity: Arc<dyn IdentityVerifier>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            identity,
            config: Arc::new(config),
            rooms: RoomRegistry::new(),
            scheduler: SessionScheduler::new(),
            lobby: SseHub::new(LOBBY_SSE_CAPACITY),
            room_gates: Arc::new(DashMap::new()),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.session_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Verifier for host and user tokens.
    pub fn identity(&self) -> &dyn IdentityVerifier {
        self.identity.as_ref()
    }

    /// Loaded application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live connections grouped by room.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Delayed transitions of every room.
    pub fn scheduler(&self) -> &SessionScheduler {
        &self.scheduler
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.lobby
    }

    /// Serialize read-modify-write cycles on one room's session document.
    pub async fn lock_room(&self, code: &str) -> RoomGate {
        let gate = self
            .room_gates
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock_owned().await;
        RoomGate {
            guard: Some(guard),
            code: code.to_owned(),
            gates: Arc::clone(&self.room_gates),
        }
    }

    /// Rooms with a gate currently held or awaited.
    pub fn active_gates(&self) -> usize {
        self.room_gates.len()
    }

    /// Drop the connections and timers held in memory for a room.
    pub fn forget_room(&self, code: &str) {
        self.scheduler.cancel(code);
        self.rooms.remove_room(code);
    }

    /// Broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::identity::TrustTokenVerifier;

    fn state() -> SharedState {
        AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier))
    }

    #[tokio::test]
    async fn gates_are_dropped_with_their_last_holder() {
        let state = state();
        for code in 100_000..100_050 {
            let _gate = state.lock_room(&code.to_string()).await;
        }
        assert_eq!(state.active_gates(), 0);

        let gate = state.lock_room("123456").await;
        assert_eq!(state.active_gates(), 1);
        drop(gate);
        assert_eq!(state.active_gates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forgetting_a_room_keeps_its_gate_exclusive() {
        let state = state();
        let held = state.lock_room("654321").await;

        let waiter_state = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            let _gate = waiter_state.lock_room("654321").await;
        });
        tokio::task::yield_now().await;

        state.forget_room("654321");
        let second = tokio::time::timeout(Duration::from_millis(50), state.lock_room("654321")).await;
        assert!(second.is_err());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(state.active_gates(), 0);
    }
}
