//! Wiring for controller simulations.
//!
//! A [`SimRig`] owns one [`SimServer`], one [`RecordingPlatform`] and the
//! in-memory stores, and spawns controllers wired to them on the current
//! tokio runtime. Run it under `#[tokio::test(start_paused = true)]` so poll
//! intervals elapse instantly and deterministically.

use std::sync::Arc;

use epistle_app::{
    ActiveConversationController, ControllerConfig, ControllerDeps, ControllerError,
    ControllerHandle,
};
use epistle_client::SystemEnv;
use epistle_core::{
    EnglishLocalizer, MemoryLastSeenStore, MemoryPasswordStore, MessageCodec, StaticAuthToken,
};

use crate::{PlainDecryptor, RecordingPlatform, SimServer};

/// Server, platform and stores shared by every controller in a simulation.
pub struct SimRig {
    /// Simulated conversation server.
    pub server: Arc<SimServer>,
    /// Recorded side effects.
    pub platform: Arc<RecordingPlatform>,
    /// Password hashes the user has entered.
    pub passwords: MemoryPasswordStore,
    /// Persisted last-seen ids.
    pub last_seen: MemoryLastSeenStore,
}

impl SimRig {
    /// Rig around a fresh server seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_server(SimServer::new(seed))
    }

    /// Rig around a preconfigured server.
    pub fn with_server(server: SimServer) -> Self {
        Self {
            server: Arc::new(server),
            platform: Arc::new(RecordingPlatform::new()),
            passwords: MemoryPasswordStore::new(),
            last_seen: MemoryLastSeenStore::new(),
        }
    }

    /// Create `convo_id` on the server and remember its password hash.
    pub fn add_convo(&self, convo_id: &str, password_hash: &str) {
        self.server.create_convo(convo_id, password_hash);
        self.passwords.insert(convo_id, password_hash);
    }

    /// Collaborators for a controller acting as `user_id`.
    pub fn deps(&self, user_id: &str) -> ControllerDeps {
        ControllerDeps {
            service: Arc::clone(&self.server) as _,
            sender: Arc::clone(&self.server) as _,
            passwords: Arc::new(self.passwords.clone()),
            last_seen: Arc::new(self.last_seen.clone()),
            auth: Arc::new(StaticAuthToken("000000".into())),
            codec: MessageCodec::new(user_id, Arc::new(PlainDecryptor), Arc::new(EnglishLocalizer)),
            platform: Arc::clone(&self.platform) as _,
        }
    }

    /// Spawn a controller for `convo_id` acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Whatever [`ActiveConversationController::spawn`] rejects.
    pub fn spawn(
        &self,
        convo_id: &str,
        user_id: &str,
        config: ControllerConfig,
    ) -> Result<ControllerHandle, ControllerError> {
        ActiveConversationController::spawn(convo_id, self.deps(user_id), SystemEnv::new(), config)
    }
}
