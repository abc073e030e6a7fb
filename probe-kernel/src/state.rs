use crate::auth::Auth;
use crate::config::KernelConfig;
use crate::health::HealthTracker;
use crate::sink::SnapshotSink;
use crate::store::ClientStore;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État unique partagé par tous les handlers Axum.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ClientStore>,
    pub sink: SnapshotSink,
    pub auth: Auth,
    pub cfg: Arc<KernelConfig>,
    pub health: HealthTracker,
}
