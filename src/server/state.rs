use std::sync::Arc;
use std::time::Instant;

use crate::auth::{create_secret_provider, SignatureValidator};
use crate::config::Settings;
use crate::dispatch::BroadcastDispatcher;
use crate::error::AppError;
use crate::registry::{create_session_store, ConnectionRegistry};
use crate::session::{AdmissionFlow, DisconnectFlow};
use crate::transport::LocalTransport;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub transport: Arc<LocalTransport>,
    pub admission: Arc<AdmissionFlow>,
    pub disconnect: Arc<DisconnectFlow>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, AppError> {
        let secret_provider = create_secret_provider(&settings.auth)?;
        let validator = Arc::new(SignatureValidator::new(
            secret_provider,
            settings.auth.skew_tolerance_minutes,
        ));

        let store = create_session_store(&settings.store).await?;
        let registry = ConnectionRegistry::new(store);

        let transport = Arc::new(LocalTransport::new());
        let admission = Arc::new(AdmissionFlow::new(validator, registry.clone()));
        let disconnect = Arc::new(DisconnectFlow::new(registry.clone()));
        let dispatcher = Arc::new(BroadcastDispatcher::new(registry, transport.clone()));

        Ok(Self {
            settings: Arc::new(settings),
            transport,
            admission,
            disconnect,
            dispatcher,
            start_time: Instant::now(),
        })
    }
}
