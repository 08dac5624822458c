use axum::extract::FromRef;

use crate::jobs::DispatcherHandle;
use std::time::Instant;

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub dispatcher: DispatcherHandle,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for DispatcherHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.dispatcher.clone()
    }
}
