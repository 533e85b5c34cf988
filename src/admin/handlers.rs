use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatcher;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub workers: usize,
    pub available: usize,
    pub in_flight: usize,
}

pub async fn get_status(State(dispatcher): State<Arc<Dispatcher>>) -> Json<SystemStatus> {
    let available = dispatcher.available();
    let status = if available == 0 { "saturated" } else { "operational" };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: status.to_string(),
        workers: dispatcher.capacity(),
        available,
        in_flight: dispatcher.in_flight(),
    })
}
