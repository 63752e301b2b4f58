use crate::interface_adapters::clients::ledger::LedgerClient;
use crate::use_cases::RoomRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Registry of live rooms, shared by the socket and internal routes.
    pub room_registry: Arc<RoomRegistry>,
    // Room used when a client connects without `room_id`.
    pub default_room_id: Arc<str>,
    // Entry verification and cash-out settlement.
    pub ledger_client: Arc<LedgerClient>,
}
