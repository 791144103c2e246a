use crate::linking::record_linker::LinkPolicy;
use crate::outbound::{HttpProviderClient, HttpRealtimePublisher, HttpRecordStore, PgCommsRepo};

/// Shared state for the HTTP surface.
pub struct ApiContext {
    pub repo: PgCommsRepo,
    pub records: HttpRecordStore,
    pub provider: HttpProviderClient,
    pub publisher: HttpRealtimePublisher,
    pub policy: LinkPolicy,
}
