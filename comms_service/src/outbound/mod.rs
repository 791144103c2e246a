pub mod http;
pub mod pg;

pub use http::{HttpProviderClient, HttpRealtimePublisher, HttpRecordStore};
pub use pg::PgCommsRepo;
