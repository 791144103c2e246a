pub mod comm_links;
pub mod record_linker;
pub mod storage_gate;
