pub mod channels;
pub mod conversation_participants;
pub mod conversations;
pub mod links;
pub mod messages;
pub mod parse;
pub mod participants;
pub mod profiles;

/// Schema migrations for the comms tables. Embedded so deployments and
/// test harnesses run the same DDL.
pub static COMMS_DB_MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
