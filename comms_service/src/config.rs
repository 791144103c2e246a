use anyhow::Context;

pub struct Config {
    /// The connection URL for the comms database.
    pub comms_db_url: String,

    /// The port to listen for HTTP requests on.
    pub port: u16,

    /// Base URL of the CRM record-store service.
    pub record_store_url: String,

    /// Base URL of the provider gateway.
    pub provider_api_url: String,

    /// API key for the provider gateway.
    pub provider_api_key: String,

    /// Base URL of the real-time connection gateway.
    pub realtime_gateway_url: String,

    /// Minimum and maximum database pool connections.
    pub db_min_connections: u32,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let comms_db_url =
            std::env::var("COMMS_DB_URL").context("COMMS_DB_URL must be provided")?;

        let port: u16 = std::env::var("PORT")
            .unwrap_or("8080".to_string())
            .parse::<u16>()
            .context("should be valid port number")?;

        let record_store_url =
            std::env::var("RECORD_STORE_URL").context("RECORD_STORE_URL must be provided")?;

        let provider_api_url =
            std::env::var("PROVIDER_API_URL").context("PROVIDER_API_URL must be provided")?;

        let provider_api_key =
            std::env::var("PROVIDER_API_KEY").context("PROVIDER_API_KEY must be provided")?;

        let realtime_gateway_url = std::env::var("REALTIME_GATEWAY_URL")
            .context("REALTIME_GATEWAY_URL must be provided")?;

        let db_min_connections: u32 = std::env::var("DB_MIN_CONNECTIONS")
            .unwrap_or("1".to_string())
            .parse::<u32>()
            .context("DB_MIN_CONNECTIONS must be a number")?;

        let db_max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or("10".to_string())
            .parse::<u32>()
            .context("DB_MAX_CONNECTIONS must be a number")?;

        Ok(Config {
            comms_db_url,
            port,
            record_store_url,
            provider_api_url,
            provider_api_key,
            realtime_gateway_url,
            db_min_connections,
            db_max_connections,
        })
    }
}
