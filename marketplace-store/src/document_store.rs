//! MongoDB client management

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

use crate::config::DocumentStoreConfig;
use crate::database::with_backoff;
use crate::error::{sanitize_url, DatabaseError, DatabaseOperation, Error, Result};

/// Connect to the configured MongoDB database, retrying with exponential backoff
///
/// The connection is confirmed with a `ping` before it is handed out, so a
/// returned database is reachable at the time of the call.
pub async fn connect(config: &DocumentStoreConfig) -> Result<Database> {
    let database = with_backoff(
        "Document store",
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
        || try_connect(config),
    )
    .await?;
    tracing::info!(database = %config.database, "Document store connection established");
    Ok(database)
}

/// Single connection attempt
async fn try_connect(config: &DocumentStoreConfig) -> Result<Database> {
    let failed = |e: mongodb::error::Error| {
        Error::Document(
            DatabaseError::from(e)
                .during(DatabaseOperation::Connect)
                .add_context(format!("connecting to {}", sanitize_url(&config.url))),
        )
    };

    let mut options = ClientOptions::parse(&config.url).await.map_err(failed)?;
    options.server_selection_timeout = Some(Duration::from_secs(config.connection_timeout_secs));
    options.connect_timeout = Some(Duration::from_secs(config.connection_timeout_secs));

    let client = Client::with_options(options).map_err(failed)?;
    let database = client.database(&config.database);
    database.run_command(doc! { "ping": 1 }).await.map_err(failed)?;

    Ok(database)
}
