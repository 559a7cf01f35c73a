use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// How many pings a fresh client gets before it is considered unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pings sent before giving up.
    pub max_attempts: u32,
    /// Wait after the first failed ping; doubled after each failure.
    pub initial_delay: Duration,
    /// Upper bound of the wait between two pings.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Startup: the server may still be booting next to us.
    pub const STARTUP: Self = Self {
        max_attempts: 10,
        initial_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(5),
    };

    /// Reconnect from the storage supervisor, which already backs off between calls.
    pub const RECONNECT: Self = Self {
        max_attempts: 2,
        initial_delay: Duration::from_millis(250),
        max_delay: Duration::from_millis(250),
    };

    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

/// Build a client from `config` and ping its database until it answers or
/// `policy` gives up.
pub async fn establish_connection(
    config: &MongoConfig,
    policy: RetryPolicy,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => {
                attempts += 1;
                if attempts >= policy.max_attempts {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                debug!(
                    attempts,
                    database = %config.database_name,
                    error = %err,
                    "MongoDB ping failed; retrying"
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }

    Ok((client, database))
}
