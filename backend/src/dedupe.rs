use futures::future::BoxFuture;
use starspin_execution::RequestDedupe;
use std::time::Duration;
use tokio::sync::Mutex;

/// Request dedupe shared across instances through `SET key NX PX window`.
///
/// Fails open: when Redis is unreachable the request is admitted and the
/// per-user lock plus idempotency keys remain the safety net.
pub struct RedisDedupe {
    client: redis::Client,
    connection: Mutex<Option<redis::aio::ConnectionManager>>,
    prefix: String,
}

impl RedisDedupe {
    pub fn new(url: &str, prefix: String) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix,
        })
    }

    async fn set_nx(&self, key: &str, window: Duration) -> Result<bool, redis::RedisError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.client.get_connection_manager().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Ok(true);
        };
        let reply: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(format!("{}{}", self.prefix, key))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(window.as_millis().max(1) as u64)
            .query_async(conn)
            .await;
        match reply {
            Ok(reply) => Ok(reply.is_some()),
            Err(err) => {
                *guard = None;
                Err(err)
            }
        }
    }
}

impl RequestDedupe for RedisDedupe {
    fn try_begin<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match self.set_nx(key, window).await {
                Ok(fresh) => fresh,
                Err(err) => {
                    tracing::warn!(error = %err, "redis dedupe unavailable, admitting request");
                    true
                }
            }
        })
    }
}
