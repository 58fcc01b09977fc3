//! # Redis Mirror
//!
//! Mirrors order events onto Redis pub/sub so observers connected to other
//! processes see them too. Channel: `<prefix>:orders:<tenantId>`.
//!
//! Publishing is spawned onto the runtime; the caller never waits on Redis.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::bus::EventSink;
use crate::error::{NotifyError, NotifyResult};
use crate::event::OrderEvent;

#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisPublisher {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str, prefix: impl Into<String>) -> NotifyResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        let prefix = prefix.into();

        info!(prefix = %prefix, "Redis publisher connected");
        Ok(RedisPublisher { connection, prefix })
    }

    pub fn channel_for(&self, tenant_id: &str) -> String {
        channel_name(&self.prefix, tenant_id)
    }
}

pub(crate) fn channel_name(prefix: &str, tenant_id: &str) -> String {
    format!("{}:orders:{}", prefix, tenant_id)
}

impl EventSink for RedisPublisher {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn publish(&self, event: &OrderEvent) -> NotifyResult<()> {
        let runtime = Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let payload = event.to_json()?;
        let channel = self.channel_for(&event.tenant_id);
        let order_id = event.order.id.clone();
        let mut connection = self.connection.clone();

        runtime.spawn(async move {
            let result: redis::RedisResult<i64> = connection.publish(&channel, payload).await;
            match result {
                Ok(receivers) => {
                    debug!(
                        channel = %channel,
                        order_id = %order_id,
                        receivers,
                        "Published to redis"
                    );
                }
                Err(e) => {
                    warn!(
                        channel = %channel,
                        order_id = %order_id,
                        error = %e,
                        "Redis publish failed"
                    );
                }
            }
        });
        Ok(())
    }
}
