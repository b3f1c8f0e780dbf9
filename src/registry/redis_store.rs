use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::store::{SessionStore, StoreError};

/// Redis-backed session store.
///
/// Each record is a forward key `{prefix}:sid:{session_id} -> handle` plus a
/// reverse key `{prefix}:conn:{handle} -> session_id` maintained as the
/// secondary index. Writes that touch both keys go through a MULTI pipeline.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(prefix = %prefix, "Connected to Redis session store");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn sid_key(&self, session_id: &str) -> String {
        format!("{}:sid:{}", self.prefix, session_id)
    }

    fn conn_key(&self, connection_handle: &str) -> String {
        format!("{}:conn:{}", self.prefix, connection_handle)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session_id: &str, connection_handle: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let sid_key = self.sid_key(session_id);

        let old: Option<String> = conn.get(&sid_key).await?;

        // Forward and reverse keys move together
        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(old_handle) = old.filter(|h| h != connection_handle) {
            pipe.del(self.conn_key(&old_handle));
        }
        pipe.set(&sid_key, connection_handle)
            .set(self.conn_key(connection_handle), session_id);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.sid_key(session_id)).await?)
    }

    async fn batch_get(
        &self,
        session_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        if session_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = session_ids.iter().map(|id| self.sid_key(id)).collect();
        let values: Vec<Option<String>> = conn.mget(&keys).await?;

        Ok(session_ids
            .iter()
            .zip(values)
            .filter_map(|(id, handle)| handle.map(|h| (id.clone(), h)))
            .collect())
    }

    async fn get_by_handle(&self, connection_handle: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.conn_key(connection_handle)).await?)
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let sid_key = self.sid_key(session_id);

        let handle: Option<String> = conn.get(&sid_key).await?;
        let _: () = conn.del(&sid_key).await?;

        if let Some(handle) = handle {
            let conn_key = self.conn_key(&handle);
            // The reverse key may already point at another session if the
            // handle got reused; only drop it when it still names this one.
            let owner: Option<String> = conn.get(&conn_key).await?;
            if owner.as_deref() == Some(session_id) {
                let _: () = conn.del(&conn_key).await?;
            }
        }
        Ok(())
    }

    async fn delete_by_handle(&self, connection_handle: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let conn_key = self.conn_key(connection_handle);

        let session_id: Option<String> = conn.get(&conn_key).await?;
        let _: () = conn.del(&conn_key).await?;

        if let Some(session_id) = session_id {
            let sid_key = self.sid_key(&session_id);
            // A re-admitted session already points at a new handle; leave it.
            let current: Option<String> = conn.get(&sid_key).await?;
            if current.as_deref() == Some(connection_handle) {
                let _: () = conn.del(&sid_key).await?;
            }
        }
        Ok(())
    }
}
