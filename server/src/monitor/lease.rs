//! Scan lease.
//!
//! A TTL-bound Redis lease serializes scan passes across server
//! instances. Acquisition is `SET NX EX`; release is a compare-and-delete
//! Lua script so an instance can only release a lease it still holds
//! (a pass outliving the TTL must not delete its successor's lease).

use fred::interfaces::LuaInterface;
use fred::prelude::*;
use tracing::warn;

/// Lua script that deletes the lease key only when the stored holder
/// matches, returning 1 on release and 0 otherwise.
const RELEASE_LEASE_LUA: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Try to acquire the lease for `holder`. Returns false when another
/// instance holds it.
pub async fn try_acquire(
    redis: &Client,
    key: &str,
    holder: &str,
    ttl_secs: i64,
) -> Result<bool, Error> {
    let acquired: Option<String> = redis
        .set(
            key,
            holder,
            Some(fred::types::Expiration::EX(ttl_secs)),
            Some(fred::types::SetOptions::NX),
            false,
        )
        .await?;

    Ok(acquired.is_some())
}

/// Release the lease if `holder` still owns it.
pub async fn release(redis: &Client, key: &str, holder: &str) {
    match redis
        .eval::<i64, _, _, _>(RELEASE_LEASE_LUA, vec![key], vec![holder])
        .await
    {
        Ok(1) => {}
        Ok(_) => {
            warn!(key, "Scan lease expired before release");
        }
        Err(e) => {
            warn!(key, error = %e, "Failed to release scan lease");
        }
    }
}
