use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use super::{MetadataClient, RemoteContext};

/// Access granted.
pub const STATUS_OK: u16 = 200;
/// No credentials supplied.
pub const STATUS_UNAUTHORIZED: u16 = 401;
/// Credentials lack the required permissions.
pub const STATUS_FORBIDDEN: u16 = 403;
/// The permission lookup failed without an upstream status.
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// Status code deciding whether `ctx` may read its bucket.
///
/// `read_permissions` lists the permissions required per endpoint, then per
/// bucket. Buckets without an entry are never readable. Results are not
/// cached.
pub fn authorize(
    ctx: &RemoteContext,
    client: &dyn MetadataClient,
    read_permissions: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
) -> u16 {
    if !ctx.is_authenticated() {
        info!("missing authentication token");
        return STATUS_UNAUTHORIZED;
    }
    let required: BTreeSet<&str> = read_permissions
        .get(&ctx.endpoint)
        .and_then(|buckets| buckets.get(&ctx.bucket))
        .map(|permissions| permissions.iter().map(String::as_str).collect())
        .unwrap_or_default();
    if required.is_empty() {
        info!(
            endpoint = %ctx.endpoint,
            bucket = %ctx.bucket,
            "not authorized because of the endpoint and bucket"
        );
        return STATUS_FORBIDDEN;
    }
    let granted = match client.list_permissions(ctx) {
        Ok(granted) => granted,
        Err(err) => {
            let status = err.status().unwrap_or(STATUS_INTERNAL_SERVER_ERROR);
            info!(status, %err, "not authorized because of the upstream error");
            return status;
        }
    };
    let granted: BTreeSet<&str> = granted.iter().map(String::as_str).collect();
    let missing: Vec<&str> = required.difference(&granted).copied().collect();
    if !missing.is_empty() {
        info!(?missing, "not authorized because of missing permissions");
        return STATUS_FORBIDDEN;
    }
    info!(bucket = %ctx.bucket, "authorized");
    STATUS_OK
}
