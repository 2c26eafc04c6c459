//! Remote metadata lookups.
//!
//! The crate ships no network client: callers provide a [`MetadataClient`]
//! and [`MetadataCache`] memoizes what it returns, per resource category,
//! bounded by entry count and age.

mod auth;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::config::Settings;
use crate::error::{CircuitError, Result};
use crate::region::{AlternateRegionMap, RegionHierarchy};

pub use auth::{
    authorize, STATUS_FORBIDDEN, STATUS_INTERNAL_SERVER_ERROR, STATUS_OK, STATUS_UNAUTHORIZED,
};

/// Encoding of a region hierarchy distribution.
pub const HIERARCHY_ENCODING: &str = "application/json";
/// Encoding of a brain region ontology distribution.
pub const ONTOLOGY_ENCODING: &str = "application/ld+json";

/// Where and as whom remote metadata is requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteContext {
    /// Service endpoint.
    pub endpoint: String,
    /// `<org>/<project>` bucket.
    pub bucket: String,
    /// Bearer token, already validated upstream when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RemoteContext {
    /// Context without credentials.
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            token: None,
        }
    }

    /// Same context carrying `token`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// True when a non-empty token is present.
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|token| !token.is_empty())
    }

    fn cache_key(&self, id: &str) -> RemoteKey {
        (
            id.to_string(),
            self.endpoint.clone(),
            self.bucket.clone(),
            self.is_authenticated(),
        )
    }
}

/// Downloadable file attached to an entity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// MIME type of the content.
    pub encoding_format: String,
    /// Download URL.
    pub content_url: String,
    /// File name, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A remote metadata record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Resource id.
    #[serde(rename = "@id")]
    pub id: String,
    /// `file://` URL or path of the circuit config, for circuit entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_config_path: Option<String>,
    /// Attached files.
    #[serde(default)]
    pub distribution: Vec<Distribution>,
    /// Id of the entity distributing the region hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parcellation_ontology: Option<String>,
    /// Id of the entity distributing the brain region ontology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brain_region_ontology: Option<String>,
}

impl Entity {
    fn distribution_with(&self, encoding: &str) -> Option<&Distribution> {
        self.distribution
            .iter()
            .find(|dist| dist.encoding_format == encoding)
    }
}

/// Access to the remote metadata service.
///
/// Implementations report upstream failures as [`CircuitError::Remote`].
pub trait MetadataClient: Send + Sync {
    /// Looks an entity up; `Ok(None)` when it does not exist.
    fn resolve_entity(&self, id: &str, ctx: &RemoteContext) -> Result<Option<Entity>>;

    /// Downloads a distribution into `dest_dir`, returning the file path.
    fn download(
        &self,
        distribution: &Distribution,
        dest_dir: &Path,
        ctx: &RemoteContext,
    ) -> Result<PathBuf>;

    /// Permissions granted to the context's token on its bucket.
    fn list_permissions(&self, ctx: &RemoteContext) -> Result<Vec<String>>;
}

type RemoteKey = (String, String, String, bool);

/// Memoized remote lookups.
///
/// Keys include whether a token was supplied: an authenticated result is
/// never served to an anonymous caller, and the other way round.
pub struct MetadataCache {
    client: Arc<dyn MetadataClient>,
    entities: TtlCache<RemoteKey, Arc<Entity>>,
    hierarchies: TtlCache<RemoteKey, Arc<RegionHierarchy>>,
    alternates: TtlCache<RemoteKey, Arc<AlternateRegionMap>>,
}

impl MetadataCache {
    /// Caches sized from settings.
    pub fn new(client: Arc<dyn MetadataClient>, settings: &Settings) -> Self {
        Self {
            client,
            entities: TtlCache::from_settings(&settings.entity_cache),
            hierarchies: TtlCache::from_settings(&settings.region_map_cache),
            alternates: TtlCache::from_settings(&settings.alternate_region_map_cache),
        }
    }

    /// Underlying client.
    pub fn client(&self) -> &dyn MetadataClient {
        self.client.as_ref()
    }

    /// Entity with the given id.
    pub fn entity(&self, id: Option<&str>, ctx: &RemoteContext) -> Result<Arc<Entity>> {
        let id = id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CircuitError::invalid("Resource id must be set"))?;
        self.entities.get_or_try_insert_with(&ctx.cache_key(id), || {
            info!(id, endpoint = %ctx.endpoint, "loading entity");
            self.client
                .resolve_entity(id, ctx)?
                .map(Arc::new)
                .ok_or_else(|| CircuitError::ResourceNotFound(format!("Resource not found: {id}")))
        })
    }

    /// Region hierarchy distributed by `entity`.
    pub fn region_hierarchy(
        &self,
        entity: &Entity,
        ctx: &RemoteContext,
    ) -> Result<Arc<RegionHierarchy>> {
        self.hierarchies
            .get_or_try_insert_with(&ctx.cache_key(&entity.id), || {
                info!(id = %entity.id, "loading region hierarchy");
                let dist = entity.distribution_with(HIERARCHY_ENCODING).ok_or_else(|| {
                    CircuitError::ResourceNotFound(format!(
                        "Hierarchy json not found for id {}",
                        entity.id
                    ))
                })?;
                let hierarchy = RegionHierarchy::from_json(&self.fetch(dist, ctx)?)?;
                Ok(Arc::new(hierarchy))
            })
    }

    /// Alternate region map distributed by `entity`.
    pub fn alternate_region_map(
        &self,
        entity: &Entity,
        ctx: &RemoteContext,
    ) -> Result<Arc<AlternateRegionMap>> {
        self.alternates
            .get_or_try_insert_with(&ctx.cache_key(&entity.id), || {
                info!(id = %entity.id, "loading alternate region map");
                let dist = entity.distribution_with(ONTOLOGY_ENCODING).ok_or_else(|| {
                    CircuitError::ResourceNotFound(format!(
                        "Alternative hierarchy json not found for id {}",
                        entity.id
                    ))
                })?;
                let map = AlternateRegionMap::from_json_ld(&self.fetch(dist, ctx)?)?;
                info!(entries = map.len(), url = %dist.content_url, "loaded alternate region ids");
                Ok(Arc::new(map))
            })
    }

    /// Downloads into a scratch directory and returns the file contents.
    fn fetch(&self, dist: &Distribution, ctx: &RemoteContext) -> Result<String> {
        let scratch = tempfile::tempdir()?;
        let path = self.client.download(dist, scratch.path(), ctx)?;
        debug!(path = %path.display(), "downloaded distribution");
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Circuit config path advertised by a circuit entity.
pub fn circuit_config_path(entity: &Entity) -> Result<PathBuf> {
    let raw = entity
        .circuit_config_path
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| {
            CircuitError::invalid(format!(
                "Error in resource {}: missing circuitConfigPath",
                entity.id
            ))
        })?;
    let path = match raw.split_once("://") {
        Some(("file", path)) => path,
        Some((scheme, _)) => {
            return Err(CircuitError::invalid(format!(
                "Error in resource {}: unsupported scheme {scheme:?}",
                entity.id
            )))
        }
        None => raw,
    };
    debug!(path, "circuit config path");
    Ok(PathBuf::from(path))
}
