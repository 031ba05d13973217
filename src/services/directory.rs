//! Resource Directory client.
//!
//! The directory is the external source of truth for resource ancestry and
//! descendant expansion. It supplies three lookups: the ancestor-chain
//! context of a resource, the downward hierarchy of descendant ids, and
//! display names. Display names are never used in permission decisions.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A context entry: one resource id at a level, or several siblings
/// (e.g. a set of child partners).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    One(Uuid),
    Many(Vec<Uuid>),
}

/// Ancestor-chain context: level name -> resource id(s), from the root down
/// to (and including) the queried resource.
pub type Context = std::collections::BTreeMap<String, ContextValue>;

/// Flatten every resource id appearing anywhere in a context, list-valued
/// entries included.
pub fn flatten_context(context: &Context) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for value in context.values() {
        match value {
            ContextValue::One(id) => ids.push(*id),
            ContextValue::Many(list) => ids.extend(list.iter().copied()),
        }
    }
    ids
}

/// Display metadata for a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

/// Directory lookups consumed by the permission engine and role listing.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Ancestor chain of a resource id, keyed by level name.
    async fn get_context(&self, resource_type: &str, resource_id: Uuid) -> Result<Context>;

    /// Nested descendant tree. With no anchor, returns the tree from the
    /// global root. Keys alternate level name -> resource id -> subtree;
    /// leaf levels map to lists of ids.
    async fn get_downward_hierarchy(
        &self,
        resource_type: Option<&str>,
        resource_id: Option<Uuid>,
    ) -> Result<Value>;

    /// Display names for a batch of resources.
    async fn get_resources_info(
        &self,
        resources: &[(String, Uuid)],
    ) -> Result<HashMap<Uuid, ResourceInfo>>;
}

/// HTTP implementation backed by the directory's REST API.
pub struct HttpResourceDirectory {
    client: Client,
    base_url: String,
}

impl HttpResourceDirectory {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Directory(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Map directory HTTP failures onto the service error taxonomy.
    ///
    /// 404 means the resource does not exist; 400 means the arguments were
    /// malformed. Callers on the permission-check path launder both into
    /// `Forbidden` so that resource existence never leaks.
    fn map_status(status: StatusCode, what: &str) -> AppError {
        match status {
            StatusCode::NOT_FOUND => AppError::NotFound(format!("{what} not found")),
            StatusCode::BAD_REQUEST => AppError::WrongArguments(format!("invalid {what}")),
            other => AppError::Directory(format!("{what} lookup failed with status {other}")),
        }
    }
}

#[async_trait]
impl ResourceDirectory for HttpResourceDirectory {
    async fn get_context(&self, resource_type: &str, resource_id: Uuid) -> Result<Context> {
        let url = format!("{}/context/{}/{}", self.base_url, resource_type, resource_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Directory(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status(), "resource"));
        }

        response
            .json::<Context>()
            .await
            .map_err(|e| AppError::Directory(format!("malformed context response: {e}")))
    }

    async fn get_downward_hierarchy(
        &self,
        resource_type: Option<&str>,
        resource_id: Option<Uuid>,
    ) -> Result<Value> {
        let url = match (resource_type, resource_id) {
            (Some(t), Some(id)) => format!("{}/hierarchy/{}/{}", self.base_url, t, id),
            _ => format!("{}/hierarchy", self.base_url),
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Directory(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status(), "hierarchy"));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Directory(format!("malformed hierarchy response: {e}")))
    }

    async fn get_resources_info(
        &self,
        resources: &[(String, Uuid)],
    ) -> Result<HashMap<Uuid, ResourceInfo>> {
        #[derive(Serialize)]
        struct InfoRequest<'a> {
            resources: Vec<(&'a str, Uuid)>,
        }

        let url = format!("{}/resources/info", self.base_url);
        let body = InfoRequest {
            resources: resources.iter().map(|(t, id)| (t.as_str(), *id)).collect(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Directory(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status(), "resource info"));
        }

        response
            .json::<HashMap<Uuid, ResourceInfo>>()
            .await
            .map_err(|e| AppError::Directory(format!("malformed info response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Context deserialization and flattening
    // -----------------------------------------------------------------------

    #[test]
    fn test_context_value_scalar_and_list() {
        let r = Uuid::new_v4();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let json = format!(
            r#"{{"root": "{r}", "partner": ["{p1}", "{p2}"]}}"#
        );
        let ctx: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx["root"], ContextValue::One(r));
        assert_eq!(ctx["partner"], ContextValue::Many(vec![p1, p2]));
    }

    #[test]
    fn test_flatten_context_includes_list_entries() {
        let r = Uuid::new_v4();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut ctx = Context::new();
        ctx.insert("root".into(), ContextValue::One(r));
        ctx.insert("partner".into(), ContextValue::Many(vec![p1, p2]));

        let ids = flatten_context(&ctx);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&r) && ids.contains(&p1) && ids.contains(&p2));
    }

    #[test]
    fn test_flatten_empty_context() {
        assert!(flatten_context(&Context::new()).is_empty());
    }

    // -----------------------------------------------------------------------
    // Status mapping
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            HttpResourceDirectory::map_status(StatusCode::NOT_FOUND, "resource"),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            HttpResourceDirectory::map_status(StatusCode::BAD_REQUEST, "resource"),
            AppError::WrongArguments(_)
        ));
        assert!(matches!(
            HttpResourceDirectory::map_status(StatusCode::INTERNAL_SERVER_ERROR, "resource"),
            AppError::Directory(_)
        ));
    }
}
