use crate::client::RateLimitedClient;
use crate::collector::WorkItem;
use crate::config::{ResourceConfig, SourceConfig};
use crate::fetcher::{fetch_sub_resources, FetchError, Fetcher, SubResource};
use async_trait::async_trait;
use serde_json::Value;

/// Configuration-driven fetcher for REST APIs addressed by `{id}` paths
///
/// The first resource is fetched on its own; its JSON then fills `{field.path}`
/// placeholders in the remaining resource paths, for example the default branch
/// of a repository for a recursive tree call.
pub struct TemplateFetcher {
    client: RateLimitedClient,
    base_url: String,
    resources: Vec<ResourceConfig>,
}

impl TemplateFetcher {
    pub fn new(client: RateLimitedClient, base_url: impl Into<String>, resources: Vec<ResourceConfig>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resources,
        }
    }

    /// Builds a fetcher for a configured source
    pub fn from_source(client: RateLimitedClient, source: &SourceConfig) -> Self {
        Self::new(client, source.base_url.clone(), source.resources.clone())
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Fetcher for TemplateFetcher {
    async fn fetch(&self, item: &WorkItem) -> Result<Value, FetchError> {
        let Some((primary, rest)) = self.resources.split_first() else {
            return Err(FetchError::Malformed("no resources configured".to_string()));
        };

        let primary_path = expand_path(&primary.path, &item.id, &Value::Null)
            .ok_or_else(|| FetchError::Malformed(format!("cannot expand '{}'", primary.path)))?;
        let mut payload = fetch_sub_resources(
            &self.client,
            &[SubResource::required(primary.name.clone(), self.url_for(&primary_path))],
        )
        .await?;

        let context = payload.get(&primary.name).cloned().unwrap_or(Value::Null);
        if !context.is_object() {
            return Err(FetchError::Malformed(format!(
                "'{}' is not a JSON object",
                primary.name
            )));
        }

        let mut calls = Vec::with_capacity(rest.len());
        for resource in rest {
            match expand_path(&resource.path, &item.id, &context) {
                Some(path) => calls.push(SubResource {
                    name: resource.name.clone(),
                    url: self.url_for(&path),
                    required: resource.required,
                }),
                None if resource.required => {
                    return Err(FetchError::Malformed(format!(
                        "cannot resolve placeholders in '{}'",
                        resource.path
                    )))
                }
                None => {
                    tracing::debug!("Skipping '{}' for {}: unresolved placeholder", resource.name, item.id);
                    payload.insert(resource.name.clone(), Value::Null);
                }
            }
        }

        payload.extend(fetch_sub_resources(&self.client, &calls).await?);
        Ok(Value::Object(payload))
    }
}

/// Expands `{id}` and `{field.path}` placeholders in a resource path
///
/// Field paths are looked up in `context` with `.` separating object keys. Only
/// string and number values substitute; anything else leaves the path unresolved.
fn expand_path(path: &str, id: &str, context: &Value) -> Option<String> {
    let mut expanded = String::with_capacity(path.len() + id.len());
    let mut rest = path;

    while let Some(start) = rest.find('{') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}')?;
        let name = &after[..end];

        if name == "id" {
            expanded.push_str(id);
        } else {
            let value = name
                .split('.')
                .try_fold(context, |value, key| value.get(key))?;
            match value {
                Value::String(s) if !s.is_empty() => expanded.push_str(s),
                Value::Number(n) => expanded.push_str(&n.to_string()),
                _ => return None,
            }
        }
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Some(expanded)
}
