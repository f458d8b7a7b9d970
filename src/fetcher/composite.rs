use crate::client::RateLimitedClient;
use crate::fetcher::FetchError;
use serde_json::{Map, Value};

/// One named call that contributes to a work item's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResource {
    pub name: String,
    pub url: String,
    pub required: bool,
}

impl SubResource {
    pub fn required(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            required: false,
        }
    }
}

/// Fetches a set of named sub-resources into one JSON object
///
/// A failing required sub-call fails the whole set. A failing optional sub-call
/// contributes `null` under its name. Quota deferral and pool exhaustion always
/// propagate, since no later call could succeed either.
///
/// # Arguments
///
/// * `client` - The client to issue the calls through
/// * `resources` - The calls to make, in order
///
/// # Returns
///
/// * `Ok(Map)` - One entry per resource name
/// * `Err(FetchError)` - A required call failed, or the run must stop
pub async fn fetch_sub_resources(
    client: &RateLimitedClient,
    resources: &[SubResource],
) -> Result<Map<String, Value>, FetchError> {
    let mut payload = Map::new();

    for resource in resources {
        let outcome = match client.get_json::<Value>(&resource.url).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FetchError::Malformed(format!("{}: {}", resource.name, e))),
            Err(e) => Err(FetchError::from(e)),
        };

        match outcome {
            Ok(value) => {
                payload.insert(resource.name.clone(), value);
            }
            Err(e) if resource.required || e.is_run_level() => return Err(e),
            Err(e) => {
                tracing::debug!("Optional resource '{}' unavailable: {}", resource.name, e);
                payload.insert(resource.name.clone(), Value::Null);
            }
        }
    }

    Ok(payload)
}
