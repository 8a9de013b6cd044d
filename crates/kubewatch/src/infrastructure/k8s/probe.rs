//! Checks whether a cluster serves the custom resources a client type needs.

use error_stack::Report;
use kube::Client;
use tracing::debug;

use crate::domain::client_type::RequiredResource;
use crate::infrastructure::k8s::KubernetesError;

/// Whether `resource` is served by the cluster behind `client`.
///
/// A missing API group is reported as `Ok(false)`; only transport failures are errors.
///
/// # Errors
///
/// - [`KubernetesError::DiscoveryFailed`] if the discovery request fails for any other
///   reason than the group being absent
pub async fn serves_resource(
    client: &Client,
    resource: RequiredResource,
) -> Result<bool, Report<KubernetesError>> {
    match client.list_api_group_resources(resource.api_version).await {
        Ok(list) => Ok(list.resources.iter().any(|r| r.name == resource.plural)),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            debug!(api_version = resource.api_version, "API group not served");
            Ok(false)
        }
        Err(e) => Err(Report::new(KubernetesError::DiscoveryFailed {
            api_version: resource.api_version.to_string(),
        })
        .attach_printable(e.to_string())),
    }
}
