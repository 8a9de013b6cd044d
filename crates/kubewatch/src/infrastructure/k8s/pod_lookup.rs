use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::Client;

use crate::domain::workflow::PodLookup;
use crate::infrastructure::k8s::KubernetesError;

/// Live pod GET against one cluster.
pub struct KubePodLookup {
    client: Client,
}

impl KubePodLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PodLookup for KubePodLookup {
    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Pod>, Report<KubernetesError>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .change_context(KubernetesError::PodLookupFailed {
                pod_name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }
}
