//! Port-forward through the Kubernetes API server

use super::{async_trait, ForwardStream, PortForwarder, TunnelError};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::debug;

/// Forwards to a pod via the `pods/portforward` subresource (websocket upgrade)
pub struct KubePortForwarder {
    pods: Api<Pod>,
    namespace: String,
    pod_name: String,
}

impl KubePortForwarder {
    pub fn new(client: Client, namespace: &str, pod_name: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            pod_name: pod_name.to_string(),
        }
    }
}

#[async_trait]
impl PortForwarder for KubePortForwarder {
    fn target(&self) -> String {
        format!("{}/{}", self.namespace, self.pod_name)
    }

    async fn dial(&self, remote_port: u16) -> Result<Box<dyn ForwardStream>, TunnelError> {
        let mut forwarder = self
            .pods
            .portforward(&self.pod_name, &[remote_port])
            .await
            .map_err(|e| TunnelError::Dial {
                target: self.target(),
                message: e.to_string(),
            })?;

        let stream = forwarder
            .take_stream(remote_port)
            .ok_or(TunnelError::MissingStream(remote_port))?;

        // The forwarder task ends once the stream is dropped.
        let target = self.target();
        tokio::spawn(async move {
            if let Err(e) = forwarder.join().await {
                debug!(target_pod = %target, error = %e, "Port-forward session ended with error");
            }
        });

        Ok(Box::new(stream))
    }
}
