//! Kubernetes adapter: TLS bindings from `networking.k8s.io/v1` Ingresses.

use crate::EndpointSource;
use async_trait::async_trait;
use certmon_core::{Endpoint, SourceError, TlsBinding};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::{debug, warn};

pub struct KubeIngressSource {
    client: Client,
    cluster_name: String,
}

impl KubeIngressSource {
    pub fn new(client: Client, cluster_name: impl Into<String>) -> Self {
        KubeIngressSource { client, cluster_name: cluster_name.into() }
    }

    /// Build a client from an explicit kubeconfig, or infer one (in-cluster
    /// service account, then the default kubeconfig) when no path is given.
    pub async fn connect(kubeconfig: Option<&Path>, cluster_name: impl Into<String>) -> Result<Self, SourceError> {
        let client = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path).map_err(SourceError::new)?;
                let config = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(SourceError::new)?;
                Client::try_from(config).map_err(SourceError::new)?
            }
            None => Client::try_default().await.map_err(SourceError::new)?,
        };
        Ok(KubeIngressSource::new(client, cluster_name))
    }
}

#[async_trait]
impl EndpointSource for KubeIngressSource {
    async fn list_bindings(&self) -> Result<Vec<TlsBinding>, SourceError> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(SourceError::new)?;
        debug!(ingresses = list.items.len(), "listed ingresses");
        Ok(list.items.iter().flat_map(|i| bindings_from_ingress(&self.cluster_name, i)).collect())
    }
}

/// One binding per `spec.tls` entry. Hosts that do not parse as `host[:port]`
/// are logged and left out.
pub fn bindings_from_ingress(cluster_name: &str, ingress: &Ingress) -> Vec<TlsBinding> {
    let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
    let name = ingress.metadata.name.clone().unwrap_or_default();
    let Some(tls) = ingress.spec.as_ref().and_then(|s| s.tls.as_ref()) else {
        return Vec::new();
    };
    tls.iter()
        .map(|entry| {
            let endpoints = entry
                .hosts
                .iter()
                .flatten()
                .filter_map(|host| match Endpoint::parse(host) {
                    Ok(e) => Some(e),
                    Err(err) => {
                        warn!(ingress = %format!("{}/{}", namespace, name), host = %host, error = %err, "skipping unparsable tls host");
                        None
                    }
                })
                .collect();
            TlsBinding {
                cluster_name: cluster_name.to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
                secret_name: entry.secret_name.clone().unwrap_or_default(),
                endpoints,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::{IngressSpec, IngressTLS};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn ingress(name: &str, tls: Option<Vec<IngressTLS>>) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(format!("ns-{}", name)),
                ..Default::default()
            },
            spec: Some(IngressSpec { tls, ..Default::default() }),
            ..Default::default()
        }
    }

    fn tls(hosts: &[&str], secret: &str) -> IngressTLS {
        IngressTLS {
            hosts: Some(hosts.iter().map(|h| h.to_string()).collect()),
            secret_name: Some(secret.into()),
        }
    }

    #[test]
    fn one_binding_per_tls_entry() {
        let ing = ingress("web", Some(vec![tls(&["a.com", "b.com"], "s1"), tls(&["c.com"], "s2")]));
        let bindings = bindings_from_ingress("prod", &ing);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].cluster_name, "prod");
        assert_eq!(bindings[0].namespace, "ns-web");
        assert_eq!(bindings[0].name, "web");
        assert_eq!(bindings[0].secret_name, "s1");
        assert_eq!(bindings[0].hosts(), vec!["a.com:443", "b.com:443"]);
        assert_eq!(bindings[1].secret_name, "s2");
    }

    #[test]
    fn ingress_without_tls_yields_nothing() {
        assert!(bindings_from_ingress("prod", &ingress("plain", None)).is_empty());
        assert!(bindings_from_ingress("prod", &ingress("empty", Some(vec![]))).is_empty());
    }

    #[test]
    fn tls_entry_without_hosts_keeps_binding() {
        let ing = ingress("nohosts", Some(vec![IngressTLS { hosts: None, secret_name: Some("s".into()) }]));
        let bindings = bindings_from_ingress("prod", &ing);
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].endpoints.is_empty());
    }

    #[test]
    fn encoded_ports_and_bad_hosts() {
        let ing = ingress("ports", Some(vec![tls(&["a.com:8443", "b.com:0", "*.c.com"], "s")]));
        let bindings = bindings_from_ingress("prod", &ing);
        assert_eq!(bindings[0].hosts(), vec!["a.com:8443", "*.c.com:443"]);
    }
}
