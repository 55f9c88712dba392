//! Prerequisite objects for scenario clusters
//!
//! Every sample cluster mounts the TLS/feature-key secret and wires its admin
//! user to the auth secret, so both must exist in the namespace first. The
//! operator reads config schemas from the `config-schemas` config map.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::{ByteString, NamespaceResourceScope};
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use settle_common::fixtures::{
    Fixtures, AUTH_SECRET_NAME, SCHEMA_CONFIG_MAP_NAME, TLS_SECRET_NAME,
};
use settle_common::{LABEL_APP, LABEL_APP_VALUE};
use settle_verify::CleanupRegistry;

use crate::Result;

/// Key the operator reads the admin password from
pub const PASSWORD_KEY: &str = "password";

fn labeled_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            LABEL_APP.to_string(),
            LABEL_APP_VALUE.to_string(),
        )])),
        ..Default::default()
    }
}

fn opaque_secret(name: &str, namespace: &str, data: BTreeMap<String, ByteString>) -> Secret {
    Secret {
        metadata: labeled_meta(name, namespace),
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// Secret holding every loaded secret file, keyed by file name
pub fn tls_secret(namespace: &str, fixtures: &Fixtures) -> Secret {
    let data = fixtures
        .secrets
        .iter()
        .map(|(name, bytes)| (name.clone(), ByteString(bytes.clone())))
        .collect();
    opaque_secret(TLS_SECRET_NAME, namespace, data)
}

/// Secret holding the admin password
pub fn auth_secret(namespace: &str, password: &str) -> Secret {
    let data = BTreeMap::from([(
        PASSWORD_KEY.to_string(),
        ByteString(password.as_bytes().to_vec()),
    )]);
    opaque_secret(AUTH_SECRET_NAME, namespace, data)
}

/// Config map holding every loaded schema file, keyed by file name
pub fn schema_config_map(namespace: &str, fixtures: &Fixtures) -> ConfigMap {
    ConfigMap {
        metadata: labeled_meta(SCHEMA_CONFIG_MAP_NAME, namespace),
        data: Some(fixtures.schemas.clone()),
        ..Default::default()
    }
}

/// Create the schema config map and both secrets, registering each object
/// this run created for cleanup
///
/// Objects that already exist are left alone and not registered.
pub async fn install_fixtures(
    client: &Client,
    namespace: &str,
    fixtures: &Fixtures,
    admin_password: &str,
    registry: &CleanupRegistry,
) -> Result<()> {
    create_owned(client, namespace, schema_config_map(namespace, fixtures), registry).await?;
    for secret in [tls_secret(namespace, fixtures), auth_secret(namespace, admin_password)] {
        create_owned(client, namespace, secret, registry).await?;
    }
    Ok(())
}

async fn create_owned<K>(
    client: &Client,
    namespace: &str,
    object: K,
    registry: &CleanupRegistry,
) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let name = object.name_any();
    let kind = K::kind(&K::DynamicType::default()).to_string();

    match api.create(&PostParams::default(), &object).await {
        Ok(_) => {
            info!(kind = %kind, name = %name, namespace = %namespace, "Created fixture object");
            registry.register(format!("{kind} {namespace}/{name}"), move || {
                let api = api.clone();
                let name = name.clone();
                async move {
                    match api.delete(&name, &DeleteParams::default()).await {
                        Ok(_) => Ok(()),
                        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                        Err(e) => Err(settle_common::Error::from(e)),
                    }
                }
            });
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            info!(kind = %kind, name = %name, namespace = %namespace, "Already exists, reusing it");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
