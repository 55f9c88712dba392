//! Test fixtures: read-only file data and sample cluster resources
//!
//! Schema and secret files are loaded once at process start and shared by
//! `Arc` afterwards. Nothing mutates them once installed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use kube::api::ObjectMeta;
use tracing::{debug, info};

use crate::crd::{
    AccessControlSpec, ConfigSecretSpec, DatabaseCluster, DatabaseClusterSpec, ResourceSpec,
    StorageSpec, UserSpec, VolumeInitMethod, VolumeMode, VolumePolicy, VolumeSpec,
};
use crate::{Error, Result, LABEL_APP, LABEL_APP_VALUE};

/// Secret holding TLS material and feature keys, mounted into every node
pub const TLS_SECRET_NAME: &str = "aerospike-secret";

/// Config map holding the database config schemas, one key per file
pub const SCHEMA_CONFIG_MAP_NAME: &str = "config-schemas";

/// Secret holding the admin user's password
pub const AUTH_SECRET_NAME: &str = "auth";

/// Mount path of the TLS secret inside the container
pub const SECRET_MOUNT_PATH: &str = "/etc/aerospike/secret";

static INSTALLED: OnceLock<Arc<Fixtures>> = OnceLock::new();

/// File contents loaded from the schema and secret directories
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fixtures {
    /// Config schema files by file name
    pub schemas: BTreeMap<String, String>,
    /// Secret files by file name
    pub secrets: BTreeMap<String, Vec<u8>>,
}

impl Fixtures {
    /// Load every regular file of both directories (not recursive)
    pub fn load(schema_dir: &Path, secret_dir: &Path) -> Result<Self> {
        let schemas = read_dir_files(schema_dir)?
            .into_iter()
            .map(|(name, bytes)| {
                String::from_utf8(bytes)
                    .map(|text| (name.clone(), text))
                    .map_err(|_| {
                        Error::fixture(
                            schema_dir.display().to_string(),
                            format!("{name} is not UTF-8"),
                        )
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let secrets = read_dir_files(secret_dir)?;

        info!(
            schemas = schemas.len(),
            secrets = secrets.len(),
            "Loaded fixtures"
        );
        Ok(Self { schemas, secrets })
    }

    /// Install as the process-wide fixture set
    ///
    /// Fails if fixtures were already installed; they are never re-initialized
    /// mid-run.
    pub fn install(self) -> Result<Arc<Fixtures>> {
        let fixtures = Arc::new(self);
        INSTALLED
            .set(fixtures.clone())
            .map_err(|_| Error::fixture("process", "fixtures already installed"))?;
        Ok(fixtures)
    }
}

fn read_dir_files(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let path = dir.display().to_string();
    let entries = std::fs::read_dir(dir).map_err(|e| Error::fixture(&path, e.to_string()))?;

    let mut files = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::fixture(&path, e.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|e| Error::fixture(&path, e.to_string()))?;
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let bytes = std::fs::read(entry.path())
            .map_err(|e| Error::fixture(&path, format!("wrong file {name}: {e}")))?;
        debug!(file = %name, dir = %path, "Read fixture file");
        files.insert(name, bytes);
    }

    if files.is_empty() {
        return Err(Error::fixture(path, "no files available"));
    }
    Ok(files)
}

// =============================================================================
// Sample clusters
// =============================================================================

/// A cluster with one block and one filesystem volume, 200m CPU and 1Gi
/// memory per node, and the admin user wired to the auth secret
pub fn sample_cluster(name: &str, namespace: &str, size: i32, image: &str) -> DatabaseCluster {
    let spec = DatabaseClusterSpec {
        size,
        image: image.to_string(),
        storage: StorageSpec {
            block_volume_policy: VolumePolicy {
                init_method: None,
                cascade_delete: Some(true),
            },
            filesystem_volume_policy: VolumePolicy {
                init_method: Some(VolumeInitMethod::DeleteFiles),
                cascade_delete: Some(true),
            },
            volumes: vec![
                VolumeSpec::new("/test/dev/xvdf", 1, "ssd", VolumeMode::Block),
                VolumeSpec::new("/opt/aerospike", 1, "ssd", VolumeMode::Filesystem),
            ],
        },
        access_control: Some(AccessControlSpec {
            users: vec![UserSpec {
                name: "admin".to_string(),
                secret_name: AUTH_SECRET_NAME.to_string(),
                roles: vec!["sys-admin".to_string(), "user-admin".to_string()],
            }],
        }),
        config_secret: ConfigSecretSpec {
            secret_name: TLS_SECRET_NAME.to_string(),
            mount_path: SECRET_MOUNT_PATH.to_string(),
        },
        multi_pod_per_host: true,
        resources: Some(ResourceSpec::guaranteed("200m", "1Gi")),
        rack_config: None,
        config: sample_config(),
    };

    let mut cluster = DatabaseCluster::new(name, spec);
    cluster.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            LABEL_APP.to_string(),
            LABEL_APP_VALUE.to_string(),
        )])),
        ..Default::default()
    };
    cluster
}

fn sample_config() -> BTreeMap<String, serde_json::Value> {
    BTreeMap::from([
        (
            "service".to_string(),
            serde_json::json!({
                "feature-key-file": format!("{SECRET_MOUNT_PATH}/features.conf"),
                "proto-fd-max": 15000
            }),
        ),
        (
            "security".to_string(),
            serde_json::json!({ "enable-security": true }),
        ),
        (
            "namespaces".to_string(),
            serde_json::json!([{
                "name": "test",
                "memory-size": 1000955200,
                "replication-factor": 1,
                "storage-engine": {
                    "type": "device",
                    "devices": ["/test/dev/xvdf"]
                }
            }]),
        ),
    ])
}
