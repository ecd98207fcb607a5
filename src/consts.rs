//! Names and defaults shared by the registry, the manager, and the CLI

pub const NAME: &str = "ripfs";

/// Secret holding the naming key of the cluster's name map
pub const CID_MAPPER_SECRET_NAME: &str = "ripfs-cid-mapper";

/// Field within [CID_MAPPER_SECRET_NAME] that stores the naming key
pub const CID_MAPPER_SECRET_KEY: &str = "ipns-cid";

pub const DEFAULT_NAMESPACE: &str = "ripfs-system";

/// Registry prefix that relocated pod images are pulled from
///
/// The registry only serves repositories under `ipfs/`, so a relocated image
/// `<prefix>/<cid>` lands on `/v2/ipfs/<cid>/...`.
pub const DEFAULT_REGISTRY_HOST: &str = "localhost:31609/ipfs";

pub const DEFAULT_REGISTRY_ADDRESS: &str = "0.0.0.0:5050";
pub const DEFAULT_WEBHOOK_ADDRESS: &str = "0.0.0.0:9443";
pub const DEFAULT_IPFS_API: &str = "http://127.0.0.1:5001";
pub const DEFAULT_CERTS_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";

pub const MUTATE_PATH: &str = "/mutate";

/// Per-request budget for resolving every image in one pod
pub const ADMISSION_TIMEOUT_SECS: u64 = 10;
