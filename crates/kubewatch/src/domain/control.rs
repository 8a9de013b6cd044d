//! Control-plane signals carried by cluster-modify secrets.

use core::error::Error;
use std::str::FromStr;

use error_stack::Report;
use k8s_openapi::api::core::v1::Secret;

/// Secret type reserved for cluster add/update/delete requests.
pub const CLUSTER_MODIFY_SECRET_TYPE: &str = "cluster.request/modify";

const ACTION_KEY: &str = "action";
const CLUSTER_ID_KEY: &str = "cluster_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Add,
    Update,
    Delete,
}

impl FromStr for ControlAction {
    type Err = Report<ControlSignalError>;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "add" => Ok(ControlAction::Add),
            "update" => Ok(ControlAction::Update),
            "delete" => Ok(ControlAction::Delete),
            other => Err(Report::new(ControlSignalError::InvalidAction {
                value: other.to_string(),
            })),
        }
    }
}

/// A decoded cluster-modify request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSignal {
    pub action: ControlAction,
    pub cluster_id: i64,
}

#[derive(Debug, derive_more::Display)]
pub enum ControlSignalError {
    #[display("Secret is missing data key {key}")]
    MissingKey { key: &'static str },
    #[display("Secret data key {key} is not valid UTF-8")]
    NotUtf8 { key: &'static str },
    #[display("Unknown cluster action {value:?}")]
    InvalidAction { value: String },
    #[display("Malformed cluster id {value:?}")]
    InvalidClusterId { value: String },
}

impl Error for ControlSignalError {}

/// Whether the secret carries the reserved control-plane type.
pub fn is_cluster_modify_secret(secret: &Secret) -> bool {
    secret.type_.as_deref() == Some(CLUSTER_MODIFY_SECRET_TYPE)
}

impl ControlSignal {
    /// Decodes a control signal from a secret.
    ///
    /// Returns `Ok(None)` for secrets of any other type; they never mutate the cluster
    /// plan.
    ///
    /// # Errors
    ///
    /// - [`ControlSignalError`] when a reserved-type secret has missing or malformed data
    pub fn from_secret(secret: &Secret) -> Result<Option<Self>, Report<ControlSignalError>> {
        if !is_cluster_modify_secret(secret) {
            return Ok(None);
        }

        let action = data_value(secret, ACTION_KEY)?.parse::<ControlAction>()?;
        let raw_id = data_value(secret, CLUSTER_ID_KEY)?;
        let cluster_id = raw_id.trim().parse::<i64>().map_err(|e| {
            Report::new(ControlSignalError::InvalidClusterId {
                value: raw_id.to_string(),
            })
            .attach_printable(e.to_string())
        })?;

        Ok(Some(Self { action, cluster_id }))
    }
}

fn data_value<'a>(
    secret: &'a Secret,
    key: &'static str,
) -> Result<&'a str, Report<ControlSignalError>> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Report::new(ControlSignalError::MissingKey { key }))?;

    std::str::from_utf8(&bytes.0).map_err(|_| Report::new(ControlSignalError::NotUtf8 { key }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    pub(crate) fn secret(type_: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("cluster-event".to_string()),
                namespace: Some("devtroncd".to_string()),
                resource_version: Some("1".to_string()),
                ..Default::default()
            },
            type_: Some(type_.to_string()),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }
}
