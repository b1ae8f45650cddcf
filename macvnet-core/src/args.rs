//! `CNI_ARGS` parsing
//!
//! The runtime passes pod metadata as `;`-separated `KEY=VALUE` pairs, e.g.
//! `IgnoreUnknown=1;K8S_POD_NAMESPACE=default;K8S_POD_NAME=nginx-test`.

use std::str::FromStr;

use crate::{Error, Result, WorkloadIdentity};

/// Key telling the plugin to tolerate keys it does not know
pub const IGNORE_UNKNOWN: &str = "IgnoreUnknown";
/// Pod namespace key
pub const K8S_POD_NAMESPACE: &str = "K8S_POD_NAMESPACE";
/// Pod name key
pub const K8S_POD_NAME: &str = "K8S_POD_NAME";
/// Sandbox container ID key
pub const K8S_POD_INFRA_CONTAINER_ID: &str = "K8S_POD_INFRA_CONTAINER_ID";

/// Parsed `CNI_ARGS`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CniArgs {
    /// `IgnoreUnknown` flag
    pub ignore_unknown: bool,
    /// Pod namespace
    pub pod_namespace: Option<String>,
    /// Pod name
    pub pod_name: Option<String>,
    /// Sandbox container ID
    pub infra_container_id: Option<String>,
}

impl CniArgs {
    /// Parse an argument string
    ///
    /// Unknown keys are skipped and so are empty segments (a trailing `;`).
    ///
    /// # Errors
    /// Returns error if a segment has no `=` or an empty key
    pub fn parse(raw: &str) -> Result<Self> {
        let mut args = Self::default();

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| Error::InvalidArgs {
                message: format!("expected KEY=VALUE, got {pair:?}"),
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidArgs {
                    message: format!("empty key in {pair:?}"),
                });
            }

            let value = value.trim();
            match key {
                IGNORE_UNKNOWN => {
                    args.ignore_unknown = matches!(value, "1" | "true" | "True" | "TRUE");
                }
                K8S_POD_NAMESPACE => args.pod_namespace = non_empty(value),
                K8S_POD_NAME => args.pod_name = non_empty(value),
                K8S_POD_INFRA_CONTAINER_ID => args.infra_container_id = non_empty(value),
                other => tracing::trace!(key = other, "Ignoring unknown CNI_ARGS key"),
            }
        }

        Ok(args)
    }

    /// Workload identity, if both pod namespace and pod name were given
    #[must_use]
    pub fn workload(&self) -> Option<WorkloadIdentity> {
        let namespace = self.pod_namespace.as_ref()?;
        let name = self.pod_name.as_ref()?;

        let mut identity = WorkloadIdentity::new(namespace, name);
        identity.infra_container_id.clone_from(&self.infra_container_id);
        Some(identity)
    }

    /// Workload identity, required
    ///
    /// # Errors
    /// Returns error naming the missing key
    pub fn require_workload(&self) -> Result<WorkloadIdentity> {
        if self.pod_namespace.is_none() {
            return Err(Error::InvalidArgs {
                message: format!("{K8S_POD_NAMESPACE} is required"),
            });
        }
        if self.pod_name.is_none() {
            return Err(Error::InvalidArgs {
                message: format!("{K8S_POD_NAME} is required"),
            });
        }
        self.workload().ok_or_else(|| Error::InvalidArgs {
            message: "workload identity is incomplete".to_string(),
        })
    }
}

impl FromStr for CniArgs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
