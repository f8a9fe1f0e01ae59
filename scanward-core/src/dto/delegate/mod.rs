//! Product delegate wire contract
//!
//! Field names follow the delegate server's camelCase JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::executor::DelegateState;
use crate::domain::message::{JobMessage, MessageLevel};

/// Protocol version sent with every create request
pub const DELEGATE_API_VERSION: &str = "1.0";

/// Key/value parameter passed to the remote product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateParameter {
    pub key: String,
    pub value: String,
}

/// Body of `POST /api/job/create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateJobCreateRequest {
    pub api_version: String,
    #[serde(rename = "parentJobUUID")]
    pub parent_job_uuid: Uuid,
    pub product_id: String,
    pub parameters: Vec<DelegateParameter>,
}

impl DelegateJobCreateRequest {
    /// Builds a create request, merging executor and job parameters
    ///
    /// Job parameters win over executor parameters with the same key.
    pub fn new(
        parent_job_uuid: Uuid,
        product_id: impl Into<String>,
        executor_parameters: &BTreeMap<String, String>,
        job_parameters: &BTreeMap<String, String>,
    ) -> Self {
        let mut merged = executor_parameters.clone();
        merged.extend(job_parameters.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            api_version: DELEGATE_API_VERSION.to_string(),
            parent_job_uuid,
            product_id: product_id.into(),
            parameters: merged
                .into_iter()
                .map(|(key, value)| DelegateParameter { key, value })
                .collect(),
        }
    }
}

/// Response of `POST /api/job/create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateJobCreateResponse {
    #[serde(rename = "jobUUID")]
    pub job_uuid: Uuid,
}

/// Response of `GET /api/job/{id}/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateJobStatus {
    #[serde(rename = "jobUUID")]
    pub job_uuid: Uuid,
    pub state: DelegateState,
}

/// A single message reported by a delegate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateMessage {
    #[serde(rename = "type")]
    pub level: MessageLevel,
    pub text: String,
}

impl From<DelegateMessage> for JobMessage {
    fn from(message: DelegateMessage) -> Self {
        JobMessage::new(message.level, message.text)
    }
}

/// Response of `GET /api/job/{id}/messages`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateMessages {
    #[serde(default)]
    pub messages: Vec<DelegateMessage>,
}
