//! JSON objects in a bucket
//!
//! Thin wrapper over the SDK client shared by the log store and the DVIR
//! gate. Failures are reported as [`ObjectError`] and converted to the domain
//! error that fits the caller.

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;
use haulwatch_domain::hos::HosError;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure while reading or writing an object
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("S3 {operation} failed for key '{key}': {message}")]
    Request {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to read S3 object body for key '{key}': {message}")]
    Body { key: String, message: String },

    #[error("Object '{key}' is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode object '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ObjectError {
    fn request<E: std::error::Error>(operation: &'static str, key: &str, err: E) -> Self {
        Self::Request {
            operation,
            key: key.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    /// Report as a log-store failure
    pub fn into_storage(self) -> HosError {
        HosError::storage_failure(self.to_string())
    }

    /// Report as a DVIR gate failure
    pub fn into_gate(self) -> HosError {
        HosError::gate_failure(self.to_string())
    }
}

#[derive(Clone)]
pub(crate) struct Bucket {
    client: Client,
    name: String,
}

impl Bucket {
    pub(crate) fn new(client: Client, name: String) -> Self {
        Self { client, name }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn put_json<T>(&self, key: &str, value: &T) -> Result<(), ObjectError>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_vec(value).map_err(|source| ObjectError::Encode {
            key: key.to_string(),
            source,
        })?;
        debug!(key = %key, bucket = %self.name, size = body.len(), "Writing object to S3");

        self.client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(Bytes::from(body)))
            .send()
            .await
            .map_err(|err| ObjectError::request("put_object", key, err))?;
        Ok(())
    }

    pub(crate) async fn get_json<T>(&self, key: &str) -> Result<T, ObjectError>
    where
        T: DeserializeOwned + Send,
    {
        debug!(key = %key, bucket = %self.name, "Reading object from S3");

        let output = self
            .client
            .get_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectError::request("get_object", key, err))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|err| ObjectError::Body {
                key: key.to_string(),
                message: err.to_string(),
            })?
            .into_bytes();

        serde_json::from_slice(&data).map_err(|source| {
            warn!(key = %key, error = %source, "Stored object does not decode");
            ObjectError::Decode {
                key: key.to_string(),
                source,
            }
        })
    }

    pub(crate) async fn exists(&self, key: &str) -> Result<bool, ObjectError> {
        match self
            .client
            .head_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found()) =>
            {
                Ok(false)
            }
            Err(err) => Err(ObjectError::request("head_object", key, err)),
        }
    }

    /// Every key under `prefix`, in listing order, following continuation
    /// tokens
    pub(crate) async fn list_keys(
        &self,
        prefix: &str,
        start_after: Option<String>,
    ) -> Result<Vec<String>, ObjectError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.name)
                .prefix(prefix)
                .set_start_after(start_after.clone())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| ObjectError::request("list_objects_v2", prefix, err))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(prefix = %prefix, count = keys.len(), "Listed S3 keys");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_error_maps_to_domain_errors() {
        let err = ObjectError::Body {
            key: "segments/drv-1/x.json".to_string(),
            message: "connection reset".to_string(),
        };
        let storage = err.into_storage();
        assert!(matches!(storage, HosError::StorageFailure(_)));
        assert!(storage.to_string().contains("segments/drv-1/x.json"));

        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        let gate = ObjectError::Decode {
            key: "dvir/truck-1/1.json".to_string(),
            source: decode,
        }
        .into_gate();
        assert!(matches!(gate, HosError::GateFailure(_)));
    }
}
