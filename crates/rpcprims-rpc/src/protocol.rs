//! Request and response envelopes.
//!
//! Both travel as one frame each, serialized with the connection's
//! [`Codec`](rpcprims_codec::Codec). Arguments and the return value are
//! serialized individually with the same codec, so the envelope stays
//! independent of the service's types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RpcError};

/// Fresh correlation id. Ids are random UUIDs and never reused.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// One invocation of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: String,
    pub target_interface: String,
    pub implementation_ref: String,
    pub method_name: String,
    /// Declared parameter types; part of the method's dispatch key.
    pub parameter_types: Vec<String>,
    /// Serialized arguments, one per parameter type.
    pub arguments: Vec<Vec<u8>>,
}

impl Request {
    /// Build a request with a fresh correlation id.
    pub fn new(
        target_interface: impl Into<String>,
        implementation_ref: impl Into<String>,
        method_name: impl Into<String>,
        parameter_types: Vec<String>,
        arguments: Vec<Vec<u8>>,
    ) -> Result<Self> {
        let request = Self {
            correlation_id: new_correlation_id(),
            target_interface: target_interface.into(),
            implementation_ref: implementation_ref.into(),
            method_name: method_name.into(),
            parameter_types,
            arguments,
        };
        request
            .validate()
            .map_err(|fault| RpcError::InvalidRequest(fault.message))?;
        Ok(request)
    }

    /// Check the envelope invariants. Run again by the server before dispatch.
    pub fn validate(&self) -> std::result::Result<(), RpcFault> {
        if self.parameter_types.len() != self.arguments.len() {
            return Err(RpcFault::new(
                FaultKind::BadRequest,
                format!(
                    "{} parameter type(s) but {} argument(s)",
                    self.parameter_types.len(),
                    self.arguments.len()
                ),
            ));
        }
        if self.method_name.is_empty() {
            return Err(RpcFault::new(FaultKind::BadRequest, "empty method name"));
        }
        Ok(())
    }
}

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Unknown implementation, unknown method or signature mismatch.
    Dispatch,
    /// The implementation itself failed.
    Application,
    /// The request was malformed (argument count, undecodable argument).
    BadRequest,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Dispatch => "dispatch",
            FaultKind::Application => "application",
            FaultKind::BadRequest => "bad request",
        })
    }
}

/// Error half of a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    pub kind: FaultKind,
    pub message: String,
}

impl RpcFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Dispatch, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(FaultKind::BadRequest, message)
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RpcFault {}

/// Answer to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: String,
    /// Serialized return value, or the fault.
    pub outcome: std::result::Result<Vec<u8>, RpcFault>,
}

impl Response {
    pub fn ok(correlation_id: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Ok(value),
        }
    }

    pub fn fault(correlation_id: impl Into<String>, fault: RpcFault) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Err(fault),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The serialized return value, or the fault as an [`RpcError::Remote`].
    pub fn into_value(self) -> Result<Vec<u8>> {
        self.outcome.map_err(RpcError::from)
    }
}
