// Deferred call payload: what a callable job carries to its future process

use crate::domain::error::ProtocolError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::collections::BTreeMap;

pub type PositionalArgs = Vec<Value>;
pub type Kwargs = BTreeMap<String, Value>;

const NAME_MARKER: &str = "name";
const OBJECT_MARKER: &str = "object";
const MARKER_SEPARATOR: char = ';';

/// What the deferred process should call
///
/// Exactly one form is ever present; building a target from raw parts with
/// both or neither form fails immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// Dotted path of a registered callable, e.g. `fs.touch`
    Name(String),
    /// Serialized task object, rebuilt through its registered type
    Object(Vec<u8>),
}

impl CallTarget {
    /// Reference a callable by dotted path
    pub fn name(path: impl Into<String>) -> Result<Self, ProtocolError> {
        let path = path.into();
        validate_name(&path)?;
        Ok(CallTarget::Name(path))
    }

    pub fn from_parts(
        name: Option<String>,
        object: Option<Vec<u8>>,
    ) -> Result<Self, ProtocolError> {
        match (name, object) {
            (Some(_), Some(_)) => Err(ProtocolError::MultipleTargets),
            (None, None) => Err(ProtocolError::MissingTarget),
            (Some(name), None) => CallTarget::name(name),
            (None, Some(object)) => Ok(CallTarget::Object(object)),
        }
    }

    /// The bootstrap snippet naming this target, e.g. `name=fs.touch`
    pub fn to_snippet(&self) -> String {
        match self {
            CallTarget::Name(path) => format!("{}={}", NAME_MARKER, path),
            CallTarget::Object(bytes) => format!("{}={}", OBJECT_MARKER, STANDARD.encode(bytes)),
        }
    }

    /// Read a bootstrap snippet back
    ///
    /// Markers are `;`-separated `key=value` pairs. Exactly one of `name` and
    /// `object` must be present and nothing else.
    pub fn from_snippet(snippet: &str) -> Result<Self, ProtocolError> {
        let mut markers: BTreeMap<&str, &str> = BTreeMap::new();
        for marker in snippet.split(MARKER_SEPARATOR).filter(|m| !m.is_empty()) {
            let (key, value) = marker
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedMarker(marker.to_string()))?;
            if markers.insert(key, value).is_some() {
                return Err(ProtocolError::DuplicateMarker(key.to_string()));
            }
        }

        let name = markers.remove(NAME_MARKER).map(str::to_string);
        let object = markers
            .remove(OBJECT_MARKER)
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map_err(|e| ProtocolError::Encoding(format!("object target: {}", e)))
            })
            .transpose()?;

        let target = CallTarget::from_parts(name, object)?;
        if let Some(key) = markers.keys().next() {
            return Err(ProtocolError::UnexpectedMarker(key.to_string()));
        }
        Ok(target)
    }
}

/// `segment(.segment)*`, each segment `[A-Za-z_][A-Za-z0-9_]*`
fn validate_name(path: &str) -> Result<(), ProtocolError> {
    let valid_segment = |segment: &str| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if path.split('.').all(valid_segment) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidName(path.to_string()))
    }
}

/// A callable plus the arguments it will be called with
#[derive(Debug, Clone, PartialEq)]
pub struct CallablePayload {
    pub target: CallTarget,
    pub args: PositionalArgs,
    pub kwargs: Kwargs,
}

impl CallablePayload {
    pub fn new(target: CallTarget) -> Self {
        Self {
            target,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Encode `(args, kwargs)` as one shell-safe token
    ///
    /// JSON, then standard base64: the alphabet (`A-Za-z0-9+/=`) is entirely
    /// in the shell-safe set, so the token is never quoted.
    pub fn encode_arguments(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_vec(&(&self.args, &self.kwargs))?;
        Ok(STANDARD.encode(json))
    }

    /// Inverse of [`CallablePayload::encode_arguments`]
    pub fn decode_arguments(blob: &str) -> Result<(PositionalArgs, Kwargs), ProtocolError> {
        let json = STANDARD
            .decode(blob.trim())
            .map_err(|e| ProtocolError::Encoding(format!("arguments: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}
