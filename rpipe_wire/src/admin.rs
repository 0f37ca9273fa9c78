use crate::version::Version;
use serde::{Deserialize, Serialize};

/// The JSON document an admin client signs.
///
/// The serialized bytes of this message are exactly what the signature
/// covers; the server verifies those bytes verbatim, so no canonical form
/// beyond "the bytes that were sent" is needed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminMessage {
    /// Request path, e.g. `/admin/debug`.
    pub path: String,
    /// Command payload; empty for commands that take none.
    pub body: String,
    /// Single-use nonce previously issued by `/admin/uid`.
    pub uid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("admin envelope is missing a section")]
    Truncated,
    #[error("admin envelope signature is not valid base85")]
    BadSignature,
    #[error("admin message is not valid JSON: {0}")]
    BadMessage(#[from] serde_json::Error),
}

/// The admin POST body: `version\n<base85 signature>\n<message json>`.
#[derive(Clone, Debug)]
pub struct AdminEnvelope {
    pub version: Version,
    pub signature: Vec<u8>,
    /// Raw serialized [`AdminMessage`] bytes, kept as sent for verification.
    pub message: Vec<u8>,
}

impl AdminEnvelope {
    pub fn encode(version: &Version, signature: &[u8], message: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(message.len() + 96);
        out.extend_from_slice(version.as_str().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(base85::encode(signature).as_bytes());
        out.push(b'\n');
        out.extend_from_slice(message);
        out
    }

    pub fn decode(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let mut sections = raw.splitn(3, |b| *b == b'\n');
        let version = sections.next().ok_or(EnvelopeError::Truncated)?;
        let signature = sections.next().ok_or(EnvelopeError::Truncated)?;
        let message = sections.next().ok_or(EnvelopeError::Truncated)?;
        let signature = base85::decode(&String::from_utf8_lossy(signature))
            .map_err(|_| EnvelopeError::BadSignature)?;
        Ok(Self {
            version: Version::parse(&String::from_utf8_lossy(version)),
            signature,
            message: message.to_vec(),
        })
    }

    pub fn parse_message(&self) -> Result<AdminMessage, EnvelopeError> {
        Ok(serde_json::from_slice(&self.message)?)
    }
}
