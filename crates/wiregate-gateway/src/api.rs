//! API descriptor served to clients for stub generation.
//!
//! The descriptor lists every handler with its methods and argument counts.
//! When a client supplies a challenge, the descriptor is published together
//! with both public keys and a signature over `challenge ‖ keyEnc ‖ keyVer`
//! so the client can detect substituted keys.

use serde::{Deserialize, Serialize};
use wiregate_crypto::{KeyStore, SignatureFormat, TextEncoding};

use crate::registry::HandlerRegistry;
use crate::Result;

/// One method as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMethod {
    pub name: String,
    pub len: usize,
    /// Present (and `false`) only for methods exempt from encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
}

/// One handler as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAction {
    pub namespace: String,
    pub action: String,
    pub paths: Vec<String>,
    pub methods: Vec<ApiMethod>,
}

/// The full descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiDescriptor {
    pub actions: Vec<ApiAction>,
}

/// Descriptor published with the public keys, signed when challenged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedApi {
    pub api: ApiDescriptor,
    pub key_enc: String,
    pub key_ver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ApiDescriptor {
    /// Describe every registered handler, in registration order.
    pub fn build(registry: &HandlerRegistry) -> Self {
        let actions = registry
            .handlers()
            .iter()
            .map(|handler| ApiAction {
                namespace: handler.namespace.clone(),
                action: handler.action.clone(),
                paths: handler.paths.clone(),
                methods: handler
                    .methods
                    .iter()
                    .map(|method| ApiMethod {
                        name: method.name.clone(),
                        len: method.len(),
                        encrypt: (!method.encrypt).then_some(false),
                    })
                    .collect(),
            })
            .collect();
        Self { actions }
    }

    /// Number of handlers described.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no handlers are described.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Publish with the public keys, signing over `challenge` when given.
    pub fn signed(self, keys: &KeyStore, challenge: Option<&str>) -> Result<SignedApi> {
        let key_enc = keys.encryption_public_key();
        let key_ver = keys.signing_public_key()?;

        let (challenge, signature) = match challenge.filter(|c| !c.is_empty()) {
            Some(challenge) => {
                let signature =
                    keys.sign_challenge(challenge, SignatureFormat::Raw, TextEncoding::Base64)?;
                (Some(challenge.to_string()), Some(signature))
            }
            None => (None, None),
        };

        Ok(SignedApi {
            api: self,
            key_enc,
            key_ver,
            challenge,
            signature,
        })
    }
}
