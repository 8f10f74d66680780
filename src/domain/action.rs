use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::connector::SecretRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Default for HttpVerb {
    fn default() -> Self {
        HttpVerb::Post
    }
}

impl HttpVerb {
    pub fn as_method(self) -> reqwest::Method {
        match self {
            HttpVerb::Get => reqwest::Method::GET,
            HttpVerb::Post => reqwest::Method::POST,
            HttpVerb::Put => reqwest::Method::PUT,
            HttpVerb::Patch => reqwest::Method::PATCH,
            HttpVerb::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub url: String,
    #[serde(default)]
    pub verb: HttpVerb,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub validator: Option<String>,
    #[serde(default)]
    pub credentials_secret: Option<SecretRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulerActionSpec {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub webhook: WebhookSpec,
}
