use crate::transport::HttpRequest;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use core_types::Credential;

/// Builds the requests of the market-data protocol against one server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /login/{base64 user}/{base64 password}`
    pub fn login(&self, credential: &Credential) -> HttpRequest {
        json(HttpRequest::get(self.credential_path("login", credential)))
    }

    /// `GET /newuser/{base64 user}/{base64 password}`
    pub fn new_user(&self, credential: &Credential) -> HttpRequest {
        json(HttpRequest::get(self.credential_path("newuser", credential)))
    }

    /// `GET /klines/{sessionID}`
    pub fn klines(&self, session_id: i64) -> HttpRequest {
        json(HttpRequest::get(format!("{}/klines/{}", self.base_url, session_id)))
    }

    /// `GET /data/{sessionID}`
    pub fn data(&self, session_id: i64) -> HttpRequest {
        json(HttpRequest::get(format!("{}/data/{}", self.base_url, session_id)))
    }

    /// `POST /config/{sessionID}` with a JSON body.
    pub fn config(&self, session_id: i64, body: Vec<u8>) -> HttpRequest {
        json(HttpRequest::post(
            format!("{}/config/{}", self.base_url, session_id),
            body,
        ))
    }

    fn credential_path(&self, verb: &str, credential: &Credential) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            verb,
            STANDARD.encode(credential.wire_user()),
            STANDARD.encode(credential.wire_password()),
        )
    }
}

fn json(request: HttpRequest) -> HttpRequest {
    request.with_header("Content-Type", "application/json")
}
