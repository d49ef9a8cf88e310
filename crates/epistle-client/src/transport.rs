//! JSON-over-HTTP conversation store.
//!
//! [`HttpConvoService`] implements [`ConvoService`] and [`MessageSender`]
//! against the Epistle web API. It is a thin layer: requests are built from
//! the collaborator arguments, responses are decoded into the wire records of
//! `epistle-proto`. Retry policy belongs to the callers.
//!
//! # Endpoints
//!
//! | Operation | Route |
//! |---|---|
//! | last N messages | `POST {base}/convos/{id}/messages/last` |
//! | messages before an id | `POST {base}/convos/{id}/messages/before` |
//! | messages after an id | `POST {base}/convos/{id}/messages/after` |
//! | metadata | `POST {base}/convos/{id}/metadata` (`204` means none) |
//! | participant public keys | `POST {base}/users/keys` |
//! | send | `POST {base}/convos/{id}/messages` |
//!
//! A sent body is an `epistle-crypto` envelope: one sealed box per
//! participant, keyed by public key. The server relays it unchanged and every
//! participant's key opens its own entry.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use epistle_core::{
    ConvoAccess, ConvoMetadata, ConvoService, Message, MessageId, MessageSender, ServiceError,
};
use epistle_crypto::{PublicKey, seal_envelope};
use reqwest::{Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Sent as `User-Agent`.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("epistle-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Conversation store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConvoService {
    base_url: String,
    http: reqwest::Client,
}

impl HttpConvoService {
    /// Create a service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the URL is not http(s) or a timeout is zero
    /// - `Request` if the HTTP client cannot be built
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self, ServiceError> {
        if config.timeout.is_zero() || config.connect_timeout.is_zero() {
            return Err(ServiceError::InvalidRequest { reason: "timeouts must be non-zero".into() });
        }
        let base_url = validated_base(base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(request_error)?;
        Ok(Self { base_url, http })
    }

    /// Normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn convo_url(&self, convo_id: &str, route: &str) -> String {
        format!("{}/convos/{}/{route}", self.base_url, path_segment(convo_id))
    }

    async fn post_json<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        url: String,
        body: &Req,
    ) -> Result<Resp, ServiceError> {
        let response = self.http.post(url).json(body).send().await.map_err(request_error)?;
        let response = check_status(response)?;
        response.json().await.map_err(|e| ServiceError::Decode { reason: e.to_string() })
    }

    async fn participant_keys(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, PublicKey>, ServiceError> {
        let encoded: HashMap<String, String> =
            self.post_json(format!("{}/users/keys", self.base_url), &KeysRequest { user_ids }).await?;

        encoded
            .into_iter()
            .map(|(user, key)| {
                PublicKey::from_base64(&key)
                    .map(|key| (user, key))
                    .map_err(|e| ServiceError::Decode { reason: e.to_string() })
            })
            .collect()
    }
}

#[async_trait]
impl ConvoService for HttpConvoService {
    async fn fetch_last_messages(
        &self,
        access: &ConvoAccess,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        let body = PageRequest { auth: AuthFields::from(access), before_id: None, count };
        self.post_json(self.convo_url(&access.convo_id, "messages/last"), &body).await
    }

    async fn fetch_previous_messages(
        &self,
        access: &ConvoAccess,
        before_id: MessageId,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        let body = PageRequest {
            auth: AuthFields::from(access),
            before_id: Some(before_id.to_string()),
            count,
        };
        self.post_json(self.convo_url(&access.convo_id, "messages/before"), &body).await
    }

    async fn fetch_messages_after(
        &self,
        convo_id: &str,
        password_hash: &str,
        tail_id: MessageId,
    ) -> Result<Vec<Message>, ServiceError> {
        let body = AfterRequest { password_hash, tail_id: tail_id.to_string() };
        self.post_json(self.convo_url(convo_id, "messages/after"), &body).await
    }

    async fn fetch_metadata(
        &self,
        access: &ConvoAccess,
    ) -> Result<Option<ConvoMetadata>, ServiceError> {
        let response = self
            .http
            .post(self.convo_url(&access.convo_id, "metadata"))
            .json(&AuthFields::from(access))
            .send()
            .await
            .map_err(request_error)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = check_status(response)?;
        response.json().await.map(Some).map_err(|e| ServiceError::Decode { reason: e.to_string() })
    }
}

#[async_trait]
impl MessageSender for HttpConvoService {
    async fn send(&self, access: &ConvoAccess, plaintext: &str) -> Result<(), ServiceError> {
        let metadata = self.fetch_metadata(access).await?.ok_or_else(|| {
            ServiceError::InvalidRequest { reason: "conversation has no metadata".into() }
        })?;
        let keys = self.participant_keys(&metadata.participants).await?;
        let body = sealed_body(&metadata.participants, &keys, plaintext)?;
        let request = SendRequest { auth: AuthFields::from(access), body };

        let response = self
            .http
            .post(self.convo_url(&access.convo_id, "messages"))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response)?;

        tracing::debug!(
            convo_id = %access.convo_id,
            recipients = metadata.participants.len(),
            "message posted"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AuthFields<'a> {
    #[serde(rename = "PasswordSHA512")]
    password_hash: &'a str,
    user_id: &'a str,
    auth: &'a str,
}

impl<'a> From<&'a ConvoAccess> for AuthFields<'a> {
    fn from(access: &'a ConvoAccess) -> Self {
        Self {
            password_hash: &access.password_hash,
            user_id: &access.user_id,
            auth: &access.auth_token,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PageRequest<'a> {
    #[serde(flatten)]
    auth: AuthFields<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    before_id: Option<String>,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AfterRequest<'a> {
    #[serde(rename = "PasswordSHA512")]
    password_hash: &'a str,
    tail_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct KeysRequest<'a> {
    user_ids: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendRequest<'a> {
    #[serde(flatten)]
    auth: AuthFields<'a>,
    body: String,
}

/// Seal `plaintext` for every participant into one envelope body.
fn sealed_body(
    participants: &[String],
    keys: &HashMap<String, PublicKey>,
    plaintext: &str,
) -> Result<String, ServiceError> {
    let recipients = participants
        .iter()
        .map(|user| {
            keys.get(user).copied().ok_or_else(|| ServiceError::InvalidRequest {
                reason: format!("no public key for participant {user}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    seal_envelope(&recipients, plaintext.as_bytes())
        .map_err(|e| ServiceError::InvalidRequest { reason: e.to_string() })
}

fn validated_base(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ServiceError::InvalidRequest {
            reason: format!("base url must be http(s): {raw:?}"),
        });
    }
    Ok(trimmed.to_string())
}

/// Percent-encode everything outside the unreserved set.
fn path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn request_error(e: reqwest::Error) -> ServiceError {
    match e.status() {
        Some(status) => status_error(status),
        None => ServiceError::Request { reason: e.to_string() },
    }
}

fn status_error(status: StatusCode) -> ServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized,
        other => ServiceError::Status { status: other.as_u16() },
    }
}

fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() { Ok(response) } else { Err(status_error(status)) }
}

#[cfg(test)]
mod tests {
    use epistle_core::Decryptor;
    use epistle_crypto::SealedBoxKey;

    use super::*;

    fn access() -> ConvoAccess {
        ConvoAccess {
            convo_id: "c 1".into(),
            password_hash: "hash".into(),
            user_id: "u1".into(),
            auth_token: "123456".into(),
        }
    }

    #[test]
    fn base_url_is_normalized() {
        let service = HttpConvoService::new(" https://epistle.example/api/ ", &HttpConfig::default())
            .unwrap();
        assert_eq!(service.base_url(), "https://epistle.example/api");
        assert_eq!(
            service.convo_url("c 1/x", "messages/after"),
            "https://epistle.example/api/convos/c%201%2Fx/messages/after"
        );
    }

    #[test]
    fn non_http_base_rejected() {
        let err = HttpConvoService::new("ftp://x", &HttpConfig::default()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = HttpConfig { timeout: Duration::ZERO, ..HttpConfig::default() };
        assert!(HttpConvoService::new("http://x", &config).is_err());
    }

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED), ServiceError::Unauthorized);
        assert_eq!(status_error(StatusCode::FORBIDDEN), ServiceError::Unauthorized);
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY),
            ServiceError::Status { status: 502 }
        );
    }

    #[test]
    fn page_request_wire_shape() {
        let access = access();
        let body = PageRequest {
            auth: AuthFields::from(&access),
            before_id: Some("41".into()),
            count: 10,
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["PasswordSHA512"], "hash");
        assert_eq!(json["UserId"], "u1");
        assert_eq!(json["Auth"], "123456");
        assert_eq!(json["BeforeId"], "41");
        assert_eq!(json["Count"], 10);
    }

    #[test]
    fn last_page_omits_before_id() {
        let access = access();
        let body = PageRequest { auth: AuthFields::from(&access), before_id: None, count: 10 };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("BeforeId").is_none());
    }

    #[test]
    fn after_request_sends_id_as_string() {
        let json =
            serde_json::to_value(AfterRequest { password_hash: "h", tail_id: 7.to_string() }).unwrap();
        assert_eq!(json["TailId"], "7");
        assert!(json.get("UserId").is_none());
    }

    #[test]
    fn sent_body_decrypts_for_every_participant() {
        let me = SealedBoxKey::from_bytes([1u8; 32]);
        let bob = SealedBoxKey::from_bytes([2u8; 32]);
        let participants = vec!["me".to_string(), "bob".to_string()];
        let keys = HashMap::from([
            ("me".to_string(), me.public_key()),
            ("bob".to_string(), bob.public_key()),
        ]);

        let body = sealed_body(&participants, &keys, "TEXT=hello").unwrap();

        assert_eq!(me.decrypt(&body).unwrap(), "TEXT=hello");
        assert_eq!(bob.decrypt(&body).unwrap(), "TEXT=hello");
    }

    #[test]
    fn participant_without_key_is_rejected() {
        let me = SealedBoxKey::from_bytes([1u8; 32]);
        let keys = HashMap::from([("me".to_string(), me.public_key())]);
        let participants = vec!["me".to_string(), "ghost".to_string()];

        let err = sealed_body(&participants, &keys, "TEXT=x").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }
}
