use crate::config::PanelConfig;
use crate::domain::ports::{ClientSpec, InboundInfo, Provisioner, RealityParams};
use crate::error::{ResellError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every panel endpoint replies with this envelope. `obj` is absent or null
/// on mutation endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    msg: String,
    obj: Option<T>,
}

/// An inbound as the panel lists it. `stream_settings` is a JSON document
/// serialized into a string, so it needs a second parse.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    id: i64,
    port: u16,
    remark: String,
    #[serde(default)]
    enable: bool,
    stream_settings: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamSettings {
    #[serde(default)]
    network: String,
    #[serde(default)]
    security: String,
    reality_settings: Option<RawRealitySettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRealitySettings {
    #[serde(default)]
    server_names: Vec<String>,
    #[serde(default)]
    short_ids: Vec<String>,
    settings: Option<RawRealityInner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRealityInner {
    #[serde(default)]
    public_key: String,
    #[serde(default)]
    fingerprint: String,
}

/// HTTP adapter for the 3x-ui panel. Authentication is a session cookie
/// obtained by `login`, stored in the client's cookie jar.
pub struct XuiClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl XuiClient {
    pub fn new(config: &PanelConfig) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Unwraps the panel envelope, surfacing `msg` on failure.
    fn unwrap_envelope<T>(envelope: Envelope<T>, context: &str) -> Result<Option<T>> {
        if !envelope.success {
            return Err(ResellError::Provisioning(format!(
                "{context}: {}",
                if envelope.msg.is_empty() {
                    "panel reported failure"
                } else {
                    envelope.msg.as_str()
                }
            )));
        }
        Ok(envelope.obj)
    }

    fn parse_inbound(raw: RawInbound) -> Result<(i64, InboundInfo, bool)> {
        let stream: StreamSettings = serde_json::from_str(&raw.stream_settings)
            .map_err(|e| ResellError::Provisioning(format!("Bad streamSettings: {e}")))?;
        let reality = stream.reality_settings.map(|r| {
            let inner = r.settings.unwrap_or(RawRealityInner {
                public_key: String::new(),
                fingerprint: String::new(),
            });
            RealityParams {
                public_key: inner.public_key,
                fingerprint: inner.fingerprint,
                server_names: r.server_names,
                short_ids: r.short_ids,
            }
        });
        Ok((
            raw.id,
            InboundInfo {
                port: raw.port,
                network: stream.network,
                security: stream.security,
                reality,
                remark: raw.remark,
            },
            raw.enable,
        ))
    }

    async fn fetch_inbounds(&self) -> Result<Vec<(i64, InboundInfo, bool)>> {
        let envelope: Envelope<Vec<RawInbound>> = self
            .http
            .get(self.url("/panel/api/inbounds/list"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let raws =
            Self::unwrap_envelope(envelope, "List inbounds")?.unwrap_or_default();
        raws.into_iter().map(Self::parse_inbound).collect()
    }
}

#[async_trait]
impl Provisioner for XuiClient {
    async fn login(&self) -> Result<()> {
        let envelope: Envelope<serde_json::Value> = self
            .http
            .post(self.url("/login"))
            .timeout(LOGIN_TIMEOUT)
            .form(&[("username", &self.username), ("password", &self.password)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !envelope.success {
            return Err(ResellError::Auth);
        }
        tracing::debug!(base_url = %self.base_url, "panel_login_ok");
        Ok(())
    }

    async fn list_inbounds(&self) -> Result<Vec<(i64, InboundInfo)>> {
        Ok(self
            .fetch_inbounds()
            .await?
            .into_iter()
            .map(|(id, info, _enabled)| (id, info))
            .collect())
    }

    async fn get_inbound(&self, inbound_id: i64) -> Result<InboundInfo> {
        let (_, info, enabled) = self
            .fetch_inbounds()
            .await?
            .into_iter()
            .find(|(id, _, _)| *id == inbound_id)
            .ok_or(ResellError::InboundNotFound(inbound_id))?;
        if !enabled {
            return Err(ResellError::InboundDisabled(inbound_id));
        }
        Ok(info)
    }

    async fn add_clients(&self, inbound_id: i64, clients: &[ClientSpec]) -> Result<()> {
        let settings = serde_json::to_string(&serde_json::json!({ "clients": clients }))
            .map_err(|e| ResellError::Internal(Box::new(e)))?;
        let envelope: Envelope<serde_json::Value> = self
            .http
            .post(self.url("/panel/api/inbounds/addClient"))
            .form(&[("id", inbound_id.to_string()), ("settings", settings)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::unwrap_envelope(envelope, "Add clients")?;
        tracing::debug!(inbound_id, count = clients.len(), "panel_clients_added");
        Ok(())
    }

    async fn create_inbound(
        &self,
        port: u16,
        remark: &str,
        protocol: &str,
        network: &str,
    ) -> Result<i64> {
        let stream_settings = serde_json::to_string(&serde_json::json!({
            "network": network,
            "security": "none",
        }))
        .map_err(|e| ResellError::Internal(Box::new(e)))?;
        let settings = serde_json::to_string(&serde_json::json!({
            "clients": [],
            "decryption": "none",
            "fallbacks": [],
        }))
        .map_err(|e| ResellError::Internal(Box::new(e)))?;

        let envelope: Envelope<RawInbound> = self
            .http
            .post(self.url("/panel/api/inbounds/add"))
            .form(&[
                ("enable", "true".to_string()),
                ("port", port.to_string()),
                ("remark", remark.to_string()),
                ("protocol", protocol.to_string()),
                ("settings", settings),
                ("streamSettings", stream_settings),
                ("sniffing", String::new()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let inbound = Self::unwrap_envelope(envelope, "Create inbound")?
            .ok_or_else(|| ResellError::Provisioning("Create inbound: empty reply".to_string()))?;
        tracing::info!(inbound_id = inbound.id, port, remark, "panel_inbound_created");
        Ok(inbound.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_failure_carries_msg() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"success": false, "msg": "bad settings", "obj": null}"#)
                .unwrap();
        let err = XuiClient::unwrap_envelope(envelope, "Add clients").unwrap_err();
        assert!(err.to_string().contains("bad settings"));
    }

    #[test]
    fn test_parse_reality_inbound() {
        let raw = RawInbound {
            id: 3,
            port: 8443,
            remark: "edge".to_string(),
            enable: true,
            stream_settings: serde_json::json!({
                "network": "tcp",
                "security": "reality",
                "realitySettings": {
                    "serverNames": ["cdn.example.com"],
                    "shortIds": ["ab12"],
                    "settings": { "publicKey": "PBK", "fingerprint": "chrome" },
                },
            })
            .to_string(),
        };
        let (id, info, enabled) = XuiClient::parse_inbound(raw).unwrap();
        assert_eq!(id, 3);
        assert!(enabled);
        assert_eq!(info.security, "reality");
        let reality = info.reality.unwrap();
        assert_eq!(reality.public_key, "PBK");
        assert_eq!(reality.server_names, vec!["cdn.example.com"]);
    }

    #[test]
    fn test_client_spec_wire_names() {
        let spec = ClientSpec {
            id: uuid::Uuid::nil(),
            email: "user1".to_string(),
            enable: true,
            expiry_time: -86_400_000,
            total_gb: 1024,
            flow: String::new(),
            limit_ip: 0,
            tg_id: "42".to_string(),
            sub_id: "abc".to_string(),
            comment: "tg".to_string(),
            reset: 0,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["expiryTime"], -86_400_000i64);
        assert_eq!(json["totalGB"], 1024);
        assert_eq!(json["subId"], "abc");
        assert_eq!(json["tgId"], "42");
        assert_eq!(json["limitIp"], 0);
    }
}
