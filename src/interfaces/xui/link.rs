use crate::config::{PanelConfig, SUB_ID_LEN};
use crate::domain::ports::InboundInfo;
use rand::Rng;
use uuid::Uuid;

const SUB_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Deterministic access/subscription URI construction from inbound
/// connection parameters. No network calls.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    server_host: String,
    subscription_port: u16,
}

impl LinkBuilder {
    pub fn new(server_host: &str, subscription_port: u16) -> Self {
        Self {
            server_host: server_host.to_string(),
            subscription_port,
        }
    }

    pub fn from_config(config: &PanelConfig) -> Self {
        Self::new(&config.server_host, config.subscription_port)
    }

    /// Builds the `vless://` URI for a provisioned client.
    pub fn access_link(&self, external_id: Uuid, inbound: &InboundInfo, remark: &str) -> String {
        if inbound.security == "reality"
            && let Some(reality) = &inbound.reality
        {
            let sni = reality.server_names.first().map(String::as_str).unwrap_or("");
            let sid = reality.short_ids.first().map(String::as_str).unwrap_or("");
            let fp = if reality.fingerprint.is_empty() {
                "chrome"
            } else {
                &reality.fingerprint
            };
            return format!(
                "vless://{external_id}@{host}:{port}?type=tcp&security=reality&encryption=none\
                 &pbk={pbk}&fp={fp}&sni={sni}&sid={sid}#{remark}",
                host = self.server_host,
                port = inbound.port,
                pbk = reality.public_key,
            );
        }
        format!(
            "vless://{external_id}@{host}:{port}?type={network}&security={security}&encryption=none#{remark}",
            host = self.server_host,
            port = inbound.port,
            network = inbound.network,
            security = inbound.security,
        )
    }

    pub fn subscription_link(&self, sub_id: &str) -> String {
        format!(
            "https://{}:{}/sub/{}",
            self.server_host, self.subscription_port, sub_id
        )
    }
}

/// Random lowercase-alphanumeric subscription id.
pub fn generate_sub_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SUB_ID_LEN)
        .map(|_| SUB_ID_ALPHABET[rng.gen_range(0..SUB_ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RealityParams;

    fn builder() -> LinkBuilder {
        LinkBuilder::new("vpn.example.com", 2096)
    }

    #[test]
    fn test_plain_link() {
        let inbound = InboundInfo {
            port: 443,
            network: "tcp".to_string(),
            security: "none".to_string(),
            reality: None,
            remark: "edge".to_string(),
        };
        let id = Uuid::nil();
        let link = builder().access_link(id, &inbound, "user1");
        assert_eq!(
            link,
            format!("vless://{id}@vpn.example.com:443?type=tcp&security=none&encryption=none#user1")
        );
    }

    #[test]
    fn test_reality_link() {
        let inbound = InboundInfo {
            port: 8443,
            network: "tcp".to_string(),
            security: "reality".to_string(),
            reality: Some(RealityParams {
                public_key: "PBK".to_string(),
                fingerprint: String::new(),
                server_names: vec!["cdn.example.com".to_string()],
                short_ids: vec!["ab12".to_string()],
            }),
            remark: "edge".to_string(),
        };
        let link = builder().access_link(Uuid::nil(), &inbound, "user1");
        assert!(link.contains("security=reality"));
        assert!(link.contains("pbk=PBK"));
        assert!(link.contains("fp=chrome"));
        assert!(link.contains("sni=cdn.example.com"));
        assert!(link.contains("sid=ab12"));
        assert!(link.ends_with("#user1"));
    }

    #[test]
    fn test_subscription_link() {
        assert_eq!(
            builder().subscription_link("abc123"),
            "https://vpn.example.com:2096/sub/abc123"
        );
    }

    #[test]
    fn test_sub_id_shape() {
        let id = generate_sub_id();
        assert_eq!(id.len(), SUB_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
