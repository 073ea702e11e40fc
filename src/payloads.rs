//! Outbound payload builders for the login flow.
//!
//! Each payload is a plain serde struct that encodes as a MessagePack map
//! through [`MsgPackCodec`](crate::codec::MsgPackCodec), then becomes a
//! request [`Frame`] with the matching opcode.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::opcode;
use crate::protocol::Frame;

/// Starts phone-number authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AuthRequest {
    /// Default authentication step.
    pub const START_AUTH: &'static str = "START_AUTH";

    /// A `START_AUTH` request for `phone`.
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            kind: Self::START_AUTH.to_string(),
        }
    }

    /// Override the authentication step.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn into_frame(self) -> Result<Frame> {
        Frame::from_payload(opcode::AUTH_REQUEST, &self)
    }
}

/// Device description sent inside [`SessionInit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgent {
    pub device_type: String,
    pub app_version: String,
    pub os_version: String,
    pub timezone: String,
    pub screen: String,
    pub push_device_type: String,
    pub locale: String,
    pub build_number: u32,
    pub device_name: String,
    pub device_locale: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            device_type: "ANDROID".into(),
            app_version: "25.9.0".into(),
            os_version: "Android 12".into(),
            timezone: "Europe/Moscow".into(),
            screen: "mdpi 160dpi 1366x720".into(),
            push_device_type: "GCM".into(),
            locale: "ru".into(),
            build_number: 6395,
            device_name: "unknown Android SDK built for x86_64".into(),
            device_locale: "en".into(),
        }
    }
}

/// First request of every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInit {
    #[serde(rename = "clientSessionId")]
    pub client_session_id: i32,
    pub mt_instanceid: String,
    #[serde(rename = "userAgent")]
    pub user_agent: UserAgent,
    #[serde(rename = "deviceId")]
    pub device_id: String,
}

impl Default for SessionInit {
    fn default() -> Self {
        Self {
            client_session_id: 2,
            mt_instanceid: "884a3b39-68ca-4e73-a3c1-6ed7f97fb709".into(),
            user_agent: UserAgent::default(),
            device_id: "6f538c4af7791b40".into(),
        }
    }
}

impl SessionInit {
    pub fn with_client_session_id(mut self, id: i32) -> Self {
        self.client_session_id = id;
        self
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.mt_instanceid = id.into();
        self
    }

    pub fn with_device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    pub fn into_frame(self) -> Result<Frame> {
        Frame::from_payload(opcode::SESSION_INIT, &self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;

    #[test]
    fn test_auth_request_map_shape() {
        let frame = AuthRequest::new("+79111111111").into_frame().unwrap();
        assert_eq!(frame.opcode, opcode::AUTH_REQUEST);

        let value = frame.decode_body().unwrap();
        assert_eq!(
            value,
            Value::map([("phone", "+79111111111"), ("type", "START_AUTH")])
        );
    }

    #[test]
    fn test_auth_request_custom_kind() {
        let request = AuthRequest::new("+7").with_kind("CHECK_CODE");
        let value = request.into_frame().unwrap().decode_body().unwrap();
        assert_eq!(value.get("type").and_then(Value::as_str), Some("CHECK_CODE"));
    }

    #[test]
    fn test_session_init_defaults() {
        let frame = SessionInit::default().into_frame().unwrap();
        assert_eq!(frame.opcode, opcode::SESSION_INIT);

        let value = frame.decode_body().unwrap();
        assert_eq!(value.get("clientSessionId").and_then(Value::as_i64), Some(2));
        assert_eq!(
            value.get("mt_instanceid").and_then(Value::as_str),
            Some("884a3b39-68ca-4e73-a3c1-6ed7f97fb709")
        );
        assert_eq!(
            value.get("deviceId").and_then(Value::as_str),
            Some("6f538c4af7791b40")
        );

        let agent = value.get("userAgent").unwrap();
        assert_eq!(agent.get("deviceType").and_then(Value::as_str), Some("ANDROID"));
        assert_eq!(agent.get("buildNumber").and_then(Value::as_i64), Some(6395));
        assert_eq!(
            agent.get("pushDeviceType").and_then(Value::as_str),
            Some("GCM")
        );
        assert_eq!(agent.as_map().unwrap().len(), 10);
    }

    #[test]
    fn test_session_init_is_compressed_on_the_wire() {
        let frame = SessionInit::default().with_device_id("abc").into_frame().unwrap();
        assert!(frame.body_len() >= 32);

        let bytes = frame.to_bytes().unwrap();
        let parsed = Frame::from_bytes(&bytes).unwrap();
        let back: SessionInit = parsed.decode_payload().unwrap();
        assert_eq!(back.device_id, "abc");
        assert_eq!(back.user_agent, UserAgent::default());
    }
}
