//! Parsing of `<hello>` and `<rpc-reply>` documents.
//!
//! Elements are matched by local name so replies parse the same whether the
//! controller uses a default namespace or a `nc:` prefix.

use super::*;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fmt;

/// Capabilities and session-id advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServerHello {
    /// Capability URIs in the order the server listed them.
    pub capabilities: Vec<String>,
    pub session_id: Option<String>,
}

impl ServerHello {
    pub fn parse(xml: &str) -> Result<Self, NetconfError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut hello = ServerHello::default();
        let mut seen_hello = false;
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = local_name(e);
                    if name == "hello" {
                        seen_hello = true;
                    }
                    path.push(name);
                    text.clear();
                }
                Ok(Event::Empty(ref e)) => {
                    if local_name(e) == "hello" {
                        seen_hello = true;
                    }
                }
                Ok(Event::Text(ref t)) => {
                    text.push_str(&t.unescape()?);
                }
                Ok(Event::End(_)) => {
                    match path.last().map(String::as_str) {
                        Some("capability") => hello.capabilities.push(text.trim().to_string()),
                        Some("session-id") => hello.session_id = Some(text.trim().to_string()),
                        _ => {}
                    }
                    path.pop();
                    text.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(NetconfError::HelloError(format!(
                        "malformed hello at position {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }

        if !seen_hello {
            return Err(NetconfError::HelloError(
                "first message is not a <hello>".to_string(),
            ));
        }
        if hello.capabilities.is_empty() {
            return Err(NetconfError::HelloError(
                "server hello advertises no capabilities".to_string(),
            ));
        }
        Ok(hello)
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// One `<rpc-error>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RpcError {
    pub error_type: String,
    pub error_tag: String,
    pub error_severity: String,
    pub error_message: Option<String>,
    pub error_path: Option<String>,
}

impl RpcError {
    /// Warnings are reported but do not fail the RPC.
    pub fn is_error(&self) -> bool {
        !self.error_severity.eq_ignore_ascii_case("warning")
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rpc-error {} ({}, {})",
            self.error_tag, self.error_type, self.error_severity
        )?;
        if let Some(message) = &self.error_message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.error_path {
            write!(f, " at {path}")?;
        }
        Ok(())
    }
}

/// A parsed `<rpc-reply>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcReply {
    pub message_id: Option<String>,
    /// The reply contained `<ok/>`.
    pub ok: bool,
    /// The reply contained a `<data>` element (possibly empty).
    pub has_data: bool,
    /// Text content directly under `<data>`, as returned by `get-schema`.
    pub data_text: String,
    pub errors: Vec<RpcError>,
    /// The reply document as received.
    pub raw: String,
}

impl RpcReply {
    pub fn parse(xml: &str) -> Result<Self, NetconfError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut reply = RpcReply {
            raw: xml.to_string(),
            ..Default::default()
        };
        let mut seen_reply = false;
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut current_error: Option<RpcError> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = local_name(e);
                    match name.as_str() {
                        "rpc-reply" if path.is_empty() => {
                            seen_reply = true;
                            reply.message_id = message_id_attr(e)?;
                        }
                        "ok" if path.len() == 1 => reply.ok = true,
                        "data" if path.len() == 1 => reply.has_data = true,
                        "rpc-error" => current_error = Some(RpcError::default()),
                        _ => {}
                    }
                    path.push(name);
                    text.clear();
                }
                Ok(Event::Empty(ref e)) => {
                    let name = local_name(e);
                    match name.as_str() {
                        "rpc-reply" if path.is_empty() => {
                            seen_reply = true;
                            reply.message_id = message_id_attr(e)?;
                        }
                        "ok" if path.len() == 1 => reply.ok = true,
                        "data" if path.len() == 1 => reply.has_data = true,
                        _ => {}
                    }
                }
                Ok(Event::Text(ref t)) => {
                    let value = t.unescape()?;
                    if path.len() == 2 && path[1] == "data" {
                        reply.data_text.push_str(&value);
                    } else {
                        text.push_str(&value);
                    }
                }
                Ok(Event::CData(ref c)) => {
                    let value = String::from_utf8_lossy(c);
                    if path.len() == 2 && path[1] == "data" {
                        reply.data_text.push_str(&value);
                    } else {
                        text.push_str(&value);
                    }
                }
                Ok(Event::End(_)) => {
                    let name = path.pop().unwrap_or_default();
                    if let Some(err) = current_error.as_mut() {
                        let value = text.trim().to_string();
                        match name.as_str() {
                            "error-type" => err.error_type = value,
                            "error-tag" => err.error_tag = value,
                            "error-severity" => err.error_severity = value,
                            "error-message" => err.error_message = Some(value),
                            "error-path" => err.error_path = Some(value),
                            _ => {}
                        }
                    }
                    if name == "rpc-error"
                        && let Some(err) = current_error.take()
                    {
                        reply.errors.push(err);
                    }
                    text.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(NetconfError::Xml(format!(
                        "malformed rpc-reply at position {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }

        if !seen_reply {
            return Err(NetconfError::Xml("message is not an <rpc-reply>".to_string()));
        }
        Ok(reply)
    }

    /// First rpc-error with severity `error`, if any.
    pub fn first_error(&self) -> Option<&RpcError> {
        self.errors.iter().find(|e| e.is_error())
    }
}

pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn message_id_attr(e: &BytesStart<'_>) -> Result<Option<String>, NetconfError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == b"message-id" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_HELLO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>urn:ietf:params:netconf:base:1.1</capability>
    <capability>http://cisco.com/ns/yang/Cisco-IOS-XE-wireless-ap-cfg?module=Cisco-IOS-XE-wireless-ap-cfg&amp;revision=2023-03-01</capability>
  </capabilities>
  <session-id>4242</session-id>
</hello>"#;

    #[test]
    fn hello_lists_capabilities_in_order() {
        let hello = ServerHello::parse(SERVER_HELLO).expect("parse hello");

        assert_eq!(hello.capabilities.len(), 3);
        assert!(hello.supports("urn:ietf:params:netconf:base:1.1"));
        assert_eq!(
            hello.capabilities[2],
            "http://cisco.com/ns/yang/Cisco-IOS-XE-wireless-ap-cfg?module=Cisco-IOS-XE-wireless-ap-cfg&revision=2023-03-01"
        );
        assert_eq!(hello.session_id.as_deref(), Some("4242"));
    }

    #[test]
    fn non_hello_first_message_is_rejected() {
        let err = ServerHello::parse(r#"<rpc-reply message-id="1"><ok/></rpc-reply>"#)
            .expect_err("not a hello");
        assert!(matches!(err, NetconfError::HelloError(_)));
    }

    #[test]
    fn ok_reply_with_prefixed_namespace() {
        let reply = RpcReply::parse(
            r#"<nc:rpc-reply xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><nc:ok/></nc:rpc-reply>"#,
        )
        .expect("parse reply");

        assert_eq!(reply.message_id.as_deref(), Some("101"));
        assert!(reply.ok);
        assert!(reply.errors.is_empty());
        assert!(reply.first_error().is_none());
    }

    #[test]
    fn ok_written_as_start_and_end_tags() {
        let reply = RpcReply::parse(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="105"><ok></ok></rpc-reply>"#,
        )
        .expect("parse reply");
        assert!(reply.ok);

        let nested = RpcReply::parse(
            r#"<rpc-reply message-id="106"><data><status><ok></ok></status></data></rpc-reply>"#,
        )
        .expect("parse reply");
        assert!(!nested.ok);
    }

    #[test]
    fn rpc_error_fields_are_collected() {
        let reply = RpcReply::parse(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="102">
  <rpc-error>
    <error-type>application</error-type>
    <error-tag>invalid-value</error-tag>
    <error-severity>error</error-severity>
    <error-path>/ap-cfg-data/ap-tags/ap-tag[ap-mac='zz']</error-path>
    <error-message xml:lang="en">invalid MAC address</error-message>
  </rpc-error>
</rpc-reply>"#,
        )
        .expect("parse reply");

        let err = reply.first_error().expect("error present");
        assert_eq!(err.error_tag, "invalid-value");
        assert_eq!(err.error_type, "application");
        assert_eq!(err.error_message.as_deref(), Some("invalid MAC address"));
        assert!(err.to_string().contains("invalid MAC address"));
    }

    #[test]
    fn warnings_do_not_count_as_failures() {
        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="103"><rpc-error><error-type>protocol</error-type><error-tag>operation-failed</error-tag><error-severity>warning</error-severity></rpc-error><ok/></rpc-reply>"#,
        )
        .expect("parse reply");

        assert_eq!(reply.errors.len(), 1);
        assert!(reply.first_error().is_none());
        assert!(reply.ok);
    }

    #[test]
    fn data_text_collects_schema_body() {
        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="104"><data xmlns="urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring">module foo {
  prefix "f";
  leaf x { type string; } // a &lt; b
}</data></rpc-reply>"#,
        )
        .expect("parse reply");

        assert!(reply.has_data);
        assert!(reply.data_text.starts_with("module foo {"));
        assert!(reply.data_text.contains("a < b"));
    }
}
