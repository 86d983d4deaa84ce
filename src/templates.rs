//! XML payload templates.
//!
//! Request bodies are built from fixed templates by string formatting. Every
//! value that comes from user input (AP MACs, tag names, schema identifiers)
//! is XML-escaped before it is placed in a template.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::aptag::ApTag;
use crate::config;
use crate::error::NetconfError;
use crate::session::Datastore;

/// Body of the `<close-session>` RPC.
pub const CLOSE_SESSION: &str = "<close-session/>";

/// Client `<hello>` advertising both base versions.
pub fn client_hello() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="{ns}">
  <capabilities>
    <capability>{base10}</capability>
    <capability>{base11}</capability>
  </capabilities>
</hello>"#,
        ns = config::NETCONF_BASE_NS,
        base10 = config::CAPABILITY_BASE_1_0,
        base11 = config::CAPABILITY_BASE_1_1,
    )
}

/// Wraps an operation body in the `<rpc>` envelope.
pub fn rpc(message_id: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc message-id="{}" xmlns="{}">{}</rpc>"#,
        escape(message_id),
        config::NETCONF_BASE_NS,
        body
    )
}

pub fn get(filter: &str) -> String {
    format!("<get>{filter}</get>")
}

pub fn get_config(source: Datastore) -> String {
    format!(
        "<get-config><source><{}/></source></get-config>",
        source.as_str()
    )
}

pub fn edit_config(target: Datastore, config: &str) -> String {
    format!(
        "<edit-config><target><{}/></target>{}</edit-config>",
        target.as_str(),
        config
    )
}

pub fn get_schema(identifier: &str) -> String {
    format!(
        r#"<get-schema xmlns="{}"><identifier>{}</identifier></get-schema>"#,
        config::NETCONF_MONITORING_NS,
        escape(identifier)
    )
}

/// Vendor RPC that copies running-config to startup-config.
pub fn save_config() -> String {
    format!(
        r#"<cisco-ia:save-config xmlns:cisco-ia="{}"/>"#,
        config::CISCO_IA_NS
    )
}

/// Subtree filter selecting every AP tag assignment.
pub fn ap_tags_filter() -> String {
    format!(
        r#"
<filter type="subtree">
  <ap-cfg-data xmlns="{}">
    <ap-tags>
      <ap-tag></ap-tag>
    </ap-tags>
  </ap-cfg-data>
</filter>
"#,
        config::AP_CFG_NS
    )
}

/// `<config>` element assigning tags to each AP.
///
/// Absent tags are left out of the entry entirely, so `edit-config` merges
/// only the tags that were given.
pub fn ap_tags_config(tags: &[ApTag]) -> String {
    let mut entries = String::new();
    for tag in tags {
        entries.push_str("\n      <ap-tag>");
        entries.push_str(&format!("\n        <ap-mac>{}</ap-mac>", escape(&tag.ap_mac)));
        for (element, value) in [
            ("policy-tag", &tag.policy_tag),
            ("site-tag", &tag.site_tag),
            ("rf-tag", &tag.rf_tag),
        ] {
            if let Some(value) = value {
                entries.push_str(&format!(
                    "\n        <{element}>{}</{element}>",
                    escape(value)
                ));
            }
        }
        entries.push_str("\n      </ap-tag>");
    }

    format!(
        r#"
<config>
  <ap-cfg-data xmlns="{}">
    <ap-tags>{}
    </ap-tags>
  </ap-cfg-data>
</config>
"#,
        config::AP_CFG_NS,
        entries
    )
}

/// Re-indents an XML document with two spaces per level.
pub fn pretty_xml(xml: &str) -> Result<String, NetconfError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => writer
                .write_event(event)
                .map_err(|e| NetconfError::Xml(e.to_string()))?,
            Err(e) => {
                return Err(NetconfError::Xml(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| NetconfError::Xml(e.to_string()))
}
