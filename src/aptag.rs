//! Access Point tag assignments.
//!
//! An AP is identified by its Ethernet MAC and carries up to three tags:
//! policy, site and RF. Records are read from a `<get>` reply or a CSV file
//! and written back as CSV or as an `edit-config` payload.
//!
//! The CSV layout has no header row and four columns in fixed order:
//! `ap-mac, policy-tag, site-tag, rf-tag`. An empty column means the tag is
//! not set.

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};
use quick_xml::Reader;
use quick_xml::events::Event;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::NetconfError;
use crate::session::{Datastore, NetconfSession, RpcReply};
use crate::templates;

/// Default file read by CSV import.
pub const DEFAULT_IMPORT_FILE: &str = "ap-config.csv";

/// Tag assignment for one Access Point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ApTag {
    /// AP Ethernet MAC, e.g. `11:22:33:44:55:66`.
    pub ap_mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rf_tag: Option<String>,
}

impl ApTag {
    /// Builds a record from raw column values.
    ///
    /// Values are trimmed first; blank tags become `None` and a blank MAC is
    /// rejected.
    pub fn from_columns(
        ap_mac: &str,
        policy_tag: &str,
        site_tag: &str,
        rf_tag: &str,
    ) -> Result<Self, NetconfError> {
        let ap_mac = ap_mac.trim();
        if ap_mac.is_empty() {
            return Err(NetconfError::MissingField("ap-mac".to_string()));
        }
        Ok(Self {
            ap_mac: ap_mac.to_string(),
            policy_tag: non_empty(policy_tag),
            site_tag: non_empty(site_tag),
            rf_tag: non_empty(rf_tag),
        })
    }

    /// Column values in CSV order, absent tags as empty strings.
    pub fn columns(&self) -> [&str; 4] {
        [
            self.ap_mac.as_str(),
            self.policy_tag.as_deref().unwrap_or(""),
            self.site_tag.as_deref().unwrap_or(""),
            self.rf_tag.as_deref().unwrap_or(""),
        ]
    }
}

impl fmt::Display for ApTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [mac, policy, site, rf] = self.columns();
        write!(
            f,
            "AP MAC:{mac}, policy-tag:{policy}, site-tag:{site}, rf-tag:{rf}"
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Extracts AP tag records from a `<get>` reply.
///
/// A reply without `<data>` content, or with an empty `ap-tags` container,
/// yields an empty list. One `<ap-tag>` entry yields a one-element list.
pub fn parse_ap_tags(reply_xml: &str) -> Result<Vec<ApTag>, NetconfError> {
    let mut reader = Reader::from_str(reply_xml);
    reader.config_mut().trim_text(true);

    let mut tags = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ApTag> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "ap-tag" && path.last().map(String::as_str) == Some("ap-tags") {
                    current = Some(ApTag::default());
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "ap-tag" && path.last().map(String::as_str) == Some("ap-tags") {
                    return Err(NetconfError::MissingField(
                        "ap-mac in empty <ap-tag/>".to_string(),
                    ));
                }
            }
            Ok(Event::Text(ref t)) => text.push_str(&t.unescape()?),
            Ok(Event::CData(ref c)) => text.push_str(&String::from_utf8_lossy(c)),
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                if name == "ap-tag" && path.last().map(String::as_str) == Some("ap-tags") {
                    if let Some(tag) = current.take() {
                        if tag.ap_mac.is_empty() {
                            return Err(NetconfError::MissingField(
                                "ap-mac in <ap-tag> entry".to_string(),
                            ));
                        }
                        tags.push(tag);
                    }
                } else if let Some(tag) = current.as_mut() {
                    let value = text.trim();
                    match name.as_str() {
                        "ap-mac" => tag.ap_mac = value.to_string(),
                        "policy-tag" => tag.policy_tag = non_empty(value),
                        "site-tag" => tag.site_tag = non_empty(value),
                        "rf-tag" => tag.rf_tag = non_empty(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(NetconfError::Xml(format!(
                    "malformed AP tag reply at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(tags)
}

/// Reads every AP tag assignment from the controller.
pub async fn fetch_ap_tags(session: &mut NetconfSession) -> Result<Vec<ApTag>, NetconfError> {
    let (_, tags) = fetch_ap_tags_with_reply(session).await?;
    Ok(tags)
}

/// Like [`fetch_ap_tags`], also returning the `<get>` reply for display.
pub async fn fetch_ap_tags_with_reply(
    session: &mut NetconfSession,
) -> Result<(RpcReply, Vec<ApTag>), NetconfError> {
    let reply = session.get(&templates::ap_tags_filter()).await?;
    let tags = parse_ap_tags(&reply.raw)?;
    info!(
        "{} reported {} AP tag assignment(s)",
        session.device_addr(),
        tags.len()
    );
    Ok((reply, tags))
}

/// Applies all records in one `edit-config` on the running datastore.
///
/// A failure on any entry fails the whole request.
pub async fn apply_ap_tags(
    session: &mut NetconfSession,
    tags: &[ApTag],
) -> Result<RpcReply, NetconfError> {
    let config = templates::ap_tags_config(tags);
    debug!("edit-config payload:\n{}", config);
    let reply = session.edit_config(Datastore::Running, &config).await?;
    info!(
        "{} accepted {} AP tag assignment(s)",
        session.device_addr(),
        tags.len()
    );
    Ok(reply)
}

/// Writes records as CSV rows, every field quoted.
pub fn write_csv<W: Write>(tags: &[ApTag], writer: W) -> Result<(), NetconfError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    for tag in tags {
        wtr.write_record(tag.columns())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads records from CSV rows; quoting is optional.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<ApTag>, NetconfError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut tags = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 1);
        if record.len() < 4 {
            return Err(NetconfError::Csv(format!(
                "line {line}: expected 4 columns (ap-mac, policy-tag, site-tag, rf-tag), found {}",
                record.len()
            )));
        }
        let tag = ApTag::from_columns(&record[0], &record[1], &record[2], &record[3])
            .map_err(|_| NetconfError::Csv(format!("line {line}: empty ap-mac")))?;
        tags.push(tag);
    }
    Ok(tags)
}

/// `ap-tags-config-YYYY-MM-DD-HH-MM-SS.csv` for the given instant.
pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("ap-tags-config-{}.csv", at.format("%Y-%m-%d-%H-%M-%S"))
}

/// Writes records to a timestamped CSV file under `dir` and returns its path.
pub fn export_csv(tags: &[ApTag], dir: &Path) -> Result<PathBuf, NetconfError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(Local::now()));
    let file = File::create(&path)?;
    write_csv(tags, file)?;
    info!("Wrote {} AP tag row(s) to {}", tags.len(), path.display());
    Ok(path)
}

/// Reads records from a CSV file.
pub fn import_csv(path: &Path) -> Result<Vec<ApTag>, NetconfError> {
    let file = File::open(path)?;
    let tags = read_csv(file)?;
    info!("Read {} AP tag row(s) from {}", tags.len(), path.display());
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ONE_TAG_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101">
  <data>
    <ap-cfg-data xmlns="http://cisco.com/ns/yang/Cisco-IOS-XE-wireless-ap-cfg">
      <ap-tags>
        <ap-tag>
          <ap-mac>11:22:33:44:55:66</ap-mac>
          <site-tag>Sydney</site-tag>
        </ap-tag>
      </ap-tags>
    </ap-cfg-data>
  </data>
</rpc-reply>"#;

    const TWO_TAG_REPLY: &str = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><data><ap-cfg-data xmlns="http://cisco.com/ns/yang/Cisco-IOS-XE-wireless-ap-cfg"><ap-tags><ap-tag><ap-mac>aa:aa:aa:aa:aa:01</ap-mac><policy-tag>PT-Corp</policy-tag><site-tag>ST-Sydney</site-tag><rf-tag>RF-High</rf-tag></ap-tag><ap-tag><ap-mac>aa:aa:aa:aa:aa:02</ap-mac><rf-tag>RF-Low</rf-tag></ap-tag></ap-tags></ap-cfg-data></data></rpc-reply>"#;

    #[test]
    fn single_entry_reply_yields_one_element_list() {
        let tags = parse_ap_tags(ONE_TAG_REPLY).expect("parse");

        assert_eq!(
            tags,
            vec![ApTag {
                ap_mac: "11:22:33:44:55:66".to_string(),
                site_tag: Some("Sydney".to_string()),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn multiple_entries_keep_reply_order() {
        let tags = parse_ap_tags(TWO_TAG_REPLY).expect("parse");

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].policy_tag.as_deref(), Some("PT-Corp"));
        assert_eq!(tags[0].rf_tag.as_deref(), Some("RF-High"));
        assert_eq!(tags[1].ap_mac, "aa:aa:aa:aa:aa:02");
        assert_eq!(tags[1].site_tag, None);
    }

    #[test]
    fn empty_data_yields_empty_list() {
        let empty = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><data/></rpc-reply>"#;
        assert!(parse_ap_tags(empty).expect("parse").is_empty());

        let empty_container = r#"<rpc-reply message-id="101"><data><ap-cfg-data xmlns="http://cisco.com/ns/yang/Cisco-IOS-XE-wireless-ap-cfg"><ap-tags/></ap-cfg-data></data></rpc-reply>"#;
        assert!(parse_ap_tags(empty_container).expect("parse").is_empty());
    }

    #[test]
    fn entry_without_mac_is_rejected() {
        let reply = r#"<rpc-reply message-id="101"><data><ap-cfg-data><ap-tags><ap-tag><site-tag>X</site-tag></ap-tag></ap-tags></ap-cfg-data></data></rpc-reply>"#;
        assert!(matches!(
            parse_ap_tags(reply),
            Err(NetconfError::MissingField(_))
        ));
    }

    #[test]
    fn csv_row_round_trips_with_blank_tags() {
        let row = "\"11:22:33:44:55:66\",\"\",\"Sydney\",\"\"\n";

        let tags = read_csv(row.as_bytes()).expect("read csv");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].ap_mac, "11:22:33:44:55:66");
        assert_eq!(tags[0].policy_tag, None);
        assert_eq!(tags[0].site_tag.as_deref(), Some("Sydney"));
        assert_eq!(tags[0].rf_tag, None);

        let mut out = Vec::new();
        write_csv(&tags, &mut out).expect("write csv");
        assert_eq!(String::from_utf8(out).expect("utf-8"), row);
    }

    #[test]
    fn csv_file_round_trips_through_export_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("exports").join("wlc1");
        let tags = vec![
            ApTag::from_columns("11:22:33:44:55:66", "", "Sydney", "").expect("tag"),
            ApTag::from_columns("aa:bb:cc:dd:ee:ff", "PT-Corp", "ST-Melbourne", "RF-High")
                .expect("tag"),
        ];

        let path = export_csv(&tags, &dir).expect("export");

        assert_eq!(path.parent(), Some(dir.as_path()));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("ap-tags-config-") && name.ends_with(".csv"), "{name}");
        assert_eq!(
            fs::read_to_string(&path).expect("read back"),
            "\"11:22:33:44:55:66\",\"\",\"Sydney\",\"\"\n\"aa:bb:cc:dd:ee:ff\",\"PT-Corp\",\"ST-Melbourne\",\"RF-High\"\n"
        );
        assert_eq!(import_csv(&path).expect("import"), tags);
    }

    #[test]
    fn import_of_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = import_csv(&tmp.path().join(DEFAULT_IMPORT_FILE)).expect_err("missing file");
        assert!(matches!(err, NetconfError::Io(_)));
    }

    #[test]
    fn cdata_tag_values_are_kept() {
        let reply = r#"<rpc-reply message-id="101"><data><ap-cfg-data><ap-tags><ap-tag><ap-mac>11:22:33:44:55:66</ap-mac><site-tag><![CDATA[Sydney & Co]]></site-tag></ap-tag></ap-tags></ap-cfg-data></data></rpc-reply>"#;

        let tags = parse_ap_tags(reply).expect("parse");
        assert_eq!(tags[0].site_tag.as_deref(), Some("Sydney & Co"));
    }

    #[test]
    fn unquoted_rows_are_accepted() {
        let tags = read_csv("aa:bb:cc:dd:ee:ff,PT,,RF\n".as_bytes()).expect("read csv");
        assert_eq!(tags[0].policy_tag.as_deref(), Some("PT"));
        assert_eq!(tags[0].site_tag, None);
        assert_eq!(tags[0].rf_tag.as_deref(), Some("RF"));
    }

    #[test]
    fn short_rows_and_missing_mac_report_line() {
        let err = read_csv("aa:bb:cc:dd:ee:ff,PT,ST,RF\naa:bb:cc:dd:ee:00,PT\n".as_bytes())
            .expect_err("short row");
        match err {
            NetconfError::Csv(msg) => assert!(msg.starts_with("line 2:"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = read_csv(",PT,ST,RF\n".as_bytes()).expect_err("missing mac");
        assert!(matches!(err, NetconfError::Csv(_)));
    }

    #[test]
    fn blank_mac_is_rejected_and_values_are_trimmed() {
        let err = read_csv("  ,PT,ST,RF\n".as_bytes()).expect_err("blank mac");
        match err {
            NetconfError::Csv(msg) => assert!(msg.starts_with("line 1:"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }

        let tags = read_csv(" aa:bb:cc:dd:ee:ff , PT ,  , RF\n".as_bytes()).expect("read csv");
        assert_eq!(tags[0].ap_mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(tags[0].policy_tag.as_deref(), Some("PT"));
        assert_eq!(tags[0].site_tag, None);

        let xml = templates::ap_tags_config(&tags);
        assert!(xml.contains("<ap-mac>aa:bb:cc:dd:ee:ff</ap-mac>"));
    }

    #[test]
    fn export_file_name_is_timestamped() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("valid local time");
        assert_eq!(export_file_name(at), "ap-tags-config-2024-03-09-07-05-01.csv");
    }

    #[test]
    fn display_matches_console_listing() {
        let tag = ApTag::from_columns("11:22:33:44:55:66", "", "Sydney", "").expect("tag");
        assert_eq!(
            tag.to_string(),
            "AP MAC:11:22:33:44:55:66, policy-tag:, site-tag:Sydney, rf-tag:"
        );
    }
}
