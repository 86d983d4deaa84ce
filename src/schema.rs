//! YANG module discovery and schema download.

use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::NetconfError;
use crate::session::NetconfSession;

/// Default directory for downloaded schemas.
pub const DEFAULT_SCHEMA_DIR: &str = "YANG_schemas";

static MODULE_PARAM: Lazy<Regex> = Lazy::new(|| match Regex::new(r"module=([a-zA-Z0-9_.-]*)") {
    Ok(re) => re,
    Err(err) => panic!("invalid MODULE_PARAM regex: {err}"),
});

/// Returns the `module=` parameter of a capability URI, if it names one.
pub fn extract_module_name(capability: &str) -> Option<&str> {
    let name = MODULE_PARAM.captures(capability)?.get(1)?.as_str();
    // Names become file names; reject empty and dot-only values.
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return None;
    }
    Some(name)
}

/// Module names advertised in `capabilities`, sorted and de-duplicated.
pub fn extract_module_names(capabilities: &[String]) -> Vec<String> {
    capabilities
        .iter()
        .filter_map(|c| extract_module_name(c))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Downloads every advertised module into `dir`, one file per module.
///
/// Returns the module names in the order they were written.
pub async fn export_schemas(
    session: &mut NetconfSession,
    dir: &Path,
) -> Result<Vec<String>, NetconfError> {
    let modules = extract_module_names(session.server_capabilities());
    info!(
        "{} advertises {} YANG module(s)",
        session.device_addr(),
        modules.len()
    );

    tokio::fs::create_dir_all(dir).await?;
    for module in &modules {
        let schema = session.get_schema(module).await?;
        let path = dir.join(module);
        tokio::fs::write(&path, schema).await?;
        debug!("Wrote schema {}", path.display());
    }
    info!("Schemas written to {}", dir.display());

    Ok(modules)
}
