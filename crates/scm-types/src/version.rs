use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::ids::{ClusterId, ScmId};

/// The on-disk `VERSION` file (§6): a plain-text key/value file at the
/// storage root. Its presence (or absence, or a dangling
/// `upgradingToLayoutVersion`) gates every startup decision in
/// `scm-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    pub node_type: String,
    pub cluster_id: ClusterId,
    pub scm_id: ScmId,
    pub creation_time_millis: u64,
    pub layout_version: u32,
    pub upgrading_to_layout_version: Option<u32>,
}

impl VersionFile {
    pub fn fresh(node_type: impl Into<String>, now_millis: u64, layout_version: u32) -> Self {
        Self {
            node_type: node_type.into(),
            cluster_id: ClusterId::generate(),
            scm_id: ScmId::random(),
            creation_time_millis: now_millis,
            layout_version,
            upgrading_to_layout_version: None,
        }
    }

    /// §6: "presence with `upgradingToLayoutVersion` set indicates a
    /// crash during upgrade".
    pub fn crashed_mid_upgrade(&self) -> bool {
        self.upgrading_to_layout_version.is_some()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "nodeType={}", self.node_type);
        let _ = writeln!(out, "clusterID={}", self.cluster_id);
        let _ = writeln!(out, "scmID={}", self.scm_id);
        let _ = writeln!(out, "cTime={}", self.creation_time_millis);
        let _ = writeln!(out, "layoutVersion={}", self.layout_version);
        if let Some(upgrading) = self.upgrading_to_layout_version {
            let _ = writeln!(out, "upgradingToLayoutVersion={upgrading}");
        }
        out
    }

    pub fn parse(contents: &str) -> Result<Self, String> {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("malformed VERSION line: {line:?}"));
            };
            fields.insert(key.trim(), value.trim());
        }

        let get = |key: &str| -> Result<String, String> {
            fields
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| format!("VERSION file missing required key {key:?}"))
        };

        let node_type = get("nodeType")?;
        let cluster_id = ClusterId::parse(get("clusterID")?);
        let scm_id_raw = get("scmID")?;
        let scm_id = ScmId::from_raw(
            u128::from_str_radix(&scm_id_raw, 16).map_err(|e| format!("bad scmID: {e}"))?,
        );
        let creation_time_millis: u64 = get("cTime")?
            .parse()
            .map_err(|e| format!("bad cTime: {e}"))?;
        let layout_version: u32 = get("layoutVersion")?
            .parse()
            .map_err(|e| format!("bad layoutVersion: {e}"))?;
        let upgrading_to_layout_version = match fields.get("upgradingToLayoutVersion") {
            Some(raw) => Some(raw.parse().map_err(|e| format!("bad upgradingToLayoutVersion: {e}"))?),
            None => None,
        };

        Ok(Self {
            node_type,
            cluster_id,
            scm_id,
            creation_time_millis,
            layout_version,
            upgrading_to_layout_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let version = VersionFile::fresh("SCM", 1_700_000_000_000, 3);
        let serialized = version.serialize();
        let parsed = VersionFile::parse(&serialized).unwrap();
        assert_eq!(parsed, version);
    }

    #[test]
    fn detects_crash_mid_upgrade() {
        let mut version = VersionFile::fresh("SCM", 0, 3);
        assert!(!version.crashed_mid_upgrade());
        version.upgrading_to_layout_version = Some(4);
        assert!(version.crashed_mid_upgrade());
    }
}
