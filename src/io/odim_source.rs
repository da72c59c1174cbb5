//! ODIM what/source identifier handling.
//!
//! A source string is a comma separated list of KEY:value pairs, e.g.
//! `WMO:02606,RAD:SE50,PLC:Angelholm,NOD:seang`. Site options are keyed by
//! the NOD identifier; when it is absent it can usually be recovered from the
//! WMO station number.

/// Excerpt of the ODIM source registry, WMO station number to NOD identifier.
/// Covers the radars this processor is routinely configured for.
const WMO_TO_NOD: &[(&str, &str)] = &[
    ("02606", "seang"),
    ("02570", "sevil"),
    ("02032", "sekir"),
    ("02092", "selul"),
    ("02200", "seosu"),
    ("02262", "searl"),
    ("02334", "sehud"),
    ("02430", "selek"),
    ("02588", "sease"),
    ("02600", "sevar"),
    ("02666", "sekkr"),
    ("02954", "fianj"),
    ("02918", "fikuo"),
    ("02840", "filuo"),
    ("02870", "fiuta"),
    ("02925", "fivim"),
    ("02975", "fivan"),
];

/// Structured station identifier parsed from a what/source string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadarSourceId {
    pub wmo: Option<String>,
    pub nod: Option<String>,
    pub rad: Option<String>,
    pub plc: Option<String>,
    pub org: Option<String>,
}

impl RadarSourceId {
    /// Parses a what/source string. Unknown keys are ignored.
    pub fn parse(source: &str) -> RadarSourceId {
        let mut id = RadarSourceId::default();
        for pair in source.split(',') {
            let mut it = pair.splitn(2, ':');
            let key = it.next().unwrap_or("").trim();
            let value = it.next().unwrap_or("").trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "WMO" => id.wmo = Some(value.to_string()),
                "NOD" => id.nod = Some(value.to_string()),
                "RAD" => id.rad = Some(value.to_string()),
                "PLC" => id.plc = Some(value.to_string()),
                "ORG" => id.org = Some(value.to_string()),
                _ => {}
            }
        }
        id
    }

    /// Looks up the NOD identifier for a WMO station number.
    pub fn nod_from_wmo(wmo: &str) -> Option<&'static str> {
        WMO_TO_NOD
            .iter()
            .find(|(w, _)| *w == wmo)
            .map(|(_, nod)| *nod)
    }

    /// Canonical source string with all known keys present.
    pub fn to_source(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = &self.wmo {
            parts.push(format!("WMO:{}", v));
        }
        if let Some(v) = &self.rad {
            parts.push(format!("RAD:{}", v));
        }
        if let Some(v) = &self.plc {
            parts.push(format!("PLC:{}", v));
        }
        if let Some(v) = &self.nod {
            parts.push(format!("NOD:{}", v));
        }
        if let Some(v) = &self.org {
            parts.push(format!("ORG:{}", v));
        }
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_source() {
        let id = RadarSourceId::parse("WMO:02606,RAD:SE50,PLC:Angelholm,NOD:seang");
        assert_eq!(id.wmo.as_deref(), Some("02606"));
        assert_eq!(id.nod.as_deref(), Some("seang"));
        assert_eq!(id.rad.as_deref(), Some("SE50"));
        assert_eq!(id.plc.as_deref(), Some("Angelholm"));
    }

    #[test]
    fn parse_ignores_unknown_keys() {
        let id = RadarSourceId::parse("NOD:sekir,XYZ:foo");
        assert_eq!(id.nod.as_deref(), Some("sekir"));
        assert_eq!(id.wmo, None);
    }

    #[test]
    fn wmo_lookup_recovers_nod() {
        assert_eq!(RadarSourceId::nod_from_wmo("02606"), Some("seang"));
        assert_eq!(RadarSourceId::nod_from_wmo("99999"), None);
    }

    #[test]
    fn canonical_roundtrip_keeps_keys() {
        let mut id = RadarSourceId::parse("WMO:02606,RAD:SE50");
        id.nod = Some("seang".to_string());
        assert_eq!(id.to_source(), "WMO:02606,RAD:SE50,NOD:seang");
    }
}
