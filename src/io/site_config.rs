//! Per-site detector parameterization.
//!
//! The option table is a flat XML file with one element per site, the element
//! name being the NOD identifier, plus a mandatory `default` element:
//!
//! ```xml
//! <ropo-options default-profile="COLD">
//!   <default parameters="DBZH" threshold="DEFAULT" highest-elev="2.0"
//!            restore-fill="True" restore-thresh="108"
//!            softcut="5,170,180" speckNormOld="-20,24,8"
//!            emitter2="-30,3,2" ship="20,8" speck="10,12"/>
//!   <sekir threshold="VERY_COLD" restore="True" restore-thresh="108"
//!          speck="10,12"/>
//! </ropo-options>
//! ```
//!
//! All values are validated when the table is loaded; a malformed table is a
//! fatal configuration error.

use crate::io::odim_source::RadarSourceId;
use crate::types::{RopoError, RopoResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// Reflectivity threshold specification for one site.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdSpec {
    /// A literal dBZ value.
    Literal(f64),
    /// The name of a monthly climate profile, resolved per volume date.
    Profile(String),
    /// No thresholding; detectors requiring an absolute threshold are skipped.
    Unset,
}

/// Options controlling the detector sequence for one radar site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOptions {
    /// Quantity to process.
    pub parameters: String,
    pub threshold: ThresholdSpec,
    /// Elevation angle cutoff in degrees; the higher-order detectors
    /// (speckNormOld, softcut, ship, emitter2) are skipped at or above it.
    pub highest_elev: f64,
    pub restore: bool,
    pub restore_fill: bool,
    /// Probability threshold (working-plane units) for restoration.
    pub restore_thresh: u8,
    pub speck: Option<(i32, i32)>,
    pub speck_norm_old: Option<(i32, i32, i32)>,
    pub softcut: Option<(i32, i32, i32)>,
    pub emitter2: Option<(i32, i32, i32)>,
    pub ship: Option<(i32, i32)>,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            parameters: "DBZH".to_string(),
            threshold: ThresholdSpec::Unset,
            highest_elev: 90.0,
            restore: false,
            restore_fill: false,
            restore_thresh: 0,
            speck: None,
            speck_norm_old: None,
            softcut: None,
            emitter2: None,
            ship: None,
        }
    }
}

/// Owned per-site option table, constructed once at startup and passed by
/// reference into the processors.
#[derive(Debug, Clone)]
pub struct SiteConfigStore {
    sites: HashMap<String, SiteOptions>,
    /// Profile the name "DEFAULT" aliases to, from the root element.
    pub default_profile: String,
}

impl SiteConfigStore {
    /// Loads the option table from an XML file.
    pub fn load<P: AsRef<Path>>(path: P) -> RopoResult<SiteConfigStore> {
        log::info!("Loading site options from {}", path.as_ref().display());
        let xml = std::fs::read_to_string(path)?;
        Self::parse_str(&xml)
    }

    /// Re-reads the option table, replacing the current contents.
    pub fn reload<P: AsRef<Path>>(&mut self, path: P) -> RopoResult<()> {
        *self = Self::load(path)?;
        Ok(())
    }

    /// Parses the option table from an XML string.
    pub fn parse_str(xml: &str) -> RopoResult<SiteConfigStore> {
        let mut reader = Reader::from_str(xml);

        let mut sites: HashMap<String, SiteOptions> = HashMap::new();
        let mut default_profile: Option<String> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if depth == 0 {
                        default_profile = Some(parse_root(&e)?);
                    } else {
                        let (name, opts) = parse_site(&e)?;
                        sites.insert(name, opts);
                    }
                    depth += 1;
                }
                Ok(Event::Empty(e)) => {
                    if depth == 0 {
                        return Err(RopoError::Config(
                            "site option table has an empty root element".to_string(),
                        ));
                    }
                    let (name, opts) = parse_site(&e)?;
                    sites.insert(name, opts);
                }
                Ok(Event::End(_)) => {
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RopoError::XmlParsing(e.to_string())),
            }
        }

        let default_profile = default_profile.ok_or_else(|| {
            RopoError::Config("site option table is missing the root element".to_string())
        })?;

        if !sites.contains_key("default") {
            return Err(RopoError::Config(
                "site option table is missing the \"default\" entry".to_string(),
            ));
        }

        log::debug!("Loaded options for {} sites", sites.len());
        Ok(SiteConfigStore {
            sites,
            default_profile,
        })
    }

    /// Direct lookup by NOD identifier.
    pub fn site(&self, nod: &str) -> Option<&SiteOptions> {
        self.sites.get(nod)
    }

    /// Resolves the options for a radar object from its what/source string.
    ///
    /// When the NOD identifier is absent it is recovered from the WMO station
    /// number and the source string is repaired in place. An unknown site
    /// falls back to the `default` entry. The returned options are an owned
    /// copy; callers may mutate them freely.
    pub fn resolve(&self, source: &mut String) -> RopoResult<SiteOptions> {
        let mut id = RadarSourceId::parse(source);
        if id.nod.is_none() {
            if let Some(wmo) = &id.wmo {
                if let Some(nod) = RadarSourceId::nod_from_wmo(wmo) {
                    log::debug!("Repairing source {:?}: NOD recovered as {}", source, nod);
                    id.nod = Some(nod.to_string());
                    *source = id.to_source();
                }
            }
        }

        let key = id.nod.as_deref().unwrap_or("default");
        let opts = self
            .sites
            .get(key)
            .or_else(|| self.sites.get("default"))
            .ok_or_else(|| {
                RopoError::Config("no site options and no \"default\" entry".to_string())
            })?;
        Ok(opts.clone())
    }
}

fn parse_root(e: &BytesStart<'_>) -> RopoResult<String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| RopoError::XmlParsing(e.to_string()))?;
        if attr.key.as_ref() == b"default-profile" {
            let value = attr
                .unescape_value()
                .map_err(|e| RopoError::XmlParsing(e.to_string()))?;
            return Ok(value.to_string());
        }
    }
    Err(RopoError::Config(
        "root element is missing the required default-profile attribute".to_string(),
    ))
}

fn parse_site(e: &BytesStart<'_>) -> RopoResult<(String, SiteOptions)> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut opts = SiteOptions::default();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| RopoError::XmlParsing(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| RopoError::XmlParsing(e.to_string()))?
            .to_string();

        match key.as_str() {
            "parameters" => opts.parameters = value,
            "threshold" => {
                opts.threshold = match value.parse::<f64>() {
                    Ok(v) => ThresholdSpec::Literal(v),
                    Err(_) if value == "NONE" => ThresholdSpec::Unset,
                    Err(_) => ThresholdSpec::Profile(value),
                }
            }
            "highest-elev" => opts.highest_elev = parse_number(&name, &key, &value)?,
            "restore" => opts.restore = parse_bool(&name, &key, &value)?,
            "restore-fill" => opts.restore_fill = parse_bool(&name, &key, &value)?,
            "restore-thresh" => {
                let v: f64 = parse_number(&name, &key, &value)?;
                if !(0.0..=255.0).contains(&v) {
                    return Err(RopoError::Config(format!(
                        "site {}: {}={} out of range 0..255",
                        name, key, value
                    )));
                }
                opts.restore_thresh = v.round() as u8;
            }
            "speck" => opts.speck = Some(parse_tuple2(&name, &key, &value)?),
            "ship" => opts.ship = Some(parse_tuple2(&name, &key, &value)?),
            "speckNormOld" => opts.speck_norm_old = Some(parse_tuple3(&name, &key, &value)?),
            "softcut" => opts.softcut = Some(parse_tuple3(&name, &key, &value)?),
            "emitter2" => opts.emitter2 = Some(parse_tuple3(&name, &key, &value)?),
            _ => {
                log::debug!("Ignoring unrecognized site attribute {}/{}", name, key);
            }
        }
    }

    Ok((name, opts))
}

fn parse_number(site: &str, key: &str, value: &str) -> RopoResult<f64> {
    value.parse::<f64>().map_err(|_| {
        RopoError::Config(format!("site {}: malformed number {}={:?}", site, key, value))
    })
}

fn parse_bool(site: &str, key: &str, value: &str) -> RopoResult<bool> {
    match value {
        "True" | "true" | "1" => Ok(true),
        "False" | "false" | "0" => Ok(false),
        _ => Err(RopoError::Config(format!(
            "site {}: malformed boolean {}={:?}",
            site, key, value
        ))),
    }
}

fn parse_ints(site: &str, key: &str, value: &str) -> RopoResult<Vec<i32>> {
    value
        .split(',')
        .map(|part| {
            part.trim().parse::<i32>().map_err(|_| {
                RopoError::Config(format!(
                    "site {}: malformed tuple {}={:?}",
                    site, key, value
                ))
            })
        })
        .collect()
}

fn parse_tuple2(site: &str, key: &str, value: &str) -> RopoResult<(i32, i32)> {
    match parse_ints(site, key, value)?.as_slice() {
        [a, b] => Ok((*a, *b)),
        _ => Err(RopoError::Config(format!(
            "site {}: {}={:?} must have exactly 2 elements",
            site, key, value
        ))),
    }
}

fn parse_tuple3(site: &str, key: &str, value: &str) -> RopoResult<(i32, i32, i32)> {
    match parse_ints(site, key, value)?.as_slice() {
        [a, b, c] => Ok((*a, *b, *c)),
        _ => Err(RopoError::Config(format!(
            "site {}: {}={:?} must have exactly 3 elements",
            site, key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<ropo-options default-profile="COLD">
        <default parameters="DBZH" threshold="DEFAULT" highest-elev="2.0"
                 restore-fill="True" restore-thresh="108"
                 softcut="5,170,180" speckNormOld="-20,24,8"
                 emitter2="-30,3,2" ship="20,8" speck="10,12"/>
        <sekir threshold="VERY_COLD" restore="True" restore-thresh="108" speck="10,12"/>
        <seang threshold="-6" restore-fill="True" restore-thresh="154" speck="10,12"/>
    </ropo-options>"#;

    #[test]
    fn parses_default_and_sites() {
        let store = SiteConfigStore::parse_str(XML).unwrap();
        assert_eq!(store.default_profile, "COLD");

        let d = store.site("default").unwrap();
        assert_eq!(d.parameters, "DBZH");
        assert_eq!(d.threshold, ThresholdSpec::Profile("DEFAULT".to_string()));
        assert_eq!(d.highest_elev, 2.0);
        assert!(d.restore_fill && !d.restore);
        assert_eq!(d.restore_thresh, 108);
        assert_eq!(d.softcut, Some((5, 170, 180)));
        assert_eq!(d.speck_norm_old, Some((-20, 24, 8)));
        assert_eq!(d.emitter2, Some((-30, 3, 2)));
        assert_eq!(d.ship, Some((20, 8)));
        assert_eq!(d.speck, Some((10, 12)));

        let s = store.site("seang").unwrap();
        assert_eq!(s.threshold, ThresholdSpec::Literal(-6.0));
    }

    #[test]
    fn missing_default_entry_is_fatal() {
        let xml = r#"<ropo-options default-profile="COLD">
            <sekir speck="10,12"/>
        </ropo-options>"#;
        assert!(matches!(
            SiteConfigStore::parse_str(xml),
            Err(RopoError::Config(_))
        ));
    }

    #[test]
    fn malformed_tuple_is_fatal() {
        let xml = r#"<ropo-options default-profile="COLD">
            <default speck="10,oops"/>
        </ropo-options>"#;
        assert!(matches!(
            SiteConfigStore::parse_str(xml),
            Err(RopoError::Config(_))
        ));
    }

    #[test]
    fn resolve_repairs_source_from_wmo() {
        let store = SiteConfigStore::parse_str(XML).unwrap();
        let mut source = "WMO:02032,RAD:SE40".to_string();
        let opts = store.resolve(&mut source).unwrap();
        assert!(source.contains("NOD:sekir"));
        assert_eq!(opts.threshold, ThresholdSpec::Profile("VERY_COLD".to_string()));
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let store = SiteConfigStore::parse_str(XML).unwrap();
        let mut source = "NOD:nowhere".to_string();
        let opts = store.resolve(&mut source).unwrap();
        assert_eq!(opts.threshold, ThresholdSpec::Profile("DEFAULT".to_string()));
    }

    #[test]
    fn resolve_returns_isolated_copies() {
        let store = SiteConfigStore::parse_str(XML).unwrap();
        let mut source = "NOD:sekir".to_string();
        let mut opts = store.resolve(&mut source).unwrap();
        opts.threshold = ThresholdSpec::Literal(4.0);
        let again = store.resolve(&mut source).unwrap();
        assert_eq!(again.threshold, ThresholdSpec::Profile("VERY_COLD".to_string()));
    }
}
