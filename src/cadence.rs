//! Cadence text-netlist parsers (C4, §4.4): three independent line-oriented
//! state machines over `pstxnet.dat`, `pstxprt.dat`, `pstchip.dat`, plus the
//! post-join step that produces [`crate::model::UniversalModel`] pin
//! entries enriched with logical pin names.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{is_valid_refdes, UniversalModel};

#[derive(Debug)]
pub enum CadenceError {
    Io(io::Error),
    MissingCompanionFile(&'static str),
}

impl fmt::Display for CadenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CadenceError::Io(e) => write!(f, "I/O error reading Cadence netlist: {e}"),
            CadenceError::MissingCompanionFile(which) => {
                write!(f, "missing companion file {which}; re-export the Cadence netlist")
            }
        }
    }
}

impl std::error::Error for CadenceError {}

impl From<io::Error> for CadenceError {
    fn from(e: io::Error) -> Self {
        CadenceError::Io(e)
    }
}

pub type CadenceResult<T> = Result<T, CadenceError>;

/// `netName -> refdes -> [pin]`, as accumulated from `pstxnet.dat`.
#[derive(Debug, Clone, Default)]
pub struct NetConnections {
    pub nets: HashMap<String, HashMap<String, Vec<String>>>,
}

/// One component section from `pstxprt.dat`.
#[derive(Debug, Clone, Default)]
pub struct ComponentDetails {
    pub refdes: String,
    pub part_name: String,
    pub mfgr_pn: Option<String>,
    pub descr: Option<String>,
}

/// One chip primitive from `pstchip.dat`.
#[derive(Debug, Clone, Default)]
pub struct ChipPart {
    pub part_name: String,
    /// pin name -> pin number
    pub pins: HashMap<String, String>,
    pub body: HashMap<String, String>,
}

impl ChipPart {
    pub fn value(&self) -> Option<&str> {
        self.body.get("VALUE").map(|s| s.as_str())
    }
}

fn single_quoted(line: &str) -> Option<&str> {
    let line = line.trim();
    let inner = line.strip_prefix('\'')?;
    let end = inner.find('\'')?;
    Some(&inner[..end])
}

/// Parse `pstxnet.dat` (§4.4).
pub fn parse_pstxnet(text: &str) -> NetConnections {
    #[derive(PartialEq)]
    enum State {
        Idle,
        AwaitingNetName,
        AwaitingNode,
    }

    let mut result = NetConnections::default();
    let mut state = State::Idle;
    let mut current_net: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("NET_NAME") {
            state = State::AwaitingNetName;
            continue;
        }
        if state == State::AwaitingNetName {
            if let Some(name) = single_quoted(line) {
                current_net = Some(name.to_string());
            }
            state = State::Idle;
            continue;
        }
        if line.starts_with("NODE_NAME") {
            state = State::AwaitingNode;
            continue;
        }
        if state == State::AwaitingNode {
            state = State::Idle;
            let mut tokens = line.split_whitespace();
            if let (Some(refdes), Some(pin), Some(net)) =
                (tokens.next(), tokens.next(), current_net.as_ref())
            {
                result
                    .nets
                    .entry(net.clone())
                    .or_default()
                    .entry(refdes.to_string())
                    .or_default()
                    .push(pin.to_string());
            }
        }
    }

    result
}

static PART_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\S+)\s+'([^']*)':;?$").unwrap());
static PROPERTY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").unwrap());

fn strip_trailing_punct(s: &str) -> String {
    s.trim().trim_end_matches([';', ',']).trim().to_string()
}

/// Parse `pstxprt.dat` (§4.4): returns the per-component details plus the
/// separate `refdes -> part_name` map used for the pin-name join.
pub fn parse_pstxprt(text: &str) -> (Vec<ComponentDetails>, HashMap<String, String>) {
    let mut components = Vec::new();
    let mut part_names = HashMap::new();

    #[derive(PartialEq)]
    enum State {
        Idle,
        AwaitingHeader,
        InSection,
    }
    let mut state = State::Idle;
    let mut current: Option<ComponentDetails> = None;

    let flush = |current: &mut Option<ComponentDetails>,
                 components: &mut Vec<ComponentDetails>,
                 part_names: &mut HashMap<String, String>| {
        if let Some(c) = current.take() {
            part_names.insert(c.refdes.clone(), c.part_name.clone());
            components.push(c);
        }
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "PART_NAME" {
            flush(&mut current, &mut components, &mut part_names);
            state = State::AwaitingHeader;
            continue;
        }

        if state == State::AwaitingHeader {
            if let Some(caps) = PART_LINE.captures(line) {
                current = Some(ComponentDetails {
                    refdes: caps[1].to_string(),
                    part_name: caps[2].to_string(),
                    mfgr_pn: None,
                    descr: None,
                });
                state = State::InSection;
            } else {
                state = State::Idle;
            }
            continue;
        }

        if state == State::InSection {
            if let Some(caps) = PROPERTY_LINE.captures(line) {
                let key = caps[1].to_ascii_uppercase();
                let value = strip_trailing_punct(&caps[2]);
                if let Some(c) = current.as_mut() {
                    match key.as_str() {
                        "MFGR_PN" => c.mfgr_pn = Some(value).filter(|s| !s.is_empty()),
                        "DESCR" => c.descr = Some(value).filter(|s| !s.is_empty()),
                        _ => {}
                    }
                }
            }
        }
    }
    flush(&mut current, &mut components, &mut part_names);

    (components, part_names)
}

static PRIMITIVE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^primitive\s+'([^']*)'").unwrap());
static PIN_NAME_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'([^']*)':$").unwrap());
static PIN_NUMBER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^PIN_NUMBER='\((\d+)\)';?$").unwrap());

/// Parse `pstchip.dat` (§4.4).
pub fn parse_pstchip(text: &str) -> Vec<ChipPart> {
    let mut parts = Vec::new();
    let mut current: Option<ChipPart> = None;
    let mut pending_pin_name: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = PRIMITIVE_LINE.captures(line) {
            if let Some(part) = current.take() {
                parts.push(part);
            }
            current = Some(ChipPart {
                part_name: caps[1].to_string(),
                ..Default::default()
            });
            pending_pin_name = None;
            continue;
        }

        let Some(part) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = PIN_NUMBER_LINE.captures(line) {
            if let Some(name) = pending_pin_name.take() {
                part.pins.insert(name, caps[1].to_string());
            }
            continue;
        }
        if let Some(caps) = PIN_NAME_LINE.captures(line) {
            pending_pin_name = Some(caps[1].to_string());
            continue;
        }
        if let Some(caps) = PROPERTY_LINE.captures(line) {
            let key = caps[1].to_ascii_uppercase();
            let value = strip_trailing_punct(&caps[2]);
            part.body.insert(key, value);
        }
    }
    if let Some(part) = current.take() {
        parts.push(part);
    }

    parts
}

fn read_companion_file(path: &Path, which: &'static str) -> CadenceResult<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            CadenceError::MissingCompanionFile(which)
        } else {
            CadenceError::Io(e)
        }
    })
}

/// Read the three companion files and build the universal model (§4.4).
pub fn import(pstxnet_path: &Path, pstxprt_path: &Path, pstchip_path: &Path) -> CadenceResult<UniversalModel> {
    let netconn_text = read_companion_file(pstxnet_path, "pstxnet.dat")?;
    let prt_text = read_companion_file(pstxprt_path, "pstxprt.dat")?;
    let chip_text = read_companion_file(pstchip_path, "pstchip.dat")?;

    let net_connections = parse_pstxnet(&netconn_text);
    let (components, part_names) = parse_pstxprt(&prt_text);
    let chip_parts = parse_pstchip(&chip_text);

    Ok(build_universal_model(&net_connections, &components, &part_names, &chip_parts))
}

/// The post-join step: project parsed Cadence records into the universal
/// model (§4.4 "Cadence post-join").
pub fn build_universal_model(
    net_connections: &NetConnections,
    components: &[ComponentDetails],
    part_names: &HashMap<String, String>,
    chip_parts: &[ChipPart],
) -> UniversalModel {
    let mut model = UniversalModel::new();

    for c in components {
        if !is_valid_refdes(&c.refdes) {
            continue;
        }
        let mpn = c
            .mfgr_pn
            .clone()
            .or_else(|| Some(c.part_name.clone()).filter(|s| !s.is_empty()));
        let component = model.ensure_component(&c.refdes);
        component.set_mpn(mpn);
        component.set_description(c.descr.clone());
    }

    let chips_by_name: HashMap<&str, &ChipPart> =
        chip_parts.iter().map(|c| (c.part_name.as_str(), c)).collect();

    for (net, refdes_map) in &net_connections.nets {
        for (refdes, pins) in refdes_map {
            if !is_valid_refdes(refdes) {
                continue;
            }
            model.ensure_component(refdes);

            let chip = part_names.get(refdes).and_then(|pn| chips_by_name.get(pn.as_str()));
            let reverse_pin_names: Option<HashMap<&str, &str>> = chip.map(|chip| {
                chip.pins
                    .iter()
                    .map(|(name, number)| (number.as_str(), name.as_str()))
                    .collect()
            });

            for pin in pins {
                let pin_name = reverse_pin_names
                    .as_ref()
                    .and_then(|m| m.get(pin.as_str()))
                    .copied();
                model.connect(net, refdes, pin, pin_name);
            }

            if let Some(chip) = chip {
                if let Some(value) = chip.value() {
                    let already_set = model
                        .components
                        .get(refdes)
                        .and_then(|c| c.value.as_ref())
                        .is_some();
                    if !already_set {
                        model.ensure_component(refdes).set_value(Some(value.to_string()));
                    }
                }
            }
        }
    }

    model
}
