//! Altium hierarchy & net extractor (C3, §4.3) plus the top-level import
//! path that ties together the compound-file reader (§4.1) and the
//! record-stream parser (§4.2) into a [`crate::model::UniversalModel`].
//!
//! Hierarchy is built over a flat, arena-style record list: parent/child
//! links are `OwnerIndex` integers into that list, never pointers (§9,
//! "Cyclic reference"). Net grouping runs a grid-indexed union-find over
//! each connectable's geometry plus a global-name bucket for off-page
//! connections (§4.3.5).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cfb::{CfbError, CompoundFile};
use crate::model::{is_valid_refdes, UniversalModel};
use crate::record_stream::{self, Record, RecordStreamError};

const TAG_COMPONENT: i64 = 1;
const TAG_PIN: i64 = 2;
const TAG_POWER_PORT: i64 = 17;
const TAG_NET_LABEL: i64 = 25;
const TAG_WIRE: i64 = 27;
const TAG_DESIGNATOR: i64 = 34;
const TAG_PARAMETER: i64 = 41;

const GRID_CELL: i64 = 10_000;

#[derive(Debug)]
pub enum AltiumError {
    Cfb(CfbError),
    RecordStream(RecordStreamError),
    Malformed(String),
}

impl fmt::Display for AltiumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltiumError::Cfb(e) => write!(f, "altium compound file error: {e}"),
            AltiumError::RecordStream(e) => write!(f, "altium record stream error: {e}"),
            AltiumError::Malformed(reason) => write!(f, "malformed altium schematic: {reason}"),
        }
    }
}

impl std::error::Error for AltiumError {}

impl From<CfbError> for AltiumError {
    fn from(e: CfbError) -> Self {
        AltiumError::Cfb(e)
    }
}

impl From<RecordStreamError> for AltiumError {
    fn from(e: RecordStreamError) -> Self {
        AltiumError::RecordStream(e)
    }
}

pub type AltiumResult<T> = Result<T, AltiumError>;

/// Decode a raw `.SchDoc` file on disk: open the OLE/CFB container, read the
/// `FileHeader` stream, and build the universal model.
pub fn import_schdoc(path: &Path) -> AltiumResult<UniversalModel> {
    let cfb = CompoundFile::open(path)?;
    let stream = cfb.read_stream("FileHeader")?;
    import_from_stream_bytes(&stream)
}

/// Decode an already-extracted `FileHeader` stream's raw bytes.
pub fn import_from_stream_bytes(data: &[u8]) -> AltiumResult<UniversalModel> {
    let parsed = record_stream::parse(data)?;
    build_universal_model(&parsed.body)
}

fn tag_of(r: &Record) -> Option<i64> {
    r.get_ci("Record").and_then(|s| s.parse().ok())
}

fn owner_index_of(r: &Record) -> Option<usize> {
    r.get_ci("OwnerIndex").and_then(|s| s.parse().ok())
}

fn text_of(r: &Record) -> Option<&str> {
    r.get_ci("Text")
}

/// `round(base * 10000 + frac)` for one coordinate attribute, accepting both
/// the numeric and all-caps alias for `key` and `key + "_Frac"` (§4.3.2).
fn coord(r: &Record, key: &str) -> i64 {
    let base: f64 = r.get_ci(key).and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let frac_key = format!("{key}_Frac");
    let frac: f64 = r
        .get_ci(&frac_key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    (base * 10000.0 + frac).round() as i64
}

fn location(r: &Record) -> (i64, i64) {
    (coord(r, "Location.X"), coord(r, "Location.Y"))
}

static WIRE_VERTEX_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^X(\d+)$").unwrap());

fn wire_vertices(r: &Record) -> Vec<(i64, i64)> {
    let mut indices: Vec<u32> = r
        .attrs
        .keys()
        .filter_map(|k| WIRE_VERTEX_KEY.captures(k))
        .filter_map(|c| c[1].parse().ok())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
        .into_iter()
        .map(|n| (coord(r, &format!("X{n}")), coord(r, &format!("Y{n}"))))
        .collect()
}

fn pin_vertices(r: &Record) -> Vec<(i64, i64)> {
    let origin = location(r);
    let length: f64 = r.get_ci("PinLength").and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let conglomerate: i64 = r
        .get_ci("PinConglomerate")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let quadrant = conglomerate & 0x03;
    let theta = (quadrant as f64) * std::f64::consts::FRAC_PI_2;
    let end_x = origin.0 as f64 + theta.cos() * length;
    let end_y = origin.1 as f64 + theta.sin() * length;
    vec![origin, (end_x.round() as i64, end_y.round() as i64)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnKind {
    Wire,
    Pin,
    NetLabel,
    PowerPort,
}

struct Connectable {
    record_index: usize,
    kind: ConnKind,
    vertices: Vec<(i64, i64)>,
    text: Option<String>,
}

impl Connectable {
    /// Consecutive-vertex segments; a single-vertex device degenerates to a
    /// zero-length segment at that point (§4.3.4).
    fn segments(&self) -> Vec<((i64, i64), (i64, i64))> {
        if self.vertices.len() <= 1 {
            let p = self.vertices.first().copied().unwrap_or((0, 0));
            vec![(p, p)]
        } else {
            self.vertices.windows(2).map(|w| (w[0], w[1])).collect()
        }
    }

    fn cells(&self) -> Vec<(i64, i64)> {
        let mut cells = HashSet::new();
        for seg in self.segments() {
            let (x1, y1) = seg.0;
            let (x2, y2) = seg.1;
            let (cx_lo, cx_hi) = (x1.min(x2).div_euclid(GRID_CELL), x1.max(x2).div_euclid(GRID_CELL));
            let (cy_lo, cy_hi) = (y1.min(y2).div_euclid(GRID_CELL), y1.max(y2).div_euclid(GRID_CELL));
            for cx in cx_lo..=cx_hi {
                for cy in cy_lo..=cy_hi {
                    cells.insert((cx, cy));
                }
            }
        }
        cells.into_iter().collect()
    }
}

fn point_on_segment(p: (i64, i64), seg: ((i64, i64), (i64, i64))) -> bool {
    let (px, py) = p;
    let ((x1, y1), (x2, y2)) = seg;
    px >= x1.min(x2) && px <= x1.max(x2) && py >= y1.min(y2) && py <= y1.max(y2)
}

fn geometrically_connected(a: &Connectable, b: &Connectable) -> bool {
    let b_segs = b.segments();
    if a.vertices.iter().any(|&v| b_segs.iter().any(|&s| point_on_segment(v, s))) {
        return true;
    }
    let a_segs = a.segments();
    b.vertices.iter().any(|&v| a_segs.iter().any(|&s| point_on_segment(v, s)))
}

/// Disjoint-set union-find with path compression and union by rank, indexed
/// by position in the connectables list (§4.3.5).
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// A component as extracted from a COMPONENT record and its children
/// (§4.3.7), before pins are connected to any net.
struct ExtractedComponent {
    refdes: String,
    mpn: Option<String>,
    comment: Option<String>,
    value: Option<String>,
    /// `(pin number, optional logical name)`, in child order.
    pins: Vec<(String, Option<String>)>,
}

fn children_map(body: &[Record]) -> HashMap<usize, Vec<usize>> {
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, r) in body.iter().enumerate() {
        if let Some(owner) = owner_index_of(r) {
            if owner < body.len() {
                children.entry(owner).or_default().push(i);
            }
        }
    }
    children
}

/// §4.3.3: a PIN is emitted only when it belongs to the currently realized
/// part of a multi-section component; absence of either attribute matches.
fn pin_matches_current_part(pin: &Record, owner: Option<&Record>) -> bool {
    let pin_part: Option<i64> = pin.get_ci("OwnerPartId").and_then(|s| s.parse().ok());
    let owner_part: Option<i64> = owner.and_then(|o| o.get_ci("CurrentPartId")).and_then(|s| s.parse().ok());
    match (pin_part, owner_part) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn first_designator_text(component_idx: usize, children: &HashMap<usize, Vec<usize>>, body: &[Record]) -> Option<String> {
    children.get(&component_idx)?.iter().find_map(|&ci| {
        let child = &body[ci];
        if tag_of(child) == Some(TAG_DESIGNATOR) {
            text_of(child).map(|s| s.to_string())
        } else {
            None
        }
    })
}

fn extract_component(
    idx: usize,
    body: &[Record],
    children: &HashMap<usize, Vec<usize>>,
) -> Option<ExtractedComponent> {
    let record = &body[idx];
    let refdes = first_designator_text(idx, children, body)?;
    if !is_valid_refdes(&refdes) {
        return None;
    }

    let param_children: Vec<&Record> = children
        .get(&idx)
        .into_iter()
        .flatten()
        .map(|&ci| &body[ci])
        .filter(|c| tag_of(c) == Some(TAG_PARAMETER))
        .collect();

    let find_param = |name: &str| -> Option<String> {
        param_children
            .iter()
            .find(|p| p.get_ci("Name") == Some(name))
            .and_then(|p| text_of(p))
            .map(|s| s.to_string())
    };

    let mpn = find_param("Manufacturer Part Number").filter(|s| !s.trim().is_empty());
    let value = find_param("Value").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let mut comment = find_param("Comment");
    if let Some(c) = comment.as_ref() {
        if let Some(target_name) = c.strip_prefix('=') {
            let resolved = param_children
                .iter()
                .find(|p| p.get_ci("Name").map(|n| n.eq_ignore_ascii_case(target_name)).unwrap_or(false))
                .and_then(|p| text_of(p))
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty());
            comment = resolved;
        }
    }
    if let (Some(c), Some(v)) = (comment.as_ref(), value.as_ref()) {
        if c == v {
            comment = None;
        }
    }

    let pins = children
        .get(&idx)
        .into_iter()
        .flatten()
        .filter_map(|&ci| {
            let pin = &body[ci];
            if tag_of(pin) != Some(TAG_PIN) {
                return None;
            }
            if !pin_matches_current_part(pin, Some(record)) {
                return None;
            }
            let number = pin.get_ci("Designator").unwrap_or_default().to_string();
            let name = pin.get_ci("Name").map(|s| s.to_string());
            Some((number, name))
        })
        .collect();

    Some(ExtractedComponent {
        refdes,
        mpn,
        comment,
        value,
        pins,
    })
}

fn select_connectables(body: &[Record]) -> Vec<Connectable> {
    let mut out = Vec::new();
    for (i, r) in body.iter().enumerate() {
        match tag_of(r) {
            Some(TAG_WIRE) => out.push(Connectable {
                record_index: i,
                kind: ConnKind::Wire,
                vertices: wire_vertices(r),
                text: None,
            }),
            Some(TAG_PIN) => {
                let owner = owner_index_of(r).and_then(|o| body.get(o));
                if !pin_matches_current_part(r, owner) {
                    continue;
                }
                out.push(Connectable {
                    record_index: i,
                    kind: ConnKind::Pin,
                    vertices: pin_vertices(r),
                    text: None,
                });
            }
            Some(TAG_NET_LABEL) => out.push(Connectable {
                record_index: i,
                kind: ConnKind::NetLabel,
                vertices: vec![location(r)],
                text: text_of(r).map(|s| s.to_string()),
            }),
            Some(TAG_POWER_PORT) => out.push(Connectable {
                record_index: i,
                kind: ConnKind::PowerPort,
                vertices: vec![location(r)],
                text: text_of(r).map(|s| s.to_string()),
            }),
            _ => {}
        }
    }
    out
}

/// Group connectables into nets via a grid-indexed union-find plus a
/// global-name bucket (§4.3.5). Returns the disjoint sets, each a list of
/// indices into `connectables`, members ordered by original record index.
fn group_into_nets(connectables: &[Connectable]) -> Vec<Vec<usize>> {
    let n = connectables.len();
    let mut uf = UnionFind::new(n);

    // Exact-vertex coincidence: any point touched by >=2 devices unions them.
    let mut point_devices: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, c) in connectables.iter().enumerate() {
        for &v in &c.vertices {
            point_devices.entry(v).or_default().push(i);
        }
    }
    for devices in point_devices.values() {
        if devices.len() >= 2 {
            for w in devices.windows(2) {
                uf.union(w[0], w[1]);
            }
        }
    }

    // Grid-indexed candidate search for the general geometric test.
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, c) in connectables.iter().enumerate() {
        for cell in c.cells() {
            grid.entry(cell).or_default().push(i);
        }
    }
    for (i, c) in connectables.iter().enumerate() {
        let mut candidates: HashSet<usize> = HashSet::new();
        for cell in c.cells() {
            if let Some(members) = grid.get(&cell) {
                candidates.extend(members.iter().copied());
            }
        }
        candidates.remove(&i);
        for j in candidates {
            if uf.find(i) == uf.find(j) {
                continue;
            }
            if geometrically_connected(c, &connectables[j]) {
                uf.union(i, j);
            }
        }
    }

    // Global-name buckets (off-page connections).
    let mut by_text: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, c) in connectables.iter().enumerate() {
        if matches!(c.kind, ConnKind::PowerPort | ConnKind::NetLabel) {
            if let Some(t) = c.text.as_deref() {
                if !t.is_empty() {
                    by_text.entry(t).or_default().push(i);
                }
            }
        }
    }
    for members in by_text.values() {
        if members.len() >= 2 {
            for w in members.windows(2) {
                uf.union(w[0], w[1]);
            }
        }
    }

    let mut sets: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        sets.entry(root).or_default().push(i);
    }
    let mut result: Vec<Vec<usize>> = sets.into_values().collect();
    for members in &mut result {
        members.sort_by_key(|&i| connectables[i].record_index);
    }
    // Stabilize net ordering itself by the minimum member record index.
    result.sort_by_key(|members| connectables[members[0]].record_index);
    result
}

/// Look up `(refdes, pin number)` for a PIN connectable via its owner
/// component's designator (§4.3.6, §4.3.8).
fn pin_identity(
    record_index: usize,
    body: &[Record],
    component_refdes: &HashMap<usize, String>,
) -> Option<(String, String)> {
    let pin = &body[record_index];
    let owner_idx = owner_index_of(pin)?;
    let refdes = component_refdes.get(&owner_idx)?.clone();
    let number = pin.get_ci("Designator").unwrap_or_default().to_string();
    Some((refdes, number))
}

fn compare_pin_numbers(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// §4.3.6: priority order for naming one net's disjoint set.
fn name_net(
    members: &[usize],
    connectables: &[Connectable],
    body: &[Record],
    component_refdes: &HashMap<usize, String>,
) -> Option<String> {
    let global = members
        .iter()
        .filter_map(|&i| {
            let c = &connectables[i];
            if matches!(c.kind, ConnKind::PowerPort | ConnKind::NetLabel) {
                c.text.as_ref().filter(|t| !t.is_empty()).map(|t| (c.record_index, t))
            } else {
                None
            }
        })
        .min_by_key(|&(idx, _)| idx);
    if let Some((_, text)) = global {
        return Some(text.clone());
    }

    let mut pins: Vec<(String, String)> = members
        .iter()
        .filter(|&&i| connectables[i].kind == ConnKind::Pin)
        .filter_map(|&i| pin_identity(connectables[i].record_index, body, component_refdes))
        .collect();
    if pins.is_empty() {
        return None;
    }
    pins.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| compare_pin_numbers(&a.1, &b.1)));
    let (refdes, pin) = &pins[0];
    Some(format!("Net{refdes}_{pin}"))
}

/// Build the universal model from a flat list of Altium body records
/// (§4.3.7, §4.3.8).
pub fn build_universal_model(body: &[Record]) -> AltiumResult<UniversalModel> {
    let children = children_map(body);

    let mut component_refdes: HashMap<usize, String> = HashMap::new();
    let mut extracted: BTreeMap<usize, ExtractedComponent> = BTreeMap::new();
    for (i, r) in body.iter().enumerate() {
        if tag_of(r) == Some(TAG_COMPONENT) {
            if let Some(ec) = extract_component(i, body, &children) {
                component_refdes.insert(i, ec.refdes.clone());
                extracted.insert(i, ec);
            }
        }
    }

    let mut model = UniversalModel::new();
    for ec in extracted.values() {
        let component = model.ensure_component(&ec.refdes);
        component.set_mpn(ec.mpn.clone());
        component.set_comment(ec.comment.clone());
        component.set_value(ec.value.clone());
        for (number, name) in &ec.pins {
            model.connect(crate::model::NC, &ec.refdes, number, name.as_deref());
        }
    }

    let connectables = select_connectables(body);
    let sets = group_into_nets(&connectables);

    let mut unnamed_counter = 1u32;
    for members in &sets {
        let name = name_net(members, &connectables, body, &component_refdes).unwrap_or_else(|| {
            let n = format!("UnnamedNet{unnamed_counter}");
            unnamed_counter += 1;
            n
        });

        let pins: Vec<(String, String)> = members
            .iter()
            .filter(|&&i| connectables[i].kind == ConnKind::Pin)
            .filter_map(|&i| pin_identity(connectables[i].record_index, body, &component_refdes))
            .collect();

        // Suppress nets that carry only a single pin and nothing else (§4.3.8).
        if pins.is_empty() || (pins.len() == 1 && members.len() == 1) {
            continue;
        }

        for (refdes, pin) in pins {
            model.connect(&name, &refdes, &pin, None);
        }
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::cfb::fixtures::build_minimal_cfb;
    use tempfile::NamedTempFile;

    /// Builds a raw `FileHeader` stream byte buffer (§4.2 heuristic) out of
    /// `KEY=VALUE` segment strings, mirroring `record_stream.rs`'s own test
    /// helper of the same shape.
    fn wrap_record_stream(segments: &[&str]) -> Vec<u8> {
        let mut out = vec![0u8; 5];
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(&[b'L', b'E', b'N', 0x00, 0x00, b'|']);
            }
            out.extend_from_slice(segment.as_bytes());
        }
        out.push(0x00);
        out
    }

    #[test]
    fn import_schdoc_round_trips_through_disk() {
        let stream = wrap_record_stream(&[
            "RECORD=1|CURRENTPARTID=1",
            "RECORD=34|OWNERINDEX=0|TEXT=R1",
            "RECORD=2|OWNERINDEX=0|DESIGNATOR=1|NAME=1|LOCATION.X=0|LOCATION.Y=0|PINLENGTH=100|PINCONGLOMERATE=0",
        ]);
        let cfb_bytes = build_minimal_cfb("FileHeader", &stream);

        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(&cfb_bytes).expect("write cfb bytes");
        file.flush().expect("flush temp file");

        let model = import_schdoc(file.path()).expect("decode schdoc from disk");
        assert!(model.components.contains_key("R1"));
        assert_eq!(model.components["R1"].pins["1"].net(), crate::model::NC);
    }

    fn record(index: usize, pairs: &[(&str, &str)]) -> Record {
        let mut attrs = BTreeMap::new();
        for (k, v) in pairs {
            attrs.insert(k.to_string(), v.to_string());
        }
        Record { index, attrs }
    }

    #[test]
    fn empty_schematic_yields_empty_model() {
        let body: Vec<Record> = vec![];
        let model = build_universal_model(&body).unwrap();
        assert!(model.nets.is_empty());
        assert!(model.components.is_empty());
    }

    #[test]
    fn single_pin_net_is_suppressed() {
        // A component with one pin connected to nothing else: no wire, no
        // label, no other pin sharing a coordinate.
        let body = vec![
            record(0, &[("RECORD", "1"), ("CURRENTPARTID", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "R1")]),
            record(
                2,
                &[
                    ("RECORD", "2"),
                    ("OWNERINDEX", "0"),
                    ("DESIGNATOR", "1"),
                    ("NAME", "1"),
                    ("LOCATION.X", "0"),
                    ("LOCATION.Y", "0"),
                    ("PINLENGTH", "100"),
                    ("PINCONGLOMERATE", "0"),
                ],
            ),
        ];
        let model = build_universal_model(&body).unwrap();
        assert!(model.components.contains_key("R1"));
        assert_eq!(model.components["R1"].pins["1"].net(), crate::model::NC);
        assert!(!model
            .nets
            .values()
            .any(|refdes_map| refdes_map.contains_key("R1") && refdes_map.len() == 1));
    }

    #[test]
    fn two_pins_sharing_a_coordinate_form_a_net() {
        let body = vec![
            record(0, &[("RECORD", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "R1")]),
            record(
                2,
                &[
                    ("RECORD", "2"),
                    ("OWNERINDEX", "0"),
                    ("DESIGNATOR", "1"),
                    ("LOCATION.X", "0"),
                    ("LOCATION.Y", "0"),
                    ("PINLENGTH", "0"),
                    ("PINCONGLOMERATE", "0"),
                ],
            ),
            record(3, &[("RECORD", "1")]),
            record(4, &[("RECORD", "34"), ("OWNERINDEX", "3"), ("TEXT", "R2")]),
            record(
                5,
                &[
                    ("RECORD", "2"),
                    ("OWNERINDEX", "3"),
                    ("DESIGNATOR", "1"),
                    ("LOCATION.X", "0"),
                    ("LOCATION.Y", "0"),
                    ("PINLENGTH", "0"),
                    ("PINCONGLOMERATE", "0"),
                ],
            ),
        ];
        let model = build_universal_model(&body).unwrap();
        let net = model.components["R1"].pins["1"].net().to_string();
        assert_eq!(model.components["R2"].pins["1"].net(), net);
        assert!(model.nets[&net].contains_key("R1"));
        assert!(model.nets[&net].contains_key("R2"));
    }

    #[test]
    fn power_ports_with_same_text_at_distant_coords_union() {
        let body = vec![
            record(
                0,
                &[("RECORD", "17"), ("TEXT", "GND"), ("LOCATION.X", "0"), ("LOCATION.Y", "0")],
            ),
            record(
                1,
                &[
                    ("RECORD", "17"),
                    ("TEXT", "GND"),
                    ("LOCATION.X", "99999999"),
                    ("LOCATION.Y", "99999999"),
                ],
            ),
        ];
        let connectables = select_connectables(&body);
        let sets = group_into_nets(&connectables);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
    }

    #[test]
    fn comment_indirection_drops_when_equal_to_value() {
        let body = vec![
            record(0, &[("RECORD", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "C1")]),
            record(2, &[("RECORD", "41"), ("OWNERINDEX", "0"), ("NAME", "Value"), ("TEXT", "100nF")]),
            record(3, &[("RECORD", "41"), ("OWNERINDEX", "0"), ("NAME", "Comment"), ("TEXT", "=Value")]),
        ];
        let model = build_universal_model(&body).unwrap();
        let c1 = &model.components["C1"];
        assert_eq!(c1.value.as_deref(), Some("100nF"));
        assert_eq!(c1.comment, None);
    }

    #[test]
    fn mpn_parameter_is_extracted() {
        let body = vec![
            record(0, &[("RECORD", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "U1")]),
            record(
                2,
                &[
                    ("RECORD", "41"),
                    ("OWNERINDEX", "0"),
                    ("NAME", "Manufacturer Part Number"),
                    ("TEXT", "ABC-123"),
                ],
            ),
        ];
        let model = build_universal_model(&body).unwrap();
        assert_eq!(model.components["U1"].mpn.as_deref(), Some("ABC-123"));
    }

    #[test]
    fn instance_path_refdes_is_filtered() {
        let body = vec![
            record(0, &[("RECORD", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "sheet1@R1")]),
        ];
        let model = build_universal_model(&body).unwrap();
        assert!(model.components.is_empty());
    }

    #[test]
    fn wire_connects_distant_pins() {
        let body = vec![
            record(0, &[("RECORD", "1")]),
            record(1, &[("RECORD", "34"), ("OWNERINDEX", "0"), ("TEXT", "R1")]),
            record(
                2,
                &[
                    ("RECORD", "2"),
                    ("OWNERINDEX", "0"),
                    ("DESIGNATOR", "1"),
                    ("LOCATION.X", "0"),
                    ("LOCATION.Y", "0"),
                    ("PINLENGTH", "0"),
                    ("PINCONGLOMERATE", "0"),
                ],
            ),
            record(3, &[("RECORD", "1")]),
            record(4, &[("RECORD", "34"), ("OWNERINDEX", "3"), ("TEXT", "R2")]),
            record(
                5,
                &[
                    ("RECORD", "2"),
                    ("OWNERINDEX", "3"),
                    ("DESIGNATOR", "1"),
                    ("LOCATION.X", "500000"),
                    ("LOCATION.Y", "0"),
                    ("PINLENGTH", "0"),
                    ("PINCONGLOMERATE", "0"),
                ],
            ),
            record(
                6,
                &[
                    ("RECORD", "27"),
                    ("X1", "0"),
                    ("Y1", "0"),
                    ("X2", "500000"),
                    ("Y2", "0"),
                ],
            ),
        ];
        let model = build_universal_model(&body).unwrap();
        let net = model.components["R1"].pins["1"].net().to_string();
        assert_eq!(model.components["R2"].pins["1"].net(), net);
    }
}
