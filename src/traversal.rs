//! XNET traversal engine (C5, §4.5): breadth-first exploration over the
//! universal netlist that follows series passives until it reaches an
//! active device or a power/ground rail, then aggregates and fingerprints
//! the result.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::{Component, UniversalModel, NC};
use crate::patterns;

/// Natural-order comparison with the text runs folded case-insensitively
/// (§4.5.3: "text runs compared case-insensitively lexicographically"), so
/// ordering — and the topology fingerprint that depends on it (§4.5.5) — does
/// not change with a refdes or pin id's letter case.
fn natural_compare(a: &str, b: &str) -> std::cmp::Ordering {
    natord::compare(&a.to_lowercase(), &b.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    GroundNet(String),
    UnknownNet(String),
    UnknownComponent(String),
    UnknownPin { refdes: String, pin: String },
    InvalidPinSpec(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::GroundNet(net) => write!(
                f,
                "net {net:?} is a ground net and cannot be queried: ground nets have no meaningful XNET"
            ),
            QueryError::UnknownNet(net) => {
                write!(f, "net {net:?} not found in this design; check the net name and try again")
            }
            QueryError::UnknownComponent(refdes) => {
                write!(f, "component {refdes:?} not found in this design")
            }
            QueryError::UnknownPin { refdes, pin } => {
                write!(f, "pin {pin:?} not found on component {refdes:?}")
            }
            QueryError::InvalidPinSpec(spec) => {
                write!(f, "invalid pin spec {spec:?}; expected REFDES.PIN")
            }
        }
    }
}

impl std::error::Error for QueryError {}

pub type QueryResult<T> = Result<T, QueryError>;

/// Traversal tunables (§4.5.2), built with the crate's `with_x` builder
/// convention instead of being loaded from a config file (§10).
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    skip_types: HashSet<String>,
    include_dns: bool,
}

impl TraversalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip_types(mut self, prefixes: impl IntoIterator<Item = String>) -> Self {
        self.skip_types = prefixes.into_iter().map(|p| p.to_ascii_uppercase()).collect();
        self
    }

    pub fn with_include_dns(mut self, include_dns: bool) -> Self {
        self.include_dns = include_dns;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub net: String,
    pub pins: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Orientation {
    pub refdes: Vec<String>,
    pub connections: Vec<Connection>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    pub dns: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refdes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<Connection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientations: Option<Vec<Orientation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResult {
    pub starting_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net: Option<String>,
    pub total_components: usize,
    pub unique_configurations: usize,
    pub components_by_mpn: Vec<AggregatedComponent>,
    pub visited_nets: Vec<String>,
    pub circuit_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<BTreeMap<String, usize>>,
}

#[derive(Debug, Clone)]
struct PinRecord {
    refdes: String,
    pin: String,
    net: String,
    mpn: Option<String>,
    description: Option<String>,
    comment: Option<String>,
    value: Option<String>,
    dns: bool,
}

/// One refdes's worth of traversal output, folded from the flat pin-record
/// list (§4.5.3), before MPN aggregation.
#[derive(Debug, Clone)]
struct GroupedComponent {
    refdes: String,
    mpn: Option<String>,
    description: Option<String>,
    #[allow(dead_code)]
    comment: Option<String>,
    #[allow(dead_code)]
    value: Option<String>,
    dns: bool,
    connections: Vec<Connection>,
}

fn is_dns_component(c: &Component) -> bool {
    let haystack = format!(
        "{} {} {}",
        c.mpn.as_deref().unwrap_or(""),
        c.description.as_deref().unwrap_or(""),
        c.comment.as_deref().unwrap_or(""),
    );
    patterns::is_dns(&haystack)
}

fn make_record(refdes: &str, pin: &str, net: &str, component: &Component, dns: bool) -> PinRecord {
    PinRecord {
        refdes: refdes.to_string(),
        pin: pin.to_string(),
        net: net.to_string(),
        mpn: component.mpn.clone(),
        description: component.description.clone(),
        comment: component.comment.clone(),
        value: component.value.clone(),
        dns,
    }
}

/// Find the `skip_types` prefix (if any) matching `refdes`, and account for
/// it in `skipped`/`skipped_refdes_seen` the first time this refdes is seen
/// (§4.5.2, step 1).
fn record_skip_if_matched(
    refdes: &str,
    opts: &TraversalOptions,
    skipped: &mut BTreeMap<String, usize>,
    skipped_refdes_seen: &mut HashSet<String>,
) -> bool {
    let upper = refdes.to_ascii_uppercase();
    let Some(prefix) = opts.skip_types.iter().find(|p| upper.starts_with(p.as_str())) else {
        return false;
    };
    if skipped_refdes_seen.insert(refdes.to_string()) {
        *skipped.entry(prefix.clone()).or_insert(0) += 1;
    }
    true
}

struct TraversalState {
    queue: VecDeque<String>,
    visited_nets: HashSet<String>,
    visited_pins: HashSet<(String, String)>,
    records: Vec<PinRecord>,
    skipped: BTreeMap<String, usize>,
    skipped_refdes_seen: HashSet<String>,
}

fn run_traversal(model: &UniversalModel, start_net: &str, opts: &TraversalOptions) -> TraversalState {
    let mut state = TraversalState {
        queue: VecDeque::from([start_net.to_string()]),
        visited_nets: HashSet::from([start_net.to_string()]),
        visited_pins: HashSet::new(),
        records: Vec::new(),
        skipped: BTreeMap::new(),
        skipped_refdes_seen: HashSet::new(),
    };

    while let Some(net) = state.queue.pop_front() {
        let Some(refdes_map) = model.nets.get(&net) else {
            continue;
        };

        for (refdes, pins) in refdes_map {
            let Some(component) = model.components.get(refdes) else {
                continue;
            };

            if record_skip_if_matched(refdes, opts, &mut state.skipped, &mut state.skipped_refdes_seen) {
                continue;
            }
            let dns = is_dns_component(component);
            if dns && !opts.include_dns {
                continue;
            }

            for p in pins {
                let key = (refdes.clone(), p.clone());
                if state.visited_pins.contains(&key) {
                    continue;
                }
                state.visited_pins.insert(key);
                state.records.push(make_record(refdes, p, &net, component, dns));
            }

            if !patterns::is_passive(refdes) {
                continue;
            }

            for (p2, entry) in &component.pins {
                let key = (refdes.clone(), p2.clone());
                if state.visited_pins.contains(&key) {
                    continue;
                }
                state.visited_pins.insert(key);
                let n2 = entry.net().to_string();
                state.records.push(make_record(refdes, p2, &n2, component, dns));

                if state.visited_nets.contains(&n2) {
                    continue;
                }
                state.visited_nets.insert(n2.clone());

                if patterns::is_stop_net(&n2) {
                    let mut passive_follow = false;
                    if let Some(endpoint_map) = model.nets.get(&n2) {
                        for (erefdes, epins) in endpoint_map {
                            if erefdes == refdes {
                                continue;
                            }
                            let Some(ecomponent) = model.components.get(erefdes) else {
                                continue;
                            };
                            if patterns::is_passive(erefdes) {
                                passive_follow = true;
                                continue;
                            }
                            if record_skip_if_matched(erefdes, opts, &mut state.skipped, &mut state.skipped_refdes_seen) {
                                continue;
                            }
                            let edns = is_dns_component(ecomponent);
                            if edns && !opts.include_dns {
                                continue;
                            }
                            for ep in epins {
                                let ekey = (erefdes.clone(), ep.clone());
                                if state.visited_pins.contains(&ekey) {
                                    continue;
                                }
                                state.visited_pins.insert(ekey);
                                state.records.push(make_record(erefdes, ep, &n2, ecomponent, edns));
                            }
                        }
                    }
                    if passive_follow {
                        state.queue.push_back(n2);
                    }
                } else {
                    state.queue.push_back(n2);
                }
            }
        }
    }

    state
}

fn group_by_refdes(records: &[PinRecord]) -> Vec<GroupedComponent> {
    let mut by_refdes: HashMap<&str, Vec<&PinRecord>> = HashMap::new();
    for r in records {
        by_refdes.entry(r.refdes.as_str()).or_default().push(r);
    }

    let mut out: Vec<GroupedComponent> = by_refdes
        .into_iter()
        .map(|(refdes, recs)| {
            let mut by_net: HashMap<&str, Vec<String>> = HashMap::new();
            for r in &recs {
                let pins = by_net.entry(r.net.as_str()).or_default();
                if !pins.iter().any(|p| p == &r.pin) {
                    pins.push(r.pin.clone());
                }
            }
            let mut connections: Vec<Connection> = by_net
                .into_iter()
                .map(|(net, mut pins)| {
                    pins.sort_by(|a, b| natural_compare(a, b));
                    Connection {
                        net: net.to_string(),
                        pins,
                    }
                })
                .collect();
            connections.sort_by(|a, b| natural_compare(&a.pins[0], &b.pins[0]));

            let first = recs[0];
            GroupedComponent {
                refdes: refdes.to_string(),
                mpn: first.mpn.clone(),
                description: first.description.clone(),
                comment: first.comment.clone(),
                value: first.value.clone(),
                dns: recs.iter().any(|r| r.dns),
                connections,
            }
        })
        .collect();

    out.sort_by(|a, b| natural_compare(&a.refdes, &b.refdes));
    out
}

fn orientation_key(connections: &[Connection]) -> String {
    connections
        .iter()
        .map(|c| format!("{}:{}", c.pins.join(","), c.net))
        .collect::<Vec<_>>()
        .join("|")
}

/// §4.5.4: fold traversal output into per-MPN aggregate records with
/// orientation sub-grouping.
fn aggregate(components: Vec<GroupedComponent>) -> Vec<AggregatedComponent> {
    let mut result = Vec::new();
    let mut aggregatable: HashMap<String, Vec<GroupedComponent>> = HashMap::new();

    for c in components {
        match c.mpn.clone().or_else(|| c.description.clone()) {
            None => {
                result.push(AggregatedComponent {
                    mpn: None,
                    dns: c.dns,
                    refdes: Some(vec![c.refdes.clone()]),
                    connections: Some(c.connections.clone()),
                    orientations: None,
                    notes: Some("no MPN or description available for this component".to_string()),
                });
            }
            Some(key) => {
                let mut nets: Vec<String> = c.connections.iter().map(|conn| conn.net.clone()).collect();
                nets.sort();
                let group_key = format!("{key}\u{1}{}\u{1}{}", nets.join(","), c.dns);
                aggregatable.entry(group_key).or_default().push(c);
            }
        }
    }

    let mut groups: Vec<Vec<GroupedComponent>> = aggregatable.into_values().collect();
    groups.sort_by(|a, b| {
        let ka = a[0].mpn.clone().or_else(|| a[0].description.clone()).unwrap_or_default();
        let kb = b[0].mpn.clone().or_else(|| b[0].description.clone()).unwrap_or_default();
        natural_compare(&ka, &kb)
    });

    for members in groups {
        let mpn_key = members[0].mpn.clone().or_else(|| members[0].description.clone());
        let dns = members[0].dns;

        let mut by_orientation: HashMap<String, Vec<&GroupedComponent>> = HashMap::new();
        for m in &members {
            by_orientation.entry(orientation_key(&m.connections)).or_default().push(m);
        }

        if by_orientation.len() == 1 {
            let mut refdes_list: Vec<String> = members.iter().map(|m| m.refdes.clone()).collect();
            refdes_list.sort_by(|a, b| natural_compare(a, b));
            result.push(AggregatedComponent {
                mpn: mpn_key,
                dns,
                refdes: Some(refdes_list),
                connections: Some(members[0].connections.clone()),
                orientations: None,
                notes: None,
            });
        } else {
            let mut orientations: Vec<Orientation> = by_orientation
                .into_values()
                .map(|members_in_o| {
                    let mut refdes_list: Vec<String> = members_in_o.iter().map(|m| m.refdes.clone()).collect();
                    refdes_list.sort_by(|a, b| natural_compare(a, b));
                    Orientation {
                        connections: members_in_o[0].connections.clone(),
                        count: members_in_o.len(),
                        refdes: refdes_list,
                    }
                })
                .collect();
            orientations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| natural_compare(&a.refdes[0], &b.refdes[0])));
            result.push(AggregatedComponent {
                mpn: mpn_key,
                dns,
                refdes: None,
                connections: None,
                orientations: Some(orientations),
                notes: None,
            });
        }
    }

    let sort_key = |ac: &AggregatedComponent| -> String {
        ac.mpn.clone().unwrap_or_else(|| {
            ac.refdes
                .as_ref()
                .and_then(|r| r.first().cloned())
                .or_else(|| ac.orientations.as_ref().and_then(|o| o.first()).map(|o| o.refdes[0].clone()))
                .unwrap_or_default()
        })
    };
    result.sort_by(|a, b| natural_compare(&sort_key(a), &sort_key(b)));
    result
}

#[derive(Serialize)]
struct CanonConnection {
    pins: Vec<String>,
    net: String,
}

#[derive(Serialize)]
struct CanonComponent {
    refdes: String,
    mpn: Option<String>,
    connections: Vec<CanonConnection>,
}

/// §4.5.5: a deterministic 16-hex-character topology fingerprint, stable
/// across different traversal starting points for the same circuit.
fn compute_circuit_hash(components: &[GroupedComponent]) -> String {
    if components.is_empty() {
        return "0000000000000000".to_string();
    }

    let mut canon: Vec<CanonComponent> = components
        .iter()
        .map(|c| {
            let mut connections: Vec<CanonConnection> = c
                .connections
                .iter()
                .map(|conn| {
                    let mut pins = conn.pins.clone();
                    pins.sort_by(|a, b| natural_compare(a, b));
                    CanonConnection {
                        pins,
                        net: conn.net.clone(),
                    }
                })
                .collect();
            connections.sort_by(|a, b| a.net.cmp(&b.net));
            CanonComponent {
                refdes: c.refdes.clone(),
                mpn: c.mpn.clone(),
                connections,
            }
        })
        .collect();
    canon.sort_by(|a, b| natural_compare(&a.refdes, &b.refdes));

    let json = serde_json::to_string(&canon).expect("canonical circuit form always serializes");
    let digest = Sha256::digest(json.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// `traverseFromNet` (§6): the net-shape query.
pub fn traverse_from_net(model: &UniversalModel, net_name: &str, opts: &TraversalOptions) -> QueryResult<AggregatedResult> {
    if patterns::is_ground_net(net_name) {
        return Err(QueryError::GroundNet(net_name.to_string()));
    }
    if !model.nets.contains_key(net_name) {
        return Err(QueryError::UnknownNet(net_name.to_string()));
    }

    let state = run_traversal(model, net_name, opts);
    let grouped = group_by_refdes(&state.records);
    let circuit_hash = compute_circuit_hash(&grouped);
    let total_components = grouped.len();
    let components_by_mpn = aggregate(grouped);
    let unique_configurations = components_by_mpn.len();

    let mut visited_nets: Vec<String> = state.visited_nets.into_iter().collect();
    visited_nets.sort_by(|a, b| natural_compare(a, b));

    Ok(AggregatedResult {
        starting_point: net_name.to_string(),
        net: None,
        total_components,
        unique_configurations,
        components_by_mpn,
        visited_nets,
        circuit_hash,
        skipped: if state.skipped.is_empty() { None } else { Some(state.skipped) },
    })
}

fn parse_pin_spec(spec: &str) -> QueryResult<(String, String)> {
    let dot = spec
        .find('.')
        .ok_or_else(|| QueryError::InvalidPinSpec(spec.to_string()))?;
    let (refdes, rest) = spec.split_at(dot);
    let pin = &rest[1..];
    if refdes.is_empty() || pin.is_empty() {
        return Err(QueryError::InvalidPinSpec(spec.to_string()));
    }
    Ok((refdes.to_string(), pin.to_string()))
}

fn resolve_refdes<'a>(model: &'a UniversalModel, refdes: &str) -> Option<&'a str> {
    model
        .components
        .keys()
        .find(|k| k.eq_ignore_ascii_case(refdes))
        .map(|k| k.as_str())
}

fn resolve_pin<'a>(component: &'a Component, pin: &str) -> Option<&'a str> {
    component
        .pins
        .keys()
        .find(|k| k.eq_ignore_ascii_case(pin))
        .map(|k| k.as_str())
}

/// `traverseFromPin` (§6, §4.5.6): resolve `REFDES.PIN` then fall through to
/// the net-shape traversal, unless the pin is NC or grounded.
pub fn traverse_from_pin(model: &UniversalModel, pin_spec: &str, opts: &TraversalOptions) -> QueryResult<AggregatedResult> {
    let (refdes_raw, pin_raw) = parse_pin_spec(pin_spec)?;
    let refdes = resolve_refdes(model, &refdes_raw)
        .ok_or_else(|| QueryError::UnknownComponent(refdes_raw.clone()))?
        .to_string();
    let component = &model.components[&refdes];
    let pin = resolve_pin(component, &pin_raw)
        .ok_or_else(|| QueryError::UnknownPin {
            refdes: refdes.clone(),
            pin: pin_raw.clone(),
        })?
        .to_string();
    let entry = &component.pins[&pin];
    let net = entry.net();

    if patterns::is_ground_net(net) {
        return Err(QueryError::GroundNet(net.to_string()));
    }
    if net == NC {
        return Ok(AggregatedResult {
            starting_point: pin_spec.to_string(),
            net: Some(NC.to_string()),
            total_components: 0,
            unique_configurations: 0,
            components_by_mpn: vec![],
            visited_nets: vec![],
            circuit_hash: format!("nc-{refdes}.{pin}"),
            skipped: None,
        });
    }

    let net = net.to_string();
    let mut result = traverse_from_net(model, &net, opts)?;
    result.starting_point = pin_spec.to_string();
    result.net = Some(net);
    Ok(result)
}
