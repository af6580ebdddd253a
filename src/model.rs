//! The universal netlist model (§3): the common output of both decoders and
//! the sole input to the traversal engine.
//!
//! Two inversely-indexed views of the same connectivity relation are kept in
//! sync by [`UniversalModel::connect`] so that both directions are O(1):
//! a net index `nets: netName -> refdes -> [pin]` and a component index
//! `components: refdes -> Component { pins: pin -> PinEntry }`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::patterns;

/// Sentinel net name for an unconnected pin.
pub const NC: &str = "NC";

/// One pin's connectivity, as recorded on a [`Component`].
///
/// A bare net name is used when the pin's logical name carries no extra
/// information (it equals the pin identifier, or was never given one); the
/// named form is used when the logical name differs from the identifier,
/// e.g. `VIN` on pin `1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinEntry {
    Bare(String),
    Named { name: String, net: String },
}

impl PinEntry {
    pub fn net(&self) -> &str {
        match self {
            PinEntry::Bare(net) => net,
            PinEntry::Named { net, .. } => net,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            PinEntry::Bare(_) => None,
            PinEntry::Named { name, .. } => Some(name),
        }
    }

    /// Rebuild this entry with a different net, preserving any logical name.
    pub fn retargeted(&self, net: impl Into<String>) -> PinEntry {
        match self {
            PinEntry::Bare(_) => PinEntry::Bare(net.into()),
            PinEntry::Named { name, .. } => PinEntry::Named {
                name: name.clone(),
                net: net.into(),
            },
        }
    }

    /// Build a named entry unless `name` and `pin_id` are the same string,
    /// in which case a bare entry is used (§3: "the pin's logical name
    /// equals its identifier").
    pub fn new(pin_id: &str, name: Option<&str>, net: impl Into<String>) -> PinEntry {
        let net = net.into();
        match name {
            Some(name) if name != pin_id && !name.trim().is_empty() => PinEntry::Named {
                name: name.to_string(),
                net,
            },
            _ => PinEntry::Bare(net),
        }
    }
}

/// A single component's record in the universal model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub pins: BTreeMap<String, PinEntry>,
}

impl Component {
    pub fn new() -> Self {
        Self::default()
    }

    /// `mpn` is either a non-empty trimmed string or absent; whitespace-only
    /// values are normalized to absent (§3).
    pub fn set_mpn(&mut self, mpn: Option<String>) {
        self.mpn = normalize_optional(mpn);
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = normalize_optional(comment);
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = normalize_optional(description);
    }

    pub fn set_value(&mut self, value: Option<String>) {
        self.value = normalize_optional(value);
    }
}

fn normalize_optional(s: Option<String>) -> Option<String> {
    s.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// `netName -> refdes -> [pin]`.
pub type NetIndex = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// `refdes -> Component`.
pub type ComponentIndex = BTreeMap<String, Component>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniversalModel {
    pub nets: NetIndex,
    pub components: ComponentIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    Asymmetric {
        net: String,
        refdes: String,
        pin: String,
        reason: String,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Asymmetric {
                net,
                refdes,
                pin,
                reason,
            } => write!(
                f,
                "model invariant violated at net {net:?} / {refdes}.{pin}: {reason}"
            ),
        }
    }
}

impl std::error::Error for ModelError {}

impl UniversalModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `refdes` pin `pin` (optionally named `pin_name`) is
    /// connected to `net`, updating both indexes so the symmetry invariant
    /// (§3) holds immediately. An empty net name is normalized to `NC`.
    pub fn connect(&mut self, net: &str, refdes: &str, pin: &str, pin_name: Option<&str>) {
        let net = if net.trim().is_empty() { NC } else { net };

        let pins_for_refdes = self
            .nets
            .entry(net.to_string())
            .or_default()
            .entry(refdes.to_string())
            .or_default();
        if !pins_for_refdes.iter().any(|p| p == pin) {
            pins_for_refdes.push(pin.to_string());
        }

        let component = self
            .components
            .entry(refdes.to_string())
            .or_insert_with(Component::new);
        let updated = match component.pins.get(pin) {
            Some(existing) => existing.retargeted(net),
            None => PinEntry::new(pin, pin_name, net),
        };
        component.pins.insert(pin.to_string(), updated);
    }

    /// Ensure a component entry exists even before any pin connection is known.
    pub fn ensure_component(&mut self, refdes: &str) -> &mut Component {
        self.components
            .entry(refdes.to_string())
            .or_insert_with(Component::new)
    }

    /// Check the bidirectional symmetry invariant (§3, §8 "Model symmetry").
    pub fn check_invariants(&self) -> Result<(), ModelError> {
        for (net, refdes_map) in &self.nets {
            for (refdes, pins) in refdes_map {
                for pin in pins {
                    let entry = self
                        .components
                        .get(refdes)
                        .and_then(|c| c.pins.get(pin));
                    match entry {
                        Some(entry) if entry.net() == net => {}
                        Some(entry) => {
                            return Err(ModelError::Asymmetric {
                                net: net.clone(),
                                refdes: refdes.clone(),
                                pin: pin.clone(),
                                reason: format!(
                                    "component pin records net {:?} but N lists {net:?}",
                                    entry.net()
                                ),
                            })
                        }
                        None => {
                            return Err(ModelError::Asymmetric {
                                net: net.clone(),
                                refdes: refdes.clone(),
                                pin: pin.clone(),
                                reason: "no matching component pin entry".to_string(),
                            })
                        }
                    }
                }
            }
        }

        for (refdes, component) in &self.components {
            for (pin, entry) in &component.pins {
                let net = entry.net();
                if net == NC {
                    continue;
                }
                let present = self
                    .nets
                    .get(net)
                    .map(|m| m.get(refdes).map(|ps| ps.iter().any(|p| p == pin)).unwrap_or(false))
                    .unwrap_or(false);
                if !present {
                    return Err(ModelError::Asymmetric {
                        net: net.to_string(),
                        refdes: refdes.clone(),
                        pin: pin.clone(),
                        reason: "component pin not reflected in N".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// `^[A-Z][A-Z0-9_]*$`, case-insensitive (§3).
pub fn is_valid_refdes(s: &str) -> bool {
    patterns::is_valid_refdes(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_keeps_both_indexes_in_sync() {
        let mut model = UniversalModel::new();
        model.connect("SIG_A", "R1", "1", None);
        model.connect("SIG_A", "R1", "1", None); // idempotent
        model.connect("SIG_A", "U1", "7", Some("VIN"));

        assert_eq!(model.nets["SIG_A"]["R1"], vec!["1".to_string()]);
        assert_eq!(model.nets["SIG_A"]["U1"], vec!["7".to_string()]);
        assert_eq!(model.components["R1"].pins["1"].net(), "SIG_A");
        assert_eq!(
            model.components["U1"].pins["7"],
            PinEntry::Named {
                name: "VIN".to_string(),
                net: "SIG_A".to_string()
            }
        );
        model.check_invariants().unwrap();
    }

    #[test]
    fn empty_net_name_normalizes_to_nc() {
        let mut model = UniversalModel::new();
        model.connect("", "U1", "7", None);
        assert_eq!(model.components["U1"].pins["7"].net(), NC);
        assert_eq!(model.nets[NC]["U1"], vec!["7".to_string()]);
    }

    #[test]
    fn retargeting_preserves_pin_name() {
        let mut model = UniversalModel::new();
        model.connect("OLD", "U1", "7", Some("VIN"));
        model.connect("NEW", "U1", "7", None); // same pin, reconnected
        assert_eq!(
            model.components["U1"].pins["7"],
            PinEntry::Named {
                name: "VIN".to_string(),
                net: "NEW".to_string()
            }
        );
    }

    #[test]
    fn mpn_whitespace_only_is_absent() {
        let mut component = Component::new();
        component.set_mpn(Some("   ".to_string()));
        assert_eq!(component.mpn, None);
        component.set_mpn(Some(" 10k ".to_string()));
        assert_eq!(component.mpn.as_deref(), Some("10k"));
    }

    #[test]
    fn invariants_catch_asymmetry() {
        let mut model = UniversalModel::new();
        model.connect("SIG_A", "R1", "1", None);
        model
            .components
            .get_mut("R1")
            .unwrap()
            .pins
            .insert("1".to_string(), PinEntry::Bare("SIG_B".to_string()));
        assert!(model.check_invariants().is_err());
    }

    #[test]
    fn valid_refdes_rejects_instance_paths() {
        assert!(is_valid_refdes("R1"));
        assert!(!is_valid_refdes("sheet1@R1"));
        assert!(!is_valid_refdes("a.b:c"));
    }
}
