//! Precompiled classification predicates shared by the net/component model,
//! both decoders, and the traversal engine.
//!
//! Every regex here is built once, lazily, the first time it's needed and
//! reused for the life of the process (§9 "Regex at hot paths").

use once_cell::sync::Lazy;
use regex::Regex;

static GROUND_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(GND|VSS|AGND|DGND|PGND|SGND|CGND)$").unwrap()
});

static POWER_NET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^(
            VCC \w* |
            VDD \w* |
            VIN \w* |
            VOUT \w* |
            VBAT \w* |
            VBUS \w* |
            VSYS \w* |
            PP \w* |
            PN \w* |
            LD_PP \w* |
            LD_PN \w* |
            PWR_\w* |
            RAIL_\w* |
            \d+V\d+ |
            [+-][A-Z0-9._]+V\w*
        )$
        ",
    )
    .unwrap()
});

static SIGN_PREFIXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-].+$").unwrap());

static DNS_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(DNS|DNP|DNF|DNI)\b|DO NOT STUFF|DO NOT POPULATE|DO NOT INSTALL|NOT POPULATED|NO POP",
    )
    .unwrap()
});

static VALID_REFDES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[A-Z][A-Z0-9_]*$").unwrap());

/// `^(GND|VSS|AGND|DGND|PGND|SGND|CGND)$`, case-insensitive.
pub fn is_ground_net(name: &str) -> bool {
    GROUND_NET.is_match(name)
}

/// Voltage-rail naming conventions, plus any name that begins with `+`/`-`
/// followed by at least one more character.
pub fn is_power_net(name: &str) -> bool {
    POWER_NET.is_match(name) || SIGN_PREFIXED.is_match(name)
}

/// Union of [`is_ground_net`] and [`is_power_net`]; traversal visits these
/// nets but never continues through them.
pub fn is_stop_net(name: &str) -> bool {
    is_ground_net(name) || is_power_net(name)
}

/// A passive refdes (uppercased) begins with `R`, `RS`, `FR`, `L`, `C`, or `FB`.
pub fn is_passive(refdes: &str) -> bool {
    let upper = refdes.to_ascii_uppercase();
    const PREFIXES: [&str; 6] = ["RS", "FR", "FB", "R", "L", "C"];
    PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Matches a do-not-stuff marker anywhere in the combined mpn/description/comment text.
pub fn is_dns(haystack: &str) -> bool {
    DNS_MARKER.is_match(haystack)
}

/// `^[A-Z][A-Z0-9_]*$`, case-insensitive; rejects instance-path-looking strings.
pub fn is_valid_refdes(s: &str) -> bool {
    VALID_REFDES.is_match(s)
}
