//! # hwt-core
//!
//! Universal netlist model, Altium/Cadence schematic decoders, and the XNET
//! traversal engine.
//!
//! Three components feed a single [`model::UniversalModel`]:
//!
//! - [`cfb`] + [`record_stream`] + [`altium`] decode an Altium `.SchDoc`
//!   compound-file schematic into the model.
//! - [`cadence`] decodes a Cadence `pstxnet.dat`/`pstxprt.dat`/`pstchip.dat`
//!   triple into the same model shape.
//! - [`traversal`] explores the model breadth-first from a net or pin,
//!   aggregating the reachable components and fingerprinting the result.
//!
//! [`error::DesignError`] aggregates every subsystem's error type at the
//! crate boundary; [`import_path`] is the single entry point that picks a
//! decoder by file extension.

use std::path::Path;

pub mod altium;
pub mod cadence;
pub mod cfb;
pub mod error;
pub mod model;
pub mod patterns;
pub mod record_stream;
pub mod traversal;

pub use error::{DesignError, DesignResult, ErrorResponse};
pub use model::UniversalModel;
pub use traversal::{traverse_from_net, traverse_from_pin, AggregatedResult, QueryError, TraversalOptions};

/// Where a design's source bytes live on disk (§6 "Input file handles").
///
/// Discovery of a Cadence triple from a `.dsn`/`.cpm` file, or of a
/// `.SchDoc` from a `.PrjPcb` project's `DocumentPath=` lines, is out of
/// scope; callers resolve those paths themselves and construct this
/// directly.
pub enum DesignSource<'a> {
    AltiumSchDoc(&'a Path),
    CadenceTriple {
        pstxnet: &'a Path,
        pstxprt: &'a Path,
        pstchip: &'a Path,
    },
}

/// Decode a design from an explicitly identified source.
pub fn import_design(source: DesignSource) -> DesignResult<UniversalModel> {
    match source {
        DesignSource::AltiumSchDoc(path) => Ok(altium::import_schdoc(path)?),
        DesignSource::CadenceTriple {
            pstxnet,
            pstxprt,
            pstchip,
        } => Ok(cadence::import(pstxnet, pstxprt, pstchip)?),
    }
}

/// Decode a design by dispatching on `path`'s extension, for the single-file
/// Altium entry point. Cadence designs need the full triple and must go
/// through [`import_design`] with [`DesignSource::CadenceTriple`] instead.
pub fn import_path(path: &Path) -> DesignResult<UniversalModel> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("schdoc") => Ok(altium::import_schdoc(path)?),
        Some(ext) => Err(DesignError::UnsupportedFormat(format!(
            ".{ext} (supported: .SchDoc, or a Cadence pstxnet.dat/pstxprt.dat/pstchip.dat triple via import_design)"
        ))),
        None => Err(DesignError::UnsupportedFormat(
            "no file extension (supported: .SchDoc, or a Cadence pstxnet.dat/pstxprt.dat/pstchip.dat triple via import_design)"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_is_descriptive() {
        let err = import_path(Path::new("/tmp/board.brd")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(".brd"));
        assert!(msg.contains("SchDoc"));
    }

    #[test]
    fn missing_extension_is_descriptive() {
        let err = import_path(Path::new("/tmp/board")).unwrap_err();
        assert!(err.to_string().contains("no file extension"));
    }
}
