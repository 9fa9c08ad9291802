//! Chain validators: predicates that prune enumeration.
//!
//! A validator inspects a candidate chain together with the route's sink
//! and src caps and either accepts it (`None`) or names the deepest chain
//! position that must change before the candidate family can become
//! viable (`Some(depth)`). The generator keeps every position before that
//! depth, resets every position after it, and advances the named position
//! — skipping the whole sub-tree of permutations that would fail the same
//! way.
//!
//! Chains are ordered from the src end: position 0 is adjacent to the
//! downstream (src) caps, the last position is adjacent to the upstream
//! (sink) caps, matching the enumerator's odometer layout.

use super::index::FactoryEntry;
use crate::caps::Caps;

/// Validate that adjacent caps along the chain can connect.
///
/// Boundaries are checked from the src end towards the sink end; the
/// first boundary whose producer and consumer caps do not intersect
/// yields the backtrack depth.
pub fn validate_chain_caps(
    sink_caps: &Caps,
    src_caps: &Caps,
    chain: &[&FactoryEntry],
) -> Option<usize> {
    let len = chain.len();
    if len == 0 {
        return None;
    }

    for boundary in 0..=len {
        let producer = if boundary == len {
            sink_caps
        } else {
            chain[boundary].src_caps()
        };
        let consumer = if boundary == 0 {
            src_caps
        } else {
            chain[boundary - 1].sink_caps()
        };

        if !producer.intersects(consumer) {
            return Some(boundary.min(len - 1));
        }
    }

    None
}

/// Forbid the same factory twice in a row.
///
/// Two consecutive instances of one factory never improve a chain: the
/// second either undoes or repeats the first.
pub fn validate_no_consecutive(
    _sink_caps: &Caps,
    _src_caps: &Caps,
    chain: &[&FactoryEntry],
) -> Option<usize> {
    for depth in 0..chain.len().saturating_sub(1) {
        if std::ptr::eq(chain[depth], chain[depth + 1]) {
            return Some(depth + 1);
        }
    }
    None
}

/// Enforce the parse → decode → convert → encode stage ordering.
///
/// Each entry maps to the first stage of [`KlassMask::STAGES`] whose bit
/// is set; walking from the src end upstream, stages must not increase.
/// Unclassified entries carry no stage and are exempt.
///
/// [`KlassMask::STAGES`]: super::index::KlassMask::STAGES
pub fn validate_klass_order(
    _sink_caps: &Caps,
    _src_caps: &Caps,
    chain: &[&FactoryEntry],
) -> Option<usize> {
    let mut downstream_stage: Option<usize> = None;

    for (depth, entry) in chain.iter().enumerate() {
        let Some(stage) = entry.klass().stage() else {
            continue;
        };
        if let Some(limit) = downstream_stage {
            if stage > limit {
                return Some(depth);
            }
        }
        downstream_stage = Some(stage);
    }

    None
}

/// The default validator composition: caps connectivity, duplicate
/// suppression, stage ordering. The first failure wins.
pub fn default_validate(
    sink_caps: &Caps,
    src_caps: &Caps,
    chain: &[&FactoryEntry],
) -> Option<usize> {
    validate_chain_caps(sink_caps, src_caps, chain)
        .or_else(|| validate_no_consecutive(sink_caps, src_caps, chain))
        .or_else(|| validate_klass_order(sink_caps, src_caps, chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapsStructure;
    use crate::element::{ElementFactory, TransformFactory};
    use crate::routing::index::FactoryIndex;
    use std::sync::Arc;

    fn caps(format: &str) -> Caps {
        Caps::from(CapsStructure::new("video/raw").with_field("format", format))
    }

    fn index_of(specs: &[(&str, &str, &str, &str)]) -> FactoryIndex {
        let catalog: Vec<Arc<dyn ElementFactory>> = specs
            .iter()
            .map(|(name, klass, sink, src)| {
                Arc::new(TransformFactory::new(*name, *klass, caps(sink), caps(src)))
                    as Arc<dyn ElementFactory>
            })
            .collect();
        FactoryIndex::build(&catalog)
    }

    #[test]
    fn test_caps_connectivity_accepts_linked_chain() {
        let index = index_of(&[
            ("rgb2yuv", "Converter", "rgb", "yuv"),
            ("yuv2h264", "Encoder", "yuv", "h264"),
        ]);
        // Src-first order: the encoder sits at position 0.
        let chain = [&index.entries()[1], &index.entries()[0]];
        assert_eq!(
            validate_chain_caps(&caps("rgb"), &caps("h264"), &chain),
            None
        );
    }

    #[test]
    fn test_caps_connectivity_reports_first_break_from_src_end() {
        let index = index_of(&[
            ("rgb2yuv", "Converter", "rgb", "yuv"),
            ("yuv2h264", "Encoder", "yuv", "h264"),
        ]);
        // Encoder output vs a route demanding rgb: boundary 0 fails.
        let chain = [&index.entries()[1], &index.entries()[0]];
        assert_eq!(
            validate_chain_caps(&caps("rgb"), &caps("rgb"), &chain),
            Some(0)
        );
        // Chain head demands yuv but the route offers h264: boundary 2,
        // clamped to the last position.
        let chain = [&index.entries()[1], &index.entries()[0]];
        assert_eq!(
            validate_chain_caps(&caps("h264"), &caps("h264"), &chain),
            Some(1)
        );
    }

    #[test]
    fn test_no_consecutive_duplicates() {
        let index = index_of(&[("rgb2yuv", "Converter", "rgb", "yuv")]);
        let entry = &index.entries()[0];
        let chain = [entry, entry];
        assert_eq!(
            validate_no_consecutive(&caps("rgb"), &caps("yuv"), &chain),
            Some(1)
        );

        let other = index_of(&[("yuv2rgb", "Converter", "yuv", "rgb")]);
        let mixed = [entry, &other.entries()[0]];
        assert_eq!(
            validate_no_consecutive(&caps("rgb"), &caps("yuv"), &mixed),
            None
        );
    }

    #[test]
    fn test_klass_order_rejects_encoder_before_decoder() {
        let index = index_of(&[
            ("enc", "Codec/Encoder", "yuv", "h264"),
            ("dec", "Codec/Decoder", "h264", "yuv"),
        ]);
        // Upstream-first [enc, dec] is src-first [dec, enc]: the encoder
        // (stage 3) sits upstream of the decoder (stage 1).
        let chain = [&index.entries()[1], &index.entries()[0]];
        assert_eq!(
            validate_klass_order(&caps("yuv"), &caps("yuv"), &chain),
            Some(1)
        );

        // The legal direction decodes first.
        let chain = [&index.entries()[0], &index.entries()[1]];
        assert_eq!(
            validate_klass_order(&caps("h264"), &caps("h264"), &chain),
            None
        );
    }

    #[test]
    fn test_klass_order_exempts_unclassified() {
        let index = index_of(&[
            ("enc", "Codec/Encoder", "yuv", "h264"),
            ("fx", "Filter/Effect", "yuv", "yuv"),
        ]);
        // Unclassified filter downstream of an encoder is fine.
        let chain = [&index.entries()[1], &index.entries()[0]];
        assert_eq!(
            validate_klass_order(&caps("yuv"), &caps("yuv"), &chain),
            None
        );
    }
}
