//! Factory index: the catalog the planner enumerates over.
//!
//! The index is built once from the policy's catalog and is immutable
//! afterwards; it is rebuilt only on explicit request. Only factories
//! exposing exactly one sink template and one src template are indexed —
//! anything else is silently skipped, since the chain model is strictly
//! single-input/single-output.

use crate::caps::Caps;
use crate::element::{ElementFactory, PadDirection, PadTemplate};
use std::fmt;
use std::sync::Arc;

/// Bitmask over the element classes the chain-ordering validator knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KlassMask(u32);

impl KlassMask {
    /// Converter class (`Converter` token).
    pub const CONVERTER: KlassMask = KlassMask(1 << 0);
    /// Decoder class (`Decoder` token).
    pub const DECODER: KlassMask = KlassMask(1 << 1);
    /// Encoder class (`Encoder` token).
    pub const ENCODER: KlassMask = KlassMask(1 << 2);
    /// Parser class (`Parser` token).
    pub const PARSER: KlassMask = KlassMask(1 << 3);

    /// Stage order along a chain, from the sink end to the src end:
    /// parse, decode, convert, encode.
    pub const STAGES: [KlassMask; 4] = [
        KlassMask::PARSER,
        KlassMask::DECODER,
        KlassMask::CONVERTER,
        KlassMask::ENCODER,
    ];

    const TOKENS: [(&'static str, KlassMask); 4] = [
        ("Converter", KlassMask::CONVERTER),
        ("Decoder", KlassMask::DECODER),
        ("Encoder", KlassMask::ENCODER),
        ("Parser", KlassMask::PARSER),
    ];

    /// Derive the mask from a factory classification string by substring
    /// matching the known tokens.
    pub fn from_classification(classification: &str) -> Self {
        let mut mask = KlassMask::default();
        for (token, bit) in Self::TOKENS {
            if classification.contains(token) {
                mask.0 |= bit.0;
            }
        }
        mask
    }

    /// Whether any of `other`'s bits are set in this mask.
    pub fn contains(self, other: KlassMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no class token matched.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The first stage of [`KlassMask::STAGES`] whose bit is set.
    ///
    /// Unclassified factories have no stage and are exempt from the
    /// ordering validator.
    pub fn stage(self) -> Option<usize> {
        Self::STAGES.iter().position(|stage| self.contains(*stage))
    }
}

/// One indexed factory with its resolved template caps.
pub struct FactoryEntry {
    factory: Arc<dyn ElementFactory>,
    sink_template: PadTemplate,
    src_template: PadTemplate,
    klass: KlassMask,
}

impl FactoryEntry {
    /// The factory itself.
    pub fn factory(&self) -> &Arc<dyn ElementFactory> {
        &self.factory
    }

    /// The factory name (shorthand).
    pub fn name(&self) -> &str {
        self.factory.name()
    }

    /// The single sink template.
    pub fn sink_template(&self) -> &PadTemplate {
        &self.sink_template
    }

    /// The single src template.
    pub fn src_template(&self) -> &PadTemplate {
        &self.src_template
    }

    /// Template caps on the sink side.
    pub fn sink_caps(&self) -> &Caps {
        self.sink_template.caps()
    }

    /// Template caps on the src side.
    pub fn src_caps(&self) -> &Caps {
        self.src_template.caps()
    }

    /// The class bitmask derived from the factory classification.
    pub fn klass(&self) -> KlassMask {
        self.klass
    }
}

impl fmt::Debug for FactoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryEntry")
            .field("name", &self.name())
            .field("klass", &self.klass)
            .finish_non_exhaustive()
    }
}

/// Find the single sink and single src template of a factory.
///
/// Returns `None` when the factory exposes no template, more than one
/// template per direction, or lacks either direction.
fn find_pad_templates(factory: &dyn ElementFactory) -> Option<(PadTemplate, PadTemplate)> {
    let mut sink = None;
    let mut src = None;

    for template in factory.pad_templates() {
        let slot = match template.direction() {
            PadDirection::Sink => &mut sink,
            PadDirection::Src => &mut src,
        };
        if slot.is_some() {
            return None;
        }
        *slot = Some(template.clone());
    }

    Some((sink?, src?))
}

/// Catalog of indexed factories plus the precomputed caps unions.
#[derive(Default)]
pub struct FactoryIndex {
    entries: Vec<FactoryEntry>,
    all_sink_caps: Caps,
    all_src_caps: Caps,
}

impl FactoryIndex {
    /// Build the index from a catalog.
    ///
    /// Entry order follows catalog order, which makes chain enumeration
    /// deterministic for a given catalog.
    pub fn build(catalog: &[Arc<dyn ElementFactory>]) -> Self {
        let mut index = FactoryIndex::default();

        for factory in catalog {
            let Some((sink_template, src_template)) = find_pad_templates(factory.as_ref()) else {
                tracing::debug!(factory = factory.name(), "skipping factory: not single-sink/single-src");
                continue;
            };

            index.all_sink_caps.merge(sink_template.caps());
            index.all_src_caps.merge(src_template.caps());

            index.entries.push(FactoryEntry {
                klass: KlassMask::from_classification(factory.classification()),
                factory: Arc::clone(factory),
                sink_template,
                src_template,
            });
        }

        tracing::debug!(entries = index.entries.len(), "factory index built");
        index
    }

    /// The indexed entries, in catalog order.
    pub fn entries(&self) -> &[FactoryEntry] {
        &self.entries
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of every entry's sink-template caps.
    pub fn all_sink_caps(&self) -> &Caps {
        &self.all_sink_caps
    }

    /// Union of every entry's src-template caps.
    pub fn all_src_caps(&self) -> &Caps {
        &self.all_src_caps
    }
}

impl fmt::Debug for FactoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryIndex")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapsStructure;
    use crate::element::TransformFactory;

    fn caps(format: &str) -> Caps {
        Caps::from(CapsStructure::new("video/raw").with_field("format", format))
    }

    fn catalog() -> Vec<Arc<dyn ElementFactory>> {
        vec![
            Arc::new(TransformFactory::new(
                "rgb2yuv",
                "Converter/Video",
                caps("rgb"),
                caps("yuv"),
            )),
            Arc::new(TransformFactory::new(
                "yuv2rgb",
                "Converter/Video",
                caps("yuv"),
                caps("rgb"),
            )),
        ]
    }

    #[test]
    fn test_klass_mask_from_classification() {
        let mask = KlassMask::from_classification("Codec/Decoder/Video");
        assert!(mask.contains(KlassMask::DECODER));
        assert!(!mask.contains(KlassMask::ENCODER));
        assert_eq!(mask.stage(), Some(1));

        assert!(KlassMask::from_classification("Filter/Effect").is_empty());
        assert_eq!(KlassMask::from_classification("Filter/Effect").stage(), None);
    }

    #[test]
    fn test_klass_stage_prefers_earliest() {
        // A factory classified as both parser and decoder sorts as parser.
        let mask = KlassMask::from_classification("Parser/Decoder");
        assert_eq!(mask.stage(), Some(0));
    }

    #[test]
    fn test_index_builds_unions() {
        let index = FactoryIndex::build(&catalog());
        assert_eq!(index.len(), 2);
        assert!(index.all_sink_caps().intersects(&caps("rgb")));
        assert!(index.all_sink_caps().intersects(&caps("yuv")));
        assert!(index.all_src_caps().intersects(&caps("rgb")));
    }

    #[test]
    fn test_index_skips_malformed_factories() {
        use crate::element::PadTemplate;

        let mut factories = catalog();
        // Src-only factory: must be skipped.
        factories.push(Arc::new(TransformFactory::with_templates(
            "srconly",
            "Source",
            vec![PadTemplate::src(caps("rgb"))],
        )));
        // Two sink templates: must be skipped.
        factories.push(Arc::new(TransformFactory::with_templates(
            "twosinks",
            "Muxer",
            vec![
                PadTemplate::sink(caps("rgb")),
                PadTemplate::sink(caps("yuv")),
                PadTemplate::src(caps("rgb")),
            ],
        )));

        let index = FactoryIndex::build(&factories);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_index_is_idempotent() {
        let factories = catalog();
        let first = FactoryIndex::build(&factories);
        let second = FactoryIndex::build(&factories);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.entries().iter().zip(second.entries()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.klass(), b.klass());
            assert_eq!(a.sink_caps(), b.sink_caps());
            assert_eq!(a.src_caps(), b.src_caps());
        }
        assert_eq!(first.all_sink_caps(), second.all_sink_caps());
        assert_eq!(first.all_src_caps(), second.all_src_caps());
    }
}
