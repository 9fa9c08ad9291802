//! The standard caps-converting element and its factory.

use super::{Element, ElementFactory, PadTemplate};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::Result;

/// A factory for [`CapsTransform`] elements.
///
/// This is the concrete factory shape the routing core expects in its
/// catalog: one sink template, one src template and a classification
/// string. Elements accept anything matching the sink template and
/// produce whatever subset of the src template the downstream peer takes.
///
/// # Example
///
/// ```rust
/// use autoroute::caps::{Caps, CapsStructure};
/// use autoroute::element::{ElementFactory, TransformFactory};
///
/// let rgb = Caps::from(CapsStructure::new("video/raw").with_field("format", "rgb"));
/// let yuv = Caps::from(CapsStructure::new("video/raw").with_field("format", "yuv"));
/// let factory = TransformFactory::new("rgb2yuv", "Converter/Video", rgb, yuv);
/// assert_eq!(factory.pad_templates().len(), 2);
/// ```
pub struct TransformFactory {
    name: String,
    classification: String,
    templates: Vec<PadTemplate>,
}

impl TransformFactory {
    /// Create a factory with one sink and one src template.
    pub fn new(
        name: impl Into<String>,
        classification: impl Into<String>,
        sink_caps: Caps,
        src_caps: Caps,
    ) -> Self {
        Self {
            name: name.into(),
            classification: classification.into(),
            templates: vec![PadTemplate::sink(sink_caps), PadTemplate::src(src_caps)],
        }
    }

    /// Create a factory with explicit pad templates.
    ///
    /// Useful for tests exercising the indexer's single-sink/single-src
    /// filtering: factories built this way may expose any template shape.
    pub fn with_templates(
        name: impl Into<String>,
        classification: impl Into<String>,
        templates: Vec<PadTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            classification: classification.into(),
            templates,
        }
    }
}

impl ElementFactory for TransformFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn classification(&self) -> &str {
        &self.classification
    }

    fn pad_templates(&self) -> &[PadTemplate] {
        &self.templates
    }

    fn create(&self) -> Box<dyn Element> {
        let sink = self
            .templates
            .iter()
            .find(|t| t.direction() == super::PadDirection::Sink)
            .map(|t| t.caps().clone())
            .unwrap_or_default();
        let src = self
            .templates
            .iter()
            .find(|t| t.direction() == super::PadDirection::Src)
            .map(|t| t.caps().clone())
            .unwrap_or_default();
        Box::new(CapsTransform::new(self.name.clone(), sink, src))
    }
}

/// A generic converter element.
///
/// Negotiation model: the sink side accepts the sink template whenever
/// the src template intersects what downstream accepts; a successful
/// negotiation fixates `upstream ∩ sink_template` on the sink side and
/// the preferred structure of `src_template ∩ downstream` on the src
/// side. Buffers pass through payload-unchanged — the conversion itself
/// belongs to the host's real elements, not to the planner.
pub struct CapsTransform {
    factory_name: String,
    sink_template: Caps,
    src_template: Caps,
    sink_caps: Option<Caps>,
    src_caps: Option<Caps>,
}

impl CapsTransform {
    /// Create an unnegotiated element.
    pub fn new(factory_name: impl Into<String>, sink_template: Caps, src_template: Caps) -> Self {
        Self {
            factory_name: factory_name.into(),
            sink_template,
            src_template,
            sink_caps: None,
            src_caps: None,
        }
    }
}

impl Element for CapsTransform {
    fn factory_name(&self) -> &str {
        &self.factory_name
    }

    fn query_sink_caps(&self, downstream: &Caps) -> Caps {
        if self.src_template.intersects(downstream) {
            self.sink_template.clone()
        } else {
            Caps::new_empty()
        }
    }

    fn negotiate(&mut self, upstream: &Caps, downstream: &Caps) -> bool {
        let sink = upstream.intersect(&self.sink_template).normalize();
        let src = self.src_template.intersect(downstream).normalize();

        let (Some(sink), Some(src)) = (sink.fixate(), src.fixate()) else {
            self.sink_caps = None;
            self.src_caps = None;
            return false;
        };

        self.sink_caps = Some(sink);
        self.src_caps = Some(src);
        true
    }

    fn sink_caps(&self) -> Option<&Caps> {
        self.sink_caps.as_ref()
    }

    fn src_caps(&self) -> Option<&Caps> {
        self.src_caps.as_ref()
    }

    fn reset(&mut self) {
        self.sink_caps = None;
        self.src_caps = None;
    }

    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
        Ok(Some(buffer))
    }
}
