//! Drain, rebuild and swap-over behavior.

use autoroute::bin::AutoRouteBin;
use autoroute::buffer::Buffer;
use autoroute::caps::{Caps, CapsStructure};
use autoroute::element::{ElementFactory, TransformFactory};
use autoroute::event::Event;
use autoroute::policy::Policy;
use std::sync::Arc;

fn caps(format: &str) -> Caps {
    Caps::from(CapsStructure::new("video/raw").with_field("format", format))
}

fn converter_bin() -> AutoRouteBin {
    let policy = Policy::with_factories(|| {
        vec![Arc::new(TransformFactory::new(
            "rgb2yuv",
            "Converter",
            Caps::from(CapsStructure::new("video/raw").with_field("format", "rgb")),
            Caps::from(CapsStructure::new("video/raw").with_field("format", "yuv")),
        )) as Arc<dyn ElementFactory>]
    });
    AutoRouteBin::new(policy).unwrap()
}

/// A latched needs-reconfigure flag makes the next buffer drain and
/// rebuild; the flag is clear afterwards and the buffer still flows.
#[test]
fn test_reconfigure_latch_triggers_rebuild() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    assert_eq!(bin.plan_generation(), 1);

    bin.set_output_needs_reconfigure(output).unwrap();
    assert!(bin.output_needs_reconfigure(output).unwrap());

    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    assert_eq!(bin.plan_generation(), 2);
    assert!(!bin.output_needs_reconfigure(output).unwrap());
    // The triggering buffer was dispatched into the new graph.
    assert_eq!(bin.take_output_buffers(output).unwrap().len(), 1);
}

/// Reconfiguration requests coalesce: two latched outputs cause one
/// rebuild, not two.
#[test]
fn test_reconfigure_requests_coalesce() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let out_a = bin.add_output("out_a", caps("yuv"));
    let out_b = bin.add_output("out_b", caps("rgb"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    assert_eq!(bin.plan_generation(), 1);

    bin.set_output_needs_reconfigure(out_a).unwrap();
    bin.set_output_needs_reconfigure(out_b).unwrap();
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    assert_eq!(bin.plan_generation(), 2);
    assert!(!bin.output_needs_reconfigure(out_a).unwrap());
    assert!(!bin.output_needs_reconfigure(out_b).unwrap());
}

/// A replan over an unchanged configuration produces a structurally
/// identical graph.
#[test]
fn test_replan_is_structurally_stable() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    let before = bin.graph_topology();

    bin.set_output_needs_reconfigure(output).unwrap();
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    assert_eq!(bin.graph_topology(), before);
}

/// The drain marker is consumed by the bin: downstream consumers never
/// see the end-of-stream used to flush the old graph.
#[test]
fn test_drain_marker_not_forwarded_downstream() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    bin.take_output_events(output).unwrap();

    bin.set_output_needs_reconfigure(output).unwrap();
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    let events = bin.take_output_events(output).unwrap();
    assert!(events.iter().all(|e| !matches!(e, Event::Eos)));
}

/// A real end-of-stream from upstream passes through to the consumer
/// while the bin is idle.
#[test]
fn test_external_eos_passes_through() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    bin.take_output_events(output).unwrap();

    bin.push_event(input, Event::Eos).unwrap();
    let events = bin.take_output_events(output).unwrap();
    assert_eq!(events, vec![Event::Eos]);
}

/// Sticky events are replayed into the rebuilt graph so the consumer
/// observes the same preroll sequence again.
#[test]
fn test_sticky_events_replayed_after_rebuild() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(
        input,
        Event::StreamStart {
            stream_id: "cam-0".into(),
        },
    )
    .unwrap();
    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();
    bin.push_event(input, Event::Segment { start: 120 }).unwrap();

    // The initial build already replayed the sticky set present at plan
    // time; collect and discard everything seen so far.
    bin.take_output_events(output).unwrap();

    bin.set_output_needs_reconfigure(output).unwrap();
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    let events = bin.take_output_events(output).unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::StreamStart { stream_id } if stream_id == "cam-0")));
    assert!(events.iter().any(|e| matches!(e, Event::Caps(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Segment { start: 120 })));
    assert!(events.iter().all(|e| !matches!(e, Event::Eos)));
}

/// Buffers pushed from other threads during a rebuild are serialized
/// against the swap: every buffer lands in exactly one graph and none
/// are lost.
#[test]
fn test_concurrent_buffers_survive_rebuild() {
    let bin = Arc::new(converter_bin());
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    bin.push_event(input, Event::Caps(caps("rgb"))).unwrap();

    let workers: Vec<_> = (0..4u64)
        .map(|w| {
            let bin = Arc::clone(&bin);
            std::thread::spawn(move || {
                for i in 0..25 {
                    bin.push_buffer(input, Buffer::new(&b"frame"[..], w * 100 + i))
                        .unwrap();
                }
            })
        })
        .collect();

    for _ in 0..8 {
        bin.set_output_needs_reconfigure(output).unwrap();
        std::thread::yield_now();
    }

    for worker in workers {
        worker.join().unwrap();
    }
    // Flush any latch left over from the loop above.
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 999)).unwrap();

    let delivered = bin.take_output_buffers(output).unwrap();
    assert_eq!(delivered.len(), 101);
}

/// Rebuilding with no live graph (nothing planned yet) transitions
/// straight through: the awaiting-drain set is empty.
#[test]
fn test_rebuild_with_empty_drain_set() {
    let bin = converter_bin();
    let input = bin.add_input("in0");
    let output = bin.add_output("out0", caps("yuv"));

    // Latch before any caps arrive: no graph exists, so the first
    // buffer rebuilds immediately without draining anything.
    bin.set_output_needs_reconfigure(output).unwrap();
    bin.push_buffer(input, Buffer::new(&b"frame"[..], 0)).unwrap();

    assert!(!bin.output_needs_reconfigure(output).unwrap());
}
