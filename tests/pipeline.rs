use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use frameblend::{
    BackendKind, Context, Frame, FrameError, FrameResult, InMemorySink, InMemorySource, Kernel,
    Packet, PixelFormat, Pipeline, Plane, Processor, ProcessorNode, ProcessorOpts, SinkNode,
    SourceNode, create_processor,
};

/// Counts calls and fails on the configured frame.
struct Probe {
    inits: Arc<AtomicUsize>,
    processed: Arc<AtomicUsize>,
    fail_at: Option<usize>,
}

impl Processor for Probe {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn init(&mut self, _ctx: &Context) -> FrameResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&mut self, packet: Packet) -> FrameResult<Packet> {
        let n = self.processed.fetch_add(1, Ordering::SeqCst);
        if Some(n) == self.fail_at {
            return Err(FrameError::invalid_frame("injected failure"));
        }
        Ok(packet)
    }
}

fn gray(width: u32, height: u32, fill: u8) -> Frame {
    let len = (width * height) as usize;
    Frame::new(
        width,
        height,
        PixelFormat::Gray,
        vec![Plane::new(vec![fill; len], width as usize)],
    )
}

#[test]
fn processor_is_initialized_exactly_once() {
    let inits = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(AtomicUsize::new(0));
    let sink = InMemorySink::new();
    let out = sink.output();
    let frames = (0..5).map(|i| gray(4, 4, i));

    let stats = Pipeline::new(SourceNode::new(InMemorySource::new(frames)))
        .then(ProcessorNode::new(Box::new(Probe {
            inits: Arc::clone(&inits),
            processed: Arc::clone(&processed),
            fail_at: None,
        })))
        .then(SinkNode::new(sink))
        .execute()
        .unwrap();

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(processed.load(Ordering::SeqCst), 5);
    assert_eq!(stats.frames_decoded, 5);
    assert_eq!(stats.frames_processed, 5);
    assert_eq!(stats.frames_encoded, 5);
    assert_eq!(out.begins(), 1);
    assert!(out.is_ended());
    let written = out.frames();
    assert_eq!(written.len(), 5);
    assert_eq!(written[4].planes()[0].data()[0], 4);
}

#[test]
fn empty_stream_never_opens_the_sink() {
    let sink = InMemorySink::new();
    let out = sink.output();
    let stats = Pipeline::new(SourceNode::new(InMemorySource::new(Vec::new())))
        .then(ProcessorNode::new(
            create_processor(BackendKind::Sequential, &ProcessorOpts::default()).unwrap(),
        ))
        .then(SinkNode::new(sink))
        .execute()
        .unwrap();
    assert_eq!(stats.frames_decoded, 0);
    assert_eq!(out.begins(), 0);
    assert!(!out.is_ended());
}

#[test]
fn processor_error_aborts_run_without_sink_output() {
    let sink = InMemorySink::new();
    let out = sink.output();
    let frames = (0..4).map(|i| gray(4, 4, i));
    let err = Pipeline::new(SourceNode::new(InMemorySource::new(frames)))
        .then(ProcessorNode::new(Box::new(Probe {
            inits: Arc::default(),
            processed: Arc::default(),
            fail_at: Some(2),
        })))
        .then(SinkNode::new(sink))
        .execute()
        .unwrap_err();
    assert!(matches!(err, FrameError::InvalidFrame(_)));
    assert!(out.frames().is_empty());
    assert!(!out.is_ended());
}

#[test]
fn geometry_change_mid_stream_is_rejected() {
    let sink = InMemorySink::new();
    let out = sink.output();
    let frames = vec![gray(4, 4, 1), gray(6, 4, 1)];
    let err = Pipeline::new(SourceNode::new(InMemorySource::new(frames)))
        .then(ProcessorNode::new(
            create_processor(BackendKind::Simd, &ProcessorOpts::new(Kernel::Blur)).unwrap(),
        ))
        .then(SinkNode::new(sink))
        .execute()
        .unwrap_err();
    assert!(matches!(err, FrameError::InvalidFrame(_)));
    assert!(out.frames().is_empty());
}

#[test]
fn real_backend_filters_frames_end_to_end() {
    let sink = InMemorySink::new();
    let out = sink.output();
    let frame = Frame::new(
        2,
        2,
        PixelFormat::Gray,
        vec![Plane::new(vec![10, 20, 30, 40], 2)],
    );
    Pipeline::new(SourceNode::new(InMemorySource::new([frame.clone(), frame])))
        .then(ProcessorNode::new(
            create_processor(BackendKind::ThreadPool, &ProcessorOpts::default().with_threads(2))
                .unwrap(),
        ))
        .then(SinkNode::new(sink))
        .execute()
        .unwrap();
    let frames = out.frames();
    assert_eq!(frames.len(), 2);
    for f in frames {
        assert_eq!(f.planes()[0].data(), &[10, 20, 20, 30]);
        assert_eq!(out.context().unwrap().width, 2);
    }
}
