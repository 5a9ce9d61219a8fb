use std::sync::Arc;

use crate::{
    backend::Processor,
    codec::{FrameSink, FrameSource},
    foundation::error::{FrameError, FrameResult},
    frame::{context::Context, packet::Packet},
    pipeline::{NodeRole, NodeState, PipelineNode},
};

/// Head node: pulls frames from a [`FrameSource`] and wraps them into packets.
///
/// The shared [`Context`] is built from the first frame and reused for the rest of the stream.
pub struct SourceNode<S> {
    source: S,
    context: Option<Arc<Context>>,
    done: bool,
}

impl<S: FrameSource> SourceNode<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            context: None,
            done: false,
        }
    }

    pub fn context(&self) -> Option<&Arc<Context>> {
        self.context.as_ref()
    }
}

impl<S: FrameSource> PipelineNode for SourceNode<S> {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Source
    }

    fn on_packet(&mut self, _packet: Option<Packet>) -> FrameResult<Option<Packet>> {
        if self.done {
            return Ok(None);
        }
        let Some(decoded) = self.source.next_frame()? else {
            tracing::debug!("end of stream");
            self.done = true;
            return Ok(None);
        };
        let context = match &self.context {
            Some(ctx) => Arc::clone(ctx),
            None => {
                let ctx = Arc::new(Context::from_frame(&decoded.frame, &decoded.info));
                tracing::debug!(
                    width = ctx.width,
                    height = ctx.height,
                    format = %ctx.pixel_format,
                    "stream context created"
                );
                self.context = Some(Arc::clone(&ctx));
                ctx
            }
        };
        Ok(Some(Packet::new(decoded.frame, context)))
    }

    fn is_complete(&self) -> bool {
        self.done
    }
}

/// Runs a [`Processor`] over every packet, initializing it from the first packet's context.
pub struct ProcessorNode {
    processor: Box<dyn Processor>,
    state: NodeState,
    context: Option<Arc<Context>>,
}

impl ProcessorNode {
    pub fn new(processor: Box<dyn Processor>) -> Self {
        Self {
            processor,
            state: NodeState::Uninitialized,
            context: None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }
}

impl PipelineNode for ProcessorNode {
    fn name(&self) -> &'static str {
        self.processor.kind().name()
    }

    fn on_packet(&mut self, packet: Option<Packet>) -> FrameResult<Option<Packet>> {
        let Some(packet) = packet else {
            return Ok(None);
        };
        match (&self.state, &self.context) {
            (NodeState::Ready, Some(ctx)) => {
                if !Arc::ptr_eq(ctx, packet.context()) && **ctx != **packet.context() {
                    return Err(FrameError::validation(
                        "stream parameters changed mid-stream",
                    ));
                }
            }
            _ => {
                self.processor.init(packet.context())?;
                self.context = Some(Arc::clone(packet.context()));
                self.state = NodeState::Ready;
                tracing::debug!(backend = self.name(), "processor initialized");
            }
        }
        self.processor.process(packet).map(Some)
    }

    fn is_complete(&self) -> bool {
        false
    }
}

/// Tail node: hands packets to a [`FrameSink`], opening it on the first packet.
pub struct SinkNode<K> {
    sink: K,
    state: NodeState,
}

impl<K: FrameSink> SinkNode<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            state: NodeState::Uninitialized,
        }
    }

    pub fn into_inner(self) -> K {
        self.sink
    }
}

impl<K: FrameSink> PipelineNode for SinkNode<K> {
    fn name(&self) -> &'static str {
        "encode"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Sink
    }

    fn on_packet(&mut self, packet: Option<Packet>) -> FrameResult<Option<Packet>> {
        let Some(packet) = packet else {
            return Ok(None);
        };
        if self.state == NodeState::Uninitialized {
            self.sink.begin(packet.context())?;
            self.state = NodeState::Ready;
        }
        self.sink.write_frame(packet.into_frame())?;
        Ok(None)
    }

    fn is_complete(&self) -> bool {
        false
    }

    fn finish(&mut self) -> FrameResult<()> {
        if self.state == NodeState::Ready {
            self.sink.end()?;
        }
        Ok(())
    }
}
