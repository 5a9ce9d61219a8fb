use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    codec::{DecodedFrame, FrameSink, FrameSource},
    foundation::error::FrameResult,
    frame::{
        context::{Context, StreamInfo},
        packet::Frame,
    },
};

/// Yields a fixed list of frames, then end of stream.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    frames: VecDeque<Frame>,
    info: StreamInfo,
}

impl InMemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            info: StreamInfo::default(),
        }
    }

    pub fn with_info(mut self, info: StreamInfo) -> Self {
        self.info = info;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for InMemorySource {
    fn next_frame(&mut self) -> FrameResult<Option<DecodedFrame>> {
        Ok(self.frames.pop_front().map(|frame| DecodedFrame {
            frame,
            info: self.info,
        }))
    }
}

#[derive(Debug, Default)]
struct OutputState {
    context: Option<Context>,
    begins: usize,
    ended: bool,
    staged: Vec<Frame>,
    committed: Vec<Frame>,
}

/// Read side of an [`InMemorySink`], usable after the sink has moved into a pipeline.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOutput {
    state: Arc<Mutex<OutputState>>,
}

impl InMemoryOutput {
    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames committed by `end`; empty until the run finishes.
    pub fn frames(&self) -> Vec<Frame> {
        self.lock().committed.clone()
    }

    pub fn context(&self) -> Option<Context> {
        self.lock().context.clone()
    }

    /// How many times `begin` was called.
    pub fn begins(&self) -> usize {
        self.lock().begins
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }
}

/// Collects frames in memory. Nothing becomes visible through the output handle before `end`.
#[derive(Debug, Default)]
pub struct InMemorySink {
    output: InMemoryOutput,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> InMemoryOutput {
        self.output.clone()
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, ctx: &Context) -> FrameResult<()> {
        let mut state = self.output.lock();
        state.begins += 1;
        state.context = Some(ctx.clone());
        Ok(())
    }

    fn write_frame(&mut self, frame: Frame) -> FrameResult<()> {
        self.output.lock().staged.push(frame);
        Ok(())
    }

    fn end(&mut self) -> FrameResult<()> {
        let mut state = self.output.lock();
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        state.ended = true;
        Ok(())
    }
}
