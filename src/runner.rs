use crate::{
    backend::create_processor,
    config::RunConfig,
    foundation::{error::FrameResult, timing::Stopwatch},
    pipeline::{Pipeline, ProcessorNode, RunStats, SinkNode, SourceNode},
};

/// Decode `cfg.input`, filter every frame with the configured backend and encode to
/// `cfg.output`.
///
/// The backend is fixed before any frame is read. Any error aborts the run.
#[tracing::instrument(level = "info", skip_all, fields(backend = %cfg.backend, kernel = %cfg.kernel))]
pub fn run(cfg: &RunConfig) -> FrameResult<RunStats> {
    cfg.validate()?;
    let sw = Stopwatch::start("run");

    let processor = create_processor(cfg.backend, &cfg.processor_opts())?;
    let source = cfg.input_engine().open_source(&cfg.input, cfg.row_align)?;
    let sink = cfg.output_engine().open_sink(&cfg.output, cfg.overwrite)?;

    let mut pipeline = Pipeline::new(SourceNode::new(source))
        .then(ProcessorNode::new(processor))
        .then(SinkNode::new(sink));
    let stats = pipeline.execute()?;

    tracing::info!(
        input = %cfg.input.display(),
        output = %cfg.output.display(),
        frames = stats.frames_encoded,
        elapsed_ms = sw.elapsed().as_secs_f64() * 1000.0,
        "run complete"
    );
    Ok(stats)
}
