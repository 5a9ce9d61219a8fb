/// Result alias used across the crate.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors raised while decoding, filtering or encoding frames.
///
/// Every variant is fatal to the current run: nothing retries and no partial output is written.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    /// A plane is missing or holds fewer bytes than its geometry requires.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Width or height is zero.
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },

    #[error("shader compile error: {0}")]
    ShaderCompile(String),

    #[error("device init error: {0}")]
    DeviceInit(String),

    /// The GPU did not signal completion within the configured wait budget.
    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// A task running on a worker thread panicked.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrameError {
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    pub fn shader_compile(msg: impl Into<String>) -> Self {
        Self::ShaderCompile(msg.into())
    }

    pub fn device_init(msg: impl Into<String>) -> Self {
        Self::DeviceInit(msg.into())
    }

    pub fn device_lost(msg: impl Into<String>) -> Self {
        Self::DeviceLost(msg.into())
    }

    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::Decoding(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }
}
