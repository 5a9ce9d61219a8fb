//! Decode and encode through the system `ffmpeg`/`ffprobe` binaries, exchanging rawvideo over
//! pipes.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use crate::{
    codec::{
        DecodedFrame, FrameSink, FrameSource, ensure_parent_dir, pack_planes, packed_len,
        refuse_existing, unpack_planes,
    },
    foundation::{
        core::{PixelFormat, Rational},
        error::{FrameError, FrameResult},
    },
    frame::{
        context::{Context, StreamInfo},
        packet::Frame,
    },
};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// What `ffprobe` reports about the first video stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    /// ffmpeg pixel format name, when reported.
    pub pix_fmt: Option<String>,
    pub info: StreamInfo,
}

impl ProbeInfo {
    /// The pixel format frames are decoded to: the stream's own when it is one of ours, else
    /// `yuv420p`.
    pub fn decode_format(&self) -> PixelFormat {
        self.pix_fmt
            .as_deref()
            .and_then(PixelFormat::from_ffmpeg_name)
            .unwrap_or(PixelFormat::Yuv420p)
    }
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    time_base: Option<String>,
    sample_aspect_ratio: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

fn parse_probe(json: &[u8]) -> FrameResult<ProbeInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| FrameError::decoding(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FrameError::decoding("no video stream found"))?;
    let width = stream
        .width
        .ok_or_else(|| FrameError::decoding("missing video width from ffprobe"))?;
    let height = stream
        .height
        .ok_or_else(|| FrameError::decoding("missing video height from ffprobe"))?;

    let defaults = StreamInfo::default();
    let rational = |s: Option<&str>, fallback: Rational| -> FrameResult<Rational> {
        match s {
            Some(s) => {
                let r = Rational::parse(s)?;
                Ok(if r.is_known() { r } else { fallback })
            }
            None => Ok(fallback),
        }
    };
    Ok(ProbeInfo {
        width,
        height,
        pix_fmt: stream.pix_fmt.clone(),
        info: StreamInfo {
            time_base: rational(stream.time_base.as_deref(), defaults.time_base)?,
            frame_rate: rational(stream.r_frame_rate.as_deref(), defaults.frame_rate)?,
            aspect_ratio: rational(stream.sample_aspect_ratio.as_deref(), defaults.aspect_ratio)?,
        },
    })
}

pub fn probe(path: &Path) -> FrameResult<ProbeInfo> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| FrameError::decoding(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(FrameError::decoding(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    parse_probe(&out.stdout)
}

/// Fill `buf` from `reader`, stopping early only at end of input. Returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub struct FfmpegSource {
    path: PathBuf,
    probe: ProbeInfo,
    format: PixelFormat,
    row_align: usize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buf: Vec<u8>,
}

impl FfmpegSource {
    pub fn open(path: &Path, row_align: usize) -> FrameResult<Self> {
        if !is_ffmpeg_on_path() {
            return Err(FrameError::decoding(
                "ffmpeg is required for video decoding, but was not found on PATH",
            ));
        }
        let probe = probe(path)?;
        if probe.width == 0 || probe.height == 0 {
            return Err(FrameError::InvalidDimensions {
                width: probe.width,
                height: probe.height,
            });
        }
        let format = probe.decode_format();

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", format.ffmpeg_name(), "-an", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FrameError::decoding(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FrameError::decoding("failed to open ffmpeg stdout (unexpected)"))?;

        tracing::info!(
            path = %path.display(),
            width = probe.width,
            height = probe.height,
            format = %format,
            frame_rate = %probe.info.frame_rate,
            "opened video source"
        );
        Ok(Self {
            path: path.to_path_buf(),
            buf: vec![0u8; packed_len(format, probe.width, probe.height)],
            probe,
            format,
            row_align: row_align.max(1),
            child: Some(child),
            stdout: Some(stdout),
        })
    }

    pub fn probe_info(&self) -> &ProbeInfo {
        &self.probe
    }

    fn finish_child(&mut self) -> FrameResult<()> {
        drop(self.stdout.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child.wait_with_output().map_err(|e| {
            FrameError::decoding(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        if !output.status.success() {
            return Err(FrameError::decoding(format!(
                "ffmpeg exited with status {} while decoding '{}': {}",
                output.status,
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> FrameResult<Option<DecodedFrame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let n = read_full(stdout, &mut self.buf)
            .map_err(|e| FrameError::decoding(format!("failed to read from ffmpeg: {e}")))?;
        if n == 0 {
            self.finish_child()?;
            return Ok(None);
        }
        if n < self.buf.len() {
            self.finish_child()?;
            return Err(FrameError::decoding(format!(
                "truncated frame: got {n} of {} bytes",
                self.buf.len()
            )));
        }
        let frame = unpack_planes(
            &self.buf,
            self.probe.width,
            self.probe.height,
            self.format,
            self.row_align,
        )?;
        Ok(Some(DecodedFrame {
            frame,
            info: self.probe.info,
        }))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Pipes rawvideo into `ffmpeg`, which picks the encoder from the output extension.
///
/// The process starts in `begin`, once the stream geometry is known. Dropping the sink before
/// `end` kills the process and removes the partial file.
pub struct FfmpegSink {
    path: PathBuf,
    overwrite: bool,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegSink {
    pub fn new(path: &Path, overwrite: bool) -> FrameResult<Self> {
        refuse_existing(path, overwrite)?;
        if !is_ffmpeg_on_path() {
            return Err(FrameError::encoding(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            overwrite,
            child: None,
            stdin: None,
            scratch: Vec::new(),
        })
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, ctx: &Context) -> FrameResult<()> {
        ensure_parent_dir(&self.path)?;
        let rate = if ctx.frame_rate.is_known() {
            ctx.frame_rate
        } else {
            StreamInfo::default().frame_rate
        };

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            ctx.pixel_format.ffmpeg_name(),
            "-s",
            &format!("{}x{}", ctx.width, ctx.height),
            "-r",
            &rate.to_string(),
            "-i",
            "pipe:0",
            "-an",
        ])
        .arg(&self.path);

        let mut child = cmd.spawn().map_err(|e| {
            FrameError::encoding(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FrameError::encoding("failed to open ffmpeg stdin (unexpected)"))?;
        tracing::info!(
            path = %self.path.display(),
            format = %ctx.pixel_format,
            frame_rate = %rate,
            "started video encode"
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    fn write_frame(&mut self, frame: Frame) -> FrameResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FrameError::encoding("ffmpeg encoder is not running"));
        };
        pack_planes(&frame, &mut self.scratch)?;
        stdin.write_all(&self.scratch).map_err(|e| {
            FrameError::encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> FrameResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child.wait_with_output().map_err(|e| {
            FrameError::encoding(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        if !output.status.success() {
            return Err(FrameError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            if std::fs::remove_file(&self.path).is_ok() {
                tracing::warn!(path = %self.path.display(), "removed partial output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_json_picks_video_stream() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 720, "height": 576,
                 "pix_fmt": "yuv420p", "r_frame_rate": "25/1",
                 "time_base": "1/25", "sample_aspect_ratio": "16:15"}
            ],
            "format": {"duration": "4.0"}
        }"#;
        let p = parse_probe(json).unwrap();
        assert_eq!((p.width, p.height), (720, 576));
        assert_eq!(p.decode_format(), PixelFormat::Yuv420p);
        assert_eq!(p.info.frame_rate, Rational::new(25, 1));
        assert_eq!(p.info.aspect_ratio, Rational::new(16, 15));
    }

    #[test]
    fn unknown_pix_fmt_decodes_as_yuv420p() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 2, "height": 2,
            "pix_fmt": "nv12", "sample_aspect_ratio": "0:1"}]}"#;
        let p = parse_probe(json).unwrap();
        assert_eq!(p.decode_format(), PixelFormat::Yuv420p);
        assert_eq!(p.info.aspect_ratio, Rational::SQUARE);
    }

    #[test]
    fn missing_video_stream_is_decoding_error() {
        let err = parse_probe(br#"{"streams": []}"#).unwrap_err();
        assert!(matches!(err, FrameError::Decoding(_)));
    }

    #[test]
    fn read_full_stops_at_end_of_input() {
        let mut src: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
