use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use tile_proto::{Origin, Rgb};
use tracing::warn;

use crate::error::ConfigError;
use crate::proxy::Proxy;

pub const DEFAULT_SERVER_URL: &str = "wss://ourworldoftext.com/ws/";
pub const DEFAULT_CHUNK_SIZE: usize = 80;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(170);

/// What to draw and whether it is spread across a proxy pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    AsciiSingle,
    AsciiSharded,
    ImageSingle,
    ImageSharded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Image,
}

impl Mode {
    pub fn is_sharded(self) -> bool {
        matches!(self, Mode::AsciiSharded | Mode::ImageSharded)
    }

    pub fn source_kind(self) -> SourceKind {
        match self {
            Mode::AsciiSingle | Mode::AsciiSharded => SourceKind::Text,
            Mode::ImageSingle | Mode::ImageSharded => SourceKind::Image,
        }
    }

    /// Single image runs paint one cell per pixel; sharded image runs pack
    /// 2×2 pixel blocks into quadrant glyphs.
    pub fn default_image_render(self) -> ImageRender {
        match self {
            Mode::ImageSharded => ImageRender::Quadrant,
            _ => ImageRender::Pixel,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::AsciiSingle => "ascii-single",
            Mode::AsciiSharded => "ascii-sharded",
            Mode::ImageSingle => "image-single",
            Mode::ImageSharded => "image-sharded",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ImageRender {
    /// One canvas cell per pixel, painted through the cell background.
    Pixel,
    /// One canvas cell per 2×2 pixel block, drawn with a quadrant glyph.
    Quadrant,
}

/// How many full passes a worker makes over its edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repeat {
    Finite(NonZeroU64),
    Unbounded,
}

impl Repeat {
    pub const ONCE: Repeat = Repeat::Finite(NonZeroU64::MIN);

    /// Whether another pass may start after `completed` passes.
    pub fn allows(self, completed: u64) -> bool {
        match self {
            Repeat::Finite(total) => completed < total.get(),
            Repeat::Unbounded => true,
        }
    }
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::ONCE
    }
}

impl FromStr for Repeat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("inf") {
            return Ok(Repeat::Unbounded);
        }
        value
            .parse::<NonZeroU64>()
            .map(Repeat::Finite)
            .map_err(|_| ConfigError::InvalidRepeat(s.to_string()))
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repeat::Finite(total) => write!(f, "{total}"),
            Repeat::Unbounded => f.write_str("Infinite"),
        }
    }
}

/// Parses a fractional number of seconds.
pub fn parse_delay(s: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidDelay(s.to_string()))?;
    if secs < 0.0 {
        return Err(ConfigError::InvalidDelay(s.to_string()));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDelay(s.to_string()))
}

pub fn parse_chunk_size(s: &str) -> Result<NonZeroUsize, ConfigError> {
    let size: usize = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidChunkSize(s.to_string()))?;
    NonZeroUsize::new(size).ok_or(ConfigError::ZeroChunkSize)
}

/// Parses an optional `#rrggbb` value. Invalid input is logged and treated
/// as absent so the caller's default applies.
pub fn parse_color_lenient(field: &'static str, raw: Option<&str>) -> Option<Rgb> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<Rgb>() {
        Ok(color) => Some(color),
        Err(err) => {
            warn!(field, value = raw, error = %err, "ignoring invalid color");
            None
        }
    }
}

/// Everything a run needs, as supplied by a front-end.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub server_url: String,
    pub origin: Origin,
    pub repeat: Repeat,
    pub chunk_size: NonZeroUsize,
    pub delay: Duration,
    pub wipe: bool,
    pub foreground: Rgb,
    pub background: Option<Rgb>,
    pub image_render: ImageRender,
    /// Stretch images to the canvas cell aspect before rendering.
    pub aspect_correction: bool,
    pub source: PathBuf,
    /// Optional tunnel for single-connection modes.
    pub proxy: Option<Proxy>,
    /// One proxy per shard; required by sharded modes.
    pub proxy_list: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(mode: Mode, source: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            server_url: DEFAULT_SERVER_URL.to_string(),
            origin: Origin::default(),
            repeat: Repeat::ONCE,
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            delay: DEFAULT_DELAY,
            wipe: false,
            foreground: Rgb::BLACK,
            background: None,
            image_render: mode.default_image_render(),
            aspect_correction: true,
            source: source.into(),
            proxy: None,
            proxy_list: None,
        }
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server_url(&self.server_url)?;
        if !self.source.is_file() {
            return Err(ConfigError::MissingSource(self.source.clone()));
        }
        if self.mode.is_sharded() {
            let path = self
                .proxy_list
                .as_ref()
                .ok_or(ConfigError::MissingProxyList { mode: self.mode })?;
            if !path.is_file() {
                return Err(ConfigError::ProxyListNotFound(path.clone()));
            }
        }
        Ok(())
    }

    /// Human-readable settings, one line each.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Mode: {}", self.mode),
            format!("Position: ({}, {})", self.origin.x, self.origin.y),
            format!("Repetitions: {}", self.repeat),
            format!("Chunk size: {}", self.chunk_size),
            format!("Sleep: {}s", self.delay.as_secs_f64()),
            format!("Wipe mode: {}", if self.wipe { "on" } else { "off" }),
        ];
        match self.mode.source_kind() {
            SourceKind::Text => {
                lines.push(format!("Color: {}", self.foreground));
                if let Some(background) = self.background {
                    lines.push(format!("Background Color: {background}"));
                }
            }
            SourceKind::Image => {
                let render = match self.image_render {
                    ImageRender::Pixel => "pixel",
                    ImageRender::Quadrant => "quadrant",
                };
                lines.push(format!("Image render: {render}"));
                if !self.aspect_correction {
                    lines.push("Aspect correction: off".to_string());
                }
            }
        }
        lines
    }
}

pub fn validate_server_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidServerUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid("scheme must be ws or wss"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}
