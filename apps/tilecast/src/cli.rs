use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use tile_proto::{Origin, Rgb};

use crate::config::{
    parse_chunk_size, parse_color_lenient, parse_delay, ImageRender, Mode, Repeat, RunConfig,
    DEFAULT_SERVER_URL,
};
use crate::error::ConfigError;
use crate::proxy::Proxy;
use crate::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "tilecast",
    about = "Stream ASCII art and images onto a shared tiled text canvas",
    author,
    version,
    allow_negative_numbers = true
)]
pub struct Cli {
    #[arg(value_enum, help = "What to draw and whether to shard it across proxies")]
    pub mode: Mode,

    #[arg(value_name = "FILE", help = "Text file or image to draw")]
    pub source: PathBuf,

    #[arg(
        long,
        env = "TILECAST_SERVER",
        default_value = DEFAULT_SERVER_URL,
        help = "Websocket endpoint of the canvas service"
    )]
    pub server: String,

    #[arg(long, default_value_t = 0, help = "Origin column, in tiles")]
    pub x: i64,

    #[arg(long, default_value_t = 0, help = "Origin row, in tiles")]
    pub y: i64,

    #[arg(
        long,
        default_value = "1",
        value_name = "N|inf",
        help = "Passes over the drawing; 'inf' loops until stopped"
    )]
    pub repeat: Repeat,

    #[arg(
        long = "chunk-size",
        default_value = "80",
        value_parser = parse_chunk_size,
        help = "Edits per websocket message"
    )]
    pub chunk_size: NonZeroUsize,

    #[arg(
        long,
        default_value = "0.17",
        value_parser = parse_delay,
        value_name = "SECONDS",
        help = "Pause after every message"
    )]
    pub delay: Duration,

    #[arg(long, help = "Blank every target cell instead of drawing")]
    pub wipe: bool,

    #[arg(long, value_name = "#RRGGBB", help = "Text colour (text modes)")]
    pub color: Option<String>,

    #[arg(long = "bg-color", value_name = "#RRGGBB", help = "Cell background (text modes)")]
    pub bg_color: Option<String>,

    #[arg(
        long = "render",
        value_enum,
        help = "Image rendering; defaults to pixel for image-single and quadrant for image-sharded"
    )]
    pub image_render: Option<ImageRender>,

    #[arg(
        long = "no-aspect-correction",
        help = "Use images at their stored size; files named *_resized* are never corrected"
    )]
    pub no_aspect_correction: bool,

    #[arg(
        long,
        env = "TILECAST_PROXY",
        value_name = "HOST:PORT[:USER:PASS]",
        conflicts_with = "proxy_list",
        help = "Tunnel a single-connection run through this HTTP proxy"
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "proxy-list",
        env = "TILECAST_PROXY_LIST",
        value_name = "PATH",
        help = "Proxy file for sharded modes, one proxy per line"
    )]
    pub proxy_list: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Diagnostics only; progress lines always print to stdout.
#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "TILECAST_LOG_LEVEL",
        default_value_t = LogLevel::default(),
        help = "Diagnostic verbosity; info also logs progress lines"
    )]
    pub log_level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "TILECAST_LOG_FILE",
        help = "Append diagnostics and every progress line to PATH instead of stderr"
    )]
    pub log_file: Option<PathBuf>,
}

impl From<&LoggingArgs> for LogConfig {
    fn from(args: &LoggingArgs) -> Self {
        LogConfig {
            level: args.log_level,
            file: args.log_file.clone(),
        }
    }
}

impl Cli {
    pub fn to_run_config(&self) -> Result<RunConfig, ConfigError> {
        let proxy = self
            .proxy
            .as_deref()
            .map(|entry| {
                entry
                    .parse::<Proxy>()
                    .map_err(|source| ConfigError::InvalidProxy {
                        entry: entry.to_string(),
                        source,
                    })
            })
            .transpose()?;

        let mut config = RunConfig::new(self.mode, &self.source);
        config.server_url = self.server.clone();
        config.origin = Origin::new(self.x, self.y);
        config.repeat = self.repeat;
        config.chunk_size = self.chunk_size;
        config.delay = self.delay;
        config.wipe = self.wipe;
        config.foreground =
            parse_color_lenient("color", self.color.as_deref()).unwrap_or(Rgb::BLACK);
        config.background = parse_color_lenient("bg-color", self.bg_color.as_deref());
        if let Some(render) = self.image_render {
            config.image_render = render;
        }
        config.aspect_correction = !self.no_aspect_correction;
        config.proxy = proxy;
        config.proxy_list = self.proxy_list.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tilecast").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test_timeout::timeout]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test_timeout::timeout]
    fn defaults_match_the_canvas_service() {
        let config = parse(&["ascii-single", "art.txt"])
            .to_run_config()
            .expect("config");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.chunk_size.get(), 80);
        assert_eq!(config.delay, Duration::from_secs_f64(0.17));
        assert_eq!(config.repeat, Repeat::ONCE);
        assert_eq!(config.origin, Origin::default());
        assert!(!config.wipe);
    }

    #[test_timeout::timeout]
    fn negative_origins_and_unbounded_repeat() {
        let config = parse(&[
            "image-sharded",
            "cat.png",
            "--x",
            "-3",
            "--y",
            "-12",
            "--repeat",
            "inf",
            "--proxy-list",
            "proxies.txt",
            "--render",
            "pixel",
        ])
        .to_run_config()
        .expect("config");
        assert_eq!(config.origin, Origin::new(-3, -12));
        assert_eq!(config.repeat, Repeat::Unbounded);
        assert_eq!(config.image_render, ImageRender::Pixel);
        assert!(config.aspect_correction);
        assert_eq!(config.proxy_list, Some(PathBuf::from("proxies.txt")));
    }

    #[test_timeout::timeout]
    fn logging_flags_build_a_log_config() {
        let cli = parse(&["ascii-single", "a.txt", "--log-level", "debug", "--log-file", "run.log"]);
        let config = LogConfig::from(&cli.logging);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.file, Some(PathBuf::from("run.log")));
    }

    #[test_timeout::timeout]
    fn aspect_correction_can_be_disabled() {
        let config = parse(&["image-single", "cat.png", "--no-aspect-correction"])
            .to_run_config()
            .expect("config");
        assert!(!config.aspect_correction);
    }

    #[test_timeout::timeout]
    fn rejects_non_positive_numbers() {
        let base = ["tilecast", "ascii-single", "a.txt"];
        for extra in [["--chunk-size", "0"], ["--repeat", "0"], ["--delay", "-1"]] {
            let args = base.iter().chain(extra.iter());
            assert!(Cli::try_parse_from(args).is_err(), "{extra:?} accepted");
        }
    }

    #[test_timeout::timeout]
    fn invalid_colors_fall_back() {
        let config = parse(&["ascii-single", "a.txt", "--color", "#zzzzzz", "--bg-color", "fff"])
            .to_run_config()
            .expect("config");
        assert_eq!(config.foreground, Rgb::BLACK);
        assert_eq!(config.background, None);
    }

    #[test_timeout::timeout]
    fn single_proxy_is_parsed_strictly() {
        let config = parse(&["ascii-single", "a.txt", "--proxy", "http://relay:3128:u:p"])
            .to_run_config()
            .expect("config");
        assert_eq!(
            config.proxy,
            Some(Proxy::new("relay", 3128).with_auth("u", "p"))
        );

        let err = parse(&["ascii-single", "a.txt", "--proxy", "relay"])
            .to_run_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProxy { .. }));
    }
}
