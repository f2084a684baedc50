//! Renders text files and images into canvas edits and streams them to a
//! tiled text canvas over websockets, optionally sharded across proxies.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod partition;
pub mod progress;
pub mod proxy;
pub mod render;
pub mod source;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ImageRender, Mode, Repeat, RunConfig};
pub use dispatch::{Dispatcher, RunReport};
pub use error::{ConfigError, DispatchError, SourceError, TransportError};
pub use progress::{ProgressEvent, Reporter, RunStatus};
