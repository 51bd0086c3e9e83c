//! Console front end for chatflow
//!
//! Reads one update per line from stdin, routes it through a [`Router`] and
//! prints replies to stdout. The bundled conversation is the placeholder
//! image generator started with `/generate`.
//!
//! ```text
//! stdin ──► parse_line ──► Router ──┬─► /generate, /clear, /status
//!                                   └─► FlowRegistry::execute ──► steps ──► Transport ──► stdout
//! ```

pub mod config;
pub mod conversation;
pub mod input;
pub mod router;
pub mod transport;

pub use config::ConsoleConfig;
pub use conversation::{image_flow, ImageDraft};
pub use input::{parse_line, Command, Incoming, InputError, Update};
pub use router::{ImageRegistry, Router};
pub use transport::{ConsoleTransport, OutputFormat, RecordingTransport, Reply, Transport};
