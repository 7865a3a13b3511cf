//! DevTools protocol plumbing for driving a desktop editor's chat pane.
//!
//! The editor must be started with a remote debugging port:
//!
//! ```sh
//! cursor --remote-debugging-port=9223
//! ```
//!
//! # Architecture
//!
//! - **`cdp`**: WebSocket client correlating `{id, method, params}` commands
//!   with their responses, with per-call timeouts and guaranteed cleanup.
//! - **`driver`**: `PageDriver`, typed wrappers over the DOM, Input, and
//!   Runtime commands used below.
//! - **`discovery`**: `/json/list` lookup and ranking of editor windows.
//! - **`inject`**: the text injection sequence (find input, focus, type, Enter).
//! - **`extract`**: chat container markup and conversation names.
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use pocket_cdp::{DiscoveryConfig, TargetDiscovery};
//!
//! let targets = TargetDiscovery::new(DiscoveryConfig::default()).discover().await;
//! for target in &targets {
//!     pocket_cdp::send_text(&target.url, "run the tests").await?;
//! }
//! let transcripts = pocket_cdp::read_transcripts(&targets).await;
//! ```

pub mod cdp;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod extract;
pub mod inject;

// Re-export key types at the crate root for convenience.
pub use cdp::{CdpClient, IdCounter};
pub use discovery::{select_targets, DiscoveryConfig, PageEntry, Target, TargetDiscovery};
pub use driver::{BoxModel, NodeId, PageDriver};
pub use error::CdpError;
pub use extract::{conversation_name, extract_chat_html, read_transcripts, ChatTranscript};
pub use inject::{send_text, send_text_with, InputSelector, DEFAULT_INPUT_SELECTORS};
