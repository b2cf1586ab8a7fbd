//! Live relay of a review helper's output to one HTTP client.
//!
//! ```text
//! ProcessRunner → LineAssembler → PayloadExtractor → EventTranslator → Renderer → EventSink
//! ```
//!
//! [`StreamRelay`] drives the pipeline; everything upstream of it is a plain
//! call-on-demand transform.

pub mod event;
pub mod extract;
pub mod invocation;
pub mod lines;
pub mod process;
pub mod render;
pub mod stream;
pub mod translate;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use event::{Phase, UiEvent};
pub use extract::{ExtractionState, Extracted, Markers, PayloadExtractor};
pub use invocation::{Invocation, PrNumber, RepoSlug};
pub use lines::{Line, LineAssembler, LineEnding};
pub use process::ProcessRunner;
pub use render::{HtmlRenderer, NdjsonRenderer, Renderer};
pub use stream::{EventSink, RelayOptions, RelayOutcome, RelayToken, StreamRelay};
pub use translate::{EventTranslator, PhaseRule, PhaseTable};
