//! Stored image graphs
//!
//! An ingested image is a chain of records in the content store:
//!
//! ```text
//! pointer record ──> index ──> manifest ──> config
//!                                       └─> layers...
//! ```
//!
//! Every link is a descriptor whose single `ipfs://` locator names the next
//! record. The pointer record's own CID is the root handle for the image.

mod reader;
mod writer;

pub use reader::{Content, GraphReader, Reader};
pub use writer::ImageWriter;
