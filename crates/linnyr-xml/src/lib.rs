//! Deterministic XML serialization for a model document: [`write_document`]
//! and [`read_document`] are meant to round-trip, modulo the ordering of
//! sets the model itself treats as unordered.

pub mod document;
pub mod error;
pub mod rawdata;
pub mod read;
pub mod write;

pub use document::ModelDocument;
pub use error::XmlError;
pub use read::read_document;
pub use write::write_document;
