//! Topic descriptions and fixed-layout message records
//!
//! Every topic is a self-contained `#[repr(C)]` record of plain fields, so
//! samples move through the bus as plain byte copies:
//! - [`TopicMetadata`] describes a topic (name, size, field list, id)
//! - [`Message`] ties a record type to its metadata
//! - [`define_topic!`](crate::define_topic) generates both and checks the layout
//! - [`fields`] parses field lists and renders records as text

#[macro_use]
mod macros;

pub mod fields;
pub mod message;
pub mod metadata;

#[cfg(test)]
mod tests;

pub use fields::{format_message, parse_fields, FieldDescriptor, FieldType};
pub use message::{as_bytes, as_bytes_mut, read_message, Message, Plain};
pub use metadata::{TopicId, TopicMetadata};
