//! # LinkStore Codec
//!
//! Record value model and serialized form for LinkStore.
//!
//! This crate provides:
//! - [`Value`], the dynamic property value held by records
//! - [`Document`], the field map a record becomes before it is stored
//! - [`SerializedRecord`], the CBOR bytes handed to record stores
//!
//! ## Usage
//!
//! ```
//! use linkstore_codec::{Document, SerializedRecord, Value};
//!
//! let mut doc = Document::new();
//! doc.insert("title".into(), Value::from("hello"));
//!
//! let encoded = SerializedRecord::encode(&doc).unwrap();
//! assert_eq!(encoded.decode().unwrap(), doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod value;

pub use document::{Document, SerializedRecord};
pub use error::{CodecError, CodecResult};
pub use value::Value;
