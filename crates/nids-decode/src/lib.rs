//! OpenNIDS Decoder
//!
//! Raw frame bytes in, `PacketRecord` out. Only the fields the feature
//! extractor and detectors need are pulled; everything else is ignored.
//! An undecodable frame is a skip (counted upstream), never a failure of
//! the pipeline.

mod decode;
mod http;
mod sniff;

pub use decode::{decode_frame, DecodeError};
pub use http::sniff_http_request;
pub use sniff::{looks_like_tls_client_hello, shannon_entropy, sniff_dns_queries};
