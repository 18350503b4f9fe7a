//! Unified Message Format (UMF)
//!
//! Every message exchanged between service instances, whether published on a
//! channel or parked in a queue, is a UMF envelope.
//!
//! ## Core Concepts
//! - **Long and short form**: Envelopes have canonical long field names (`from`, `body`, ...)
//!   and three-letter wire aliases (`frm`, `bdy`, ...). Producers may use either; the wire
//!   always carries the short form.
//! - **Merge semantics**: `Umf::create` accepts a partial JSON object and fills in a message ID,
//!   timestamp and protocol version when the caller did not supply them.
//! - **Routing**: The `to` field follows the grammar
//!   `[instance[-subID]@]serviceName[:segment]*[[httpMethod]]path`, decoded by `route::parse_route`.
//!
//! ## Submodules
//! - **`message`**: Envelope types, alias table, signing and validation.
//! - **`route`**: The address parser.

pub mod message;
pub mod route;

pub use message::{SignatureAlgorithm, ShortUmf, Umf, FIELD_ALIASES, UMF_VERSION};
pub use route::{parse_route, ParsedRoute, RouteError};

#[cfg(test)]
mod tests;
