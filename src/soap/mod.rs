//! SOAP/WSDL subsystem.
//!
//! # Data Flow
//! ```text
//! schema.rs (SchemaNode trees)
//!     → interface.rs (WsInterface: named calls)
//!     → wsdl.rs (WSDL document)
//!     → marshal.rs (envelope ⇄ serde_json::Value)
//!     → endpoint.rs (HTTP: WSDL on GET, dispatch on POST, faults)
//! ```
//!
//! Supported subset: document/literal SOAP 1.1 over HTTP, synchronous
//! calls, nested object schemas. No WS-Security, no attachments.

pub mod endpoint;
pub mod error;
pub mod fault;
pub mod interface;
pub mod marshal;
pub mod schema;
pub mod wsdl;
mod xml;

pub use endpoint::{SoapEndpoint, SoapService};
pub use error::SoapError;
pub use fault::{FaultCode, SoapFault};
pub use interface::{WsCall, WsInterface};
pub use schema::{DataType, MaxOccurs, SchemaNode};
