//! SOAP 1.1 fault envelopes.

use std::fmt::{Display, Formatter};

use xmltree::Namespace;

use crate::soap::marshal::{ENVELOPE_PREFIX, SOAP_ENVELOPE_NS};
use crate::soap::xml::{child, element, text, to_document};
use crate::soap::SoapError;

/// Which side caused the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The request was malformed or did not match the schema.
    Client,
    /// The service failed while processing a valid request.
    Server,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::Client => "Client",
            FaultCode::Server => "Server",
        }
    }
}

/// A SOAP fault returned instead of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: FaultCode,
    pub string: String,
    pub detail: Option<String>,
}

impl SoapFault {
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Client,
            string: message.into(),
            detail: None,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Server,
            string: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Render as a `soapenv:Fault` envelope.
    pub fn to_xml(&self) -> Result<String, SoapError> {
        let env = Some(ENVELOPE_PREFIX);
        let mut namespaces = Namespace::empty();
        namespaces.put(ENVELOPE_PREFIX, SOAP_ENVELOPE_NS);

        let mut fault = child(
            child(
                element(env, "Fault"),
                text(
                    element(None, "faultcode"),
                    &format!("{ENVELOPE_PREFIX}:{}", self.code.as_str()),
                ),
            ),
            text(element(None, "faultstring"), &self.string),
        );
        if let Some(detail) = &self.detail {
            fault = child(fault, text(element(None, "detail"), detail));
        }

        let mut envelope = element(env, "Envelope");
        envelope.namespaces = Some(namespaces);
        let envelope = child(
            child(envelope, element(env, "Header")),
            child(element(env, "Body"), fault),
        );
        to_document(&envelope)
    }
}

impl Display for SoapFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.string)
    }
}

impl std::error::Error for SoapFault {}

/// Marshalling failures are the caller's fault.
impl From<SoapError> for SoapFault {
    fn from(err: SoapError) -> Self {
        SoapFault::client(err.to_string())
    }
}
