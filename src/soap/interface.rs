//! Service interface: a namespace, a name and its calls.

use crate::soap::{SchemaNode, SoapError};

/// One named request/response operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsCall {
    pub name: String,
    pub request: SchemaNode,
    pub response: SchemaNode,
}

/// A SOAP service description.
///
/// `host` is the target namespace URI and the service address.
#[derive(Debug, Clone, Default)]
pub struct WsInterface {
    pub host: String,
    pub name: String,
    pub description: String,
    calls: Vec<WsCall>,
}

impl WsInterface {
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            description: String::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a call. Names must be unique and both schemas valid.
    pub fn add_call(
        &mut self,
        name: &str,
        request: SchemaNode,
        response: SchemaNode,
    ) -> Result<&mut Self, SoapError> {
        if name.trim().is_empty() {
            return Err(SoapError::BlankCallName);
        }
        if self.call(name).is_some() {
            return Err(SoapError::DuplicateCall(name.to_string()));
        }
        request.validate()?;
        response.validate()?;

        tracing::debug!(interface = %self.name, call = %name, "SOAP call registered");
        self.calls.push(WsCall {
            name: name.to_string(),
            request,
            response,
        });
        Ok(self)
    }

    /// Calls in registration order.
    pub fn calls(&self) -> &[WsCall] {
        &self.calls
    }

    pub fn call(&self, name: &str) -> Option<&WsCall> {
        self.calls.iter().find(|c| c.name == name)
    }

    /// Look up a call for marshalling, rejecting blank and unknown names.
    pub(crate) fn resolve(&self, name: &str) -> Result<&WsCall, SoapError> {
        if name.trim().is_empty() {
            return Err(SoapError::BlankCallName);
        }
        self.call(name)
            .ok_or_else(|| SoapError::CallNotFound(name.to_string()))
    }
}
