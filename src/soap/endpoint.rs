//! HTTP endpoint serving a [`WsInterface`].
//!
//! # Data Flow
//! ```text
//! GET/HEAD/...  → WSDL document
//! POST envelope → dispatch_request → SoapService::invoke → create_response
//!                  (any failure)   → SOAP fault, HTTP 500
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use crate::http::{HttpError, HttpHandler, HttpServerRequest, HttpServerResponse};
use crate::observability::metrics;
use crate::soap::{SoapFault, WsInterface};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Application logic behind a SOAP interface.
pub trait SoapService: Send + Sync + 'static {
    /// Run `call` on a parsed request tree and return the response tree.
    fn invoke(&self, call: &str, request: Value) -> impl Future<Output = Result<Value, SoapFault>> + Send;
}

/// Serves the WSDL and dispatches envelopes to a [`SoapService`].
pub struct SoapEndpoint<S> {
    interface: Arc<WsInterface>,
    service: S,
}

impl<S: SoapService> SoapEndpoint<S> {
    pub fn new(interface: WsInterface, service: S) -> Self {
        Self {
            interface: Arc::new(interface),
            service,
        }
    }

    pub fn interface(&self) -> &WsInterface {
        &self.interface
    }

    /// Body and HTTP status for one POSTed envelope.
    pub async fn process(&self, envelope: &str) -> (u16, String) {
        match self.invoke(envelope).await {
            Ok(xml) => (200, xml),
            Err(fault) => {
                tracing::warn!(interface = %self.interface.name, fault = %fault, "SOAP fault");
                metrics::record_soap_fault(fault.code.as_str());
                match fault.to_xml() {
                    Ok(xml) => (500, xml),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to render SOAP fault");
                        (500, String::new())
                    }
                }
            }
        }
    }

    async fn invoke(&self, envelope: &str) -> Result<String, SoapFault> {
        let (call, request) = self.interface.dispatch_request(envelope)?;
        tracing::debug!(interface = %self.interface.name, call = %call.name, "SOAP call");
        let response = self.service.invoke(&call.name, request).await?;
        // The service produced a tree that does not fit its own schema.
        self.interface
            .create_response(&call.name, &response)
            .map_err(|e| SoapFault::server(e.to_string()))
    }
}

impl<S: SoapService> HttpHandler for SoapEndpoint<S> {
    async fn handle(&self, req: &mut HttpServerRequest, res: &mut HttpServerResponse) -> Result<(), HttpError> {
        res.set_header("content-type", XML_CONTENT_TYPE)?;

        if req.method() != Method::POST {
            let wsdl = self
                .interface
                .to_wsdl()
                .map_err(|e| HttpError::Upstream(e.to_string()))?;
            res.print(wsdl)?;
            return Ok(());
        }

        if let Some(action) = req.header("soapaction") {
            tracing::debug!(soap_action = %action, "SOAPAction header");
        }
        let envelope = req.get_content().await?;
        let (status, body) = self.process(&envelope).await;
        res.set_status(status)?;
        res.print(body)?;
        Ok(())
    }
}
