//! SOAP/WSDL error type.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoapError {
    #[error("call name must not be blank")]
    BlankCallName,

    #[error("call '{0}' not found")]
    CallNotFound(String),

    #[error("call '{0}' is already registered")]
    DuplicateCall(String),

    /// The envelope root declares no namespaces.
    #[error("malformed envelope: root element has no namespace declarations")]
    MissingAttributes,

    #[error("malformed envelope: no namespace declared for {0}")]
    MissingNamespace(String),

    #[error("malformed envelope: more than one namespace declared for {0}")]
    AmbiguousNamespace(String),

    #[error("malformed envelope: Body section not found")]
    BodyNotFound,

    #[error("element '{node}' expects {min}..{max} occurrences, found {found}")]
    Occurrence {
        node: String,
        min: u32,
        max: String,
        found: usize,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("element '{node}' value '{value}' is not a valid {expected}")]
    InvalidValue {
        node: String,
        value: String,
        expected: &'static str,
    },

    #[error("value for '{node}' must be {expected}")]
    TypeMismatch { node: String, expected: &'static str },

    #[error("XML error: {0}")]
    Xml(String),
}

impl From<xmltree::ParseError> for SoapError {
    fn from(err: xmltree::ParseError) -> Self {
        SoapError::Xml(err.to_string())
    }
}

impl From<xmltree::Error> for SoapError {
    fn from(err: xmltree::Error) -> Self {
        SoapError::Xml(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for SoapError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        SoapError::Xml(err.to_string())
    }
}
