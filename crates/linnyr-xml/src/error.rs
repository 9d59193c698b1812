use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("required element <{0}> is missing")]
    MissingElement(&'static str),
    #[error("required attribute '{attribute}' is missing on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("attribute '{attribute}' on <{element}> is not a valid {expected}: '{value}'")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("<{element}> references unknown entity id '{id}'")]
    UnresolvedReference { element: &'static str, id: String },
    #[error("model rejected a parsed entity: {0}")]
    Model(String),
}
