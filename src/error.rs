use std::fmt;

#[derive(Debug)]
pub enum CardPressError {
    EmptySelection,
    TargetNotMounted,
    TargetBusy,
    Encode(String),
    Asset(String),
    Compose(String),
    Archive(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for CardPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardPressError::EmptySelection => {
                write!(f, "no records selected; select at least one student")
            }
            CardPressError::TargetNotMounted => {
                write!(f, "capture attempted without a mounted card document")
            }
            CardPressError::TargetBusy => {
                write!(f, "render target already holds a mounted document")
            }
            CardPressError::Encode(message) => write!(f, "payload encode error: {}", message),
            CardPressError::Asset(message) => write!(f, "asset error: {}", message),
            CardPressError::Compose(message) => write!(f, "pdf compose error: {}", message),
            CardPressError::Archive(message) => write!(f, "archive error: {}", message),
            CardPressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            CardPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CardPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CardPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CardPressError {
    fn from(value: std::io::Error) -> Self {
        CardPressError::Io(value)
    }
}

impl From<serde_json::Error> for CardPressError {
    fn from(value: serde_json::Error) -> Self {
        CardPressError::Encode(value.to_string())
    }
}

impl From<zip::result::ZipError> for CardPressError {
    fn from(value: zip::result::ZipError) -> Self {
        CardPressError::Archive(value.to_string())
    }
}
