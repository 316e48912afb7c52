use crate::core::error::{QrRejection, ValidationError};
use reqwest::Url;
use std::fmt;

/// Path fragment every attendance QR URL carries
const QR_PATH_MARKER: &str = "attendance/qr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    CheckIn,
    CheckOut,
}

impl CheckType {
    /// Value of the `type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::CheckIn => "check-in",
            CheckType::CheckOut => "check-out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "check-in" => Some(CheckType::CheckIn),
            "check-out" => Some(CheckType::CheckOut),
            _ => None,
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scanned payload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub token: String,
    pub check_type: CheckType,
}

impl QrPayload {
    /// Validate the decoded text of an attendance QR code
    ///
    /// The payload must be a URL mentioning `attendance/qr` with a non-empty
    /// `token` and a `type` of `check-in` or `check-out`.
    pub fn parse(data: &str) -> Result<Self, ValidationError> {
        Self::parse_inner(data.trim()).map_err(ValidationError::InvalidQr)
    }

    fn parse_inner(data: &str) -> Result<Self, QrRejection> {
        let url = Url::parse(data).map_err(|_| QrRejection::NotAUrl)?;

        if !url.as_str().contains(QR_PATH_MARKER) {
            return Err(QrRejection::WrongPath);
        }

        let mut token = None;
        let mut check_type = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "token" if token.is_none() => token = Some(value.into_owned()),
                "type" if check_type.is_none() => check_type = Some(value.into_owned()),
                _ => {}
            }
        }

        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(QrRejection::MissingParameter("token"))?;
        let raw_type = check_type.ok_or(QrRejection::MissingParameter("type"))?;
        let check_type =
            CheckType::parse(&raw_type).ok_or(QrRejection::UnknownCheckType(raw_type))?;

        Ok(Self { token, check_type })
    }
}
