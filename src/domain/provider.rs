use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A delivery network a push token belongs to.
///
/// The uppercase spelling (`APNS`, `FCM`, `WEBPUSH`) is used on the wire, in
/// configuration and as the storage discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Apns,
    Fcm,
    WebPush,
}

impl Provider {
    pub const ALL: [Self; 3] = [Self::Apns, Self::Fcm, Self::WebPush];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apns => "APNS",
            Self::Fcm => "FCM",
            Self::WebPush => "WEBPUSH",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown push provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APNS" => Ok(Self::Apns),
            "FCM" => Ok(Self::Fcm),
            "WEBPUSH" => Ok(Self::WebPush),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}
