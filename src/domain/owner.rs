use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// An identifier for the owner of push tokens.
///
/// Implemented for numeric (`i64`), UUID and opaque string ids. The service is
/// instantiated for exactly one of them at startup.
pub trait OwnerId:
    Clone + Eq + Hash + Debug + Display + FromStr + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Short name of the representation, used for table selection and logs.
    const KIND: &'static str;
}

impl OwnerId for i64 {
    const KIND: &'static str = "long";
}

impl OwnerId for Uuid {
    const KIND: &'static str = "uuid";
}

impl OwnerId for String {
    const KIND: &'static str = "text";
}
