use crate::domain::priority::Priority;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A provider-neutral notification, translated by each adapter into its own
/// wire format. Unset fields are omitted from every provider payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationDescriptor {
    pub title: Option<String>,
    pub title_localization_key: Option<String>,
    pub title_localization_args: Vec<String>,
    pub body: Option<String>,
    pub body_localization_key: Option<String>,
    pub body_localization_args: Vec<String>,
    pub image_url: Option<String>,
    /// Android notification channel.
    pub channel_id: Option<String>,
    pub sound: Option<String>,
    /// Android small icon resource.
    pub icon: Option<String>,
    /// Collapse id on APNS and Android, thread id on iOS through FCM.
    pub collapse_key: Option<String>,
    pub priority: Priority,
    pub data: BTreeMap<String, String>,
}

impl NotificationDescriptor {
    /// Validates the descriptor before dispatch.
    ///
    /// # Errors
    /// Returns an error if an optional field is set to an empty string.
    pub fn validate(&self) -> Result<(), String> {
        let optional = [
            ("title", &self.title),
            ("titleLocalizationKey", &self.title_localization_key),
            ("body", &self.body),
            ("bodyLocalizationKey", &self.body_localization_key),
            ("imageUrl", &self.image_url),
            ("channelId", &self.channel_id),
            ("sound", &self.sound),
            ("icon", &self.icon),
            ("collapseKey", &self.collapse_key),
        ];
        if let Some((name, _)) = optional.iter().find(|(_, v)| v.as_deref().is_some_and(str::is_empty)) {
            return Err(format!("{name} must not be empty when present"));
        }
        Ok(())
    }
}
