use serde::{Deserialize, Serialize};

/// Provider-neutral notification priority. Mapped per provider at send time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Min,
    Low,
    #[default]
    Default,
    High,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndroidPriority {
    Min,
    Low,
    Default,
    High,
    Max,
}

impl AndroidPriority {
    /// Value of `android.notification.notification_priority` in FCM v1.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "PRIORITY_MIN",
            Self::Low => "PRIORITY_LOW",
            Self::Default => "PRIORITY_DEFAULT",
            Self::High => "PRIORITY_HIGH",
            Self::Max => "PRIORITY_MAX",
        }
    }
}

/// APNS only knows two delivery tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnsPriority {
    PowerConsideration,
    Immediate,
}

impl ApnsPriority {
    /// Value of the `apns-priority` request header.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::PowerConsideration => "5",
            Self::Immediate => "10",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebPushUrgency {
    VeryLow,
    Low,
    Normal,
    High,
}

impl WebPushUrgency {
    /// Value of the `Urgency` request header (RFC 8030).
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

// One row per abstract priority, in declaration order.
const ANDROID_TABLE: [AndroidPriority; 5] = [
    AndroidPriority::Min,
    AndroidPriority::Low,
    AndroidPriority::Default,
    AndroidPriority::High,
    AndroidPriority::Max,
];

const APNS_TABLE: [ApnsPriority; 5] = [
    ApnsPriority::PowerConsideration,
    ApnsPriority::PowerConsideration,
    ApnsPriority::Immediate,
    ApnsPriority::Immediate,
    ApnsPriority::Immediate,
];

const WEB_PUSH_TABLE: [WebPushUrgency; 5] = [
    WebPushUrgency::VeryLow,
    WebPushUrgency::Low,
    WebPushUrgency::Normal,
    WebPushUrgency::High,
    WebPushUrgency::High,
];

impl Priority {
    const fn index(self) -> usize {
        match self {
            Self::Min => 0,
            Self::Low => 1,
            Self::Default => 2,
            Self::High => 3,
            Self::Max => 4,
        }
    }

    #[must_use]
    pub const fn to_android(self) -> AndroidPriority {
        ANDROID_TABLE[self.index()]
    }

    #[must_use]
    pub const fn to_apns(self) -> ApnsPriority {
        APNS_TABLE[self.index()]
    }

    #[must_use]
    pub const fn to_web_push(self) -> WebPushUrgency {
        WEB_PUSH_TABLE[self.index()]
    }
}
