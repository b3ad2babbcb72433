use serde::{Deserialize, Serialize};

use crate::temporal::{Classification, Interval, classify};

pub type EventId = String;
pub type ParticipantId = String;
pub type ResourceId = String;
pub type CategoryId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: EventId,

    pub title: String,

    #[serde(flatten)]
    pub interval: Interval,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub visibility: Visibility,

    pub owner: ParticipantId,

    #[serde(default)]
    pub resource: Option<ResourceId>,

    #[serde(default)]
    pub category: Option<CategoryId>,

    #[serde(default)]
    pub participants: Vec<ParticipantId>,
}

impl CalendarEvent {
    pub fn classification(&self) -> Classification {
        classify(&self.interval)
    }

    // Owner or listed participant
    pub fn involves(&self, participant: &str) -> bool {
        self.owner == participant || self.participants.iter().any(|p| p == participant)
    }

    pub fn is_hidden_from(&self, viewer: &str) -> bool {
        self.visibility == Visibility::Private && !self.involves(viewer)
    }

    pub fn from_write(id: EventId, owner: ParticipantId, write: &EventWrite) -> Self {
        Self {
            id,
            title: write.title.clone(),
            interval: write.interval,
            content: write.content.clone(),
            location: write.location.clone(),
            visibility: write.visibility,
            owner,
            resource: write.resource.clone(),
            category: write.category.clone(),
            participants: write.participants.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventWrite {
    pub title: String,
    #[serde(flatten)]
    pub interval: Interval,
    pub content: String,
    pub location: String,
    pub visibility: Visibility,
    pub resource: Option<ResourceId>,
    pub category: Option<CategoryId>,
    pub participants: Vec<ParticipantId>,
    pub all_day: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commitment {
    pub event_id: EventId,
    #[serde(flatten)]
    pub interval: Interval,
}

impl From<&CalendarEvent> for Commitment {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            interval: event.interval,
        }
    }
}
