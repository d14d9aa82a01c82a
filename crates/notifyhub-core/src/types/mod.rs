//! Core type definitions used across the NotifyHub workspace.

pub mod id;

use serde::{Deserialize, Serialize};

pub use id::{CaseId, DeliveryId, EventId, NotificationId, OrderId};

/// The natural key tying notifications to a case: a producer-scoped label
/// plus the producer's own grouping identifier.
///
/// At most one live case exists per grouping; deletes remember the grouping
/// so late-arriving members stay invisible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grouping {
    /// Producer-scoped label ("merkelapp").
    pub tag: String,
    /// Producer-assigned grouping identifier.
    pub group_id: String,
}

impl Grouping {
    /// Create a grouping key.
    pub fn new(tag: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            group_id: group_id.into(),
        }
    }
}

impl std::fmt::Display for Grouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tag, self.group_id)
    }
}

/// Who a notification is addressed to.
///
/// Resolution happens at query time against the querying user's grants;
/// the event model only records the audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Recipient {
    /// Everyone holding a given service grant within a tenant.
    ServiceGrant {
        /// Tenant (organization) number.
        tenant_id: String,
        /// Service code of the required grant.
        service: String,
        /// Service edition of the required grant.
        edition: String,
    },
    /// A single named user within a tenant.
    Individual {
        /// Tenant (organization) number.
        tenant_id: String,
        /// The user's personal identifier.
        user_id: String,
    },
}

/// One entitlement held by a querying user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    /// Tenant (organization) number the grant applies to.
    pub tenant_id: String,
    /// Service code.
    pub service: String,
    /// Service edition.
    pub edition: String,
}

/// The full set of grants resolved for a querying user.
///
/// `degraded` is set when the entitlement source failed to answer for one
/// or more tenants; readers surface partial results together with the flag
/// instead of failing the whole query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    /// Service grants held by the user.
    pub grants: Vec<Grant>,
    /// Whether the grant resolution was incomplete.
    pub degraded: bool,
}

impl Grants {
    /// A complete, empty grant set.
    pub const EMPTY: Grants = Grants {
        grants: Vec::new(),
        degraded: false,
    };

    /// A grant set representing a failed entitlement lookup.
    pub fn failure() -> Self {
        Self {
            grants: Vec::new(),
            degraded: true,
        }
    }

    /// Merge two grant sets; degradation is sticky.
    pub fn merge(mut self, other: Grants) -> Self {
        self.grants.extend(other.grants);
        self.degraded = self.degraded || other.degraded;
        self
    }

    /// Whether the user may see content addressed to `recipient`.
    ///
    /// Individual recipients match on the querying user's own identifier.
    pub fn covers(&self, recipient: &Recipient, user_id: &str) -> bool {
        match recipient {
            Recipient::ServiceGrant {
                tenant_id,
                service,
                edition,
            } => self.grants.iter().any(|g| {
                g.tenant_id == *tenant_id && g.service == *service && g.edition == *edition
            }),
            Recipient::Individual {
                user_id: recipient_user,
                ..
            } => recipient_user == user_id,
        }
    }
}

/// An external-channel message requested alongside a notification or
/// reminder. The content is opaque to the core; only identity matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Identifier for the requested delivery, referenced by outcome events.
    pub delivery_id: DeliveryId,
    /// The channel-specific payload.
    pub channel: Channel,
}

/// Channel-specific delivery payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Channel {
    /// An SMS to a phone number.
    Sms {
        /// Destination phone number.
        phone: String,
        /// Message body.
        body: String,
    },
    /// An email to an address.
    Email {
        /// Destination address.
        address: String,
        /// Subject line.
        subject: String,
        /// Message body.
        body: String,
    },
}

/// Lifecycle state of a task as seen by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Open, awaiting action.
    New,
    /// Completed by the recipient.
    Completed,
    /// Deadline passed without completion.
    Expired,
}

/// Status of a case as reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    /// The case has been received.
    Received,
    /// The case is being worked on.
    InProgress,
    /// The case is concluded.
    Done,
}

impl CaseStatus {
    /// The text shown to users when the producer supplies no override.
    pub fn default_text(&self) -> &'static str {
        match self {
            Self::Received => "Mottatt",
            Self::InProgress => "Under behandling",
            Self::Done => "Ferdig",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_grant(tenant: &str) -> Recipient {
        Recipient::ServiceGrant {
            tenant_id: tenant.to_string(),
            service: "4936".to_string(),
            edition: "1".to_string(),
        }
    }

    #[test]
    fn test_grants_cover_matching_service() {
        let grants = Grants {
            grants: vec![Grant {
                tenant_id: "42".to_string(),
                service: "4936".to_string(),
                edition: "1".to_string(),
            }],
            degraded: false,
        };
        assert!(grants.covers(&service_grant("42"), "someone"));
        assert!(!grants.covers(&service_grant("43"), "someone"));
    }

    #[test]
    fn test_individual_recipient_matches_user_only() {
        let recipient = Recipient::Individual {
            tenant_id: "42".to_string(),
            user_id: "01017012345".to_string(),
        };
        let grants = Grants::EMPTY;
        assert!(grants.covers(&recipient, "01017012345"));
        assert!(!grants.covers(&recipient, "99999999999"));
    }

    #[test]
    fn test_merge_keeps_degraded_flag() {
        let merged = Grants::failure().merge(Grants {
            grants: vec![Grant {
                tenant_id: "1".to_string(),
                service: "s".to_string(),
                edition: "e".to_string(),
            }],
            degraded: false,
        });
        assert!(merged.degraded);
        assert_eq!(merged.grants.len(), 1);
    }
}
