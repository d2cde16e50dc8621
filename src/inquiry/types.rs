use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Lifecycle of an inquiry. The only transitions are pending -> responded and
/// pending -> timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    Pending,
    Responded,
    #[serde(rename = "timeout")]
    TimedOut,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Pending => "pending",
            InquiryStatus::Responded => "responded",
            InquiryStatus::TimedOut => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InquiryStatus::Pending),
            "responded" => Some(InquiryStatus::Responded),
            "timeout" => Some(InquiryStatus::TimedOut),
            _ => None,
        }
    }
}

impl std::fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacContext {
    pub user: String,
    pub roles: Vec<String>,
}

/// Who created the inquiry and which roles they held at that moment.
/// Written once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryContext {
    /// Pack of the action that raised the inquiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    pub user: String,
    pub rbac: RbacContext,
}

impl InquiryContext {
    pub fn new(user: impl Into<String>, roles: BTreeSet<String>) -> Self {
        let user = user.into();
        Self {
            pack: None,
            rbac: RbacContext {
                user: user.clone(),
                roles: roles.into_iter().collect(),
            },
            user,
        }
    }

    /// Record the pack owning `action_ref` (`pack.action`).
    pub fn with_action_ref(mut self, action_ref: Option<&str>) -> Self {
        self.pack = action_ref
            .and_then(|r| r.split_once('.'))
            .map(|(pack, _)| pack)
            .filter(|pack| !pack.is_empty())
            .map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: String,
    /// Execution that paused on this inquiry
    pub liveaction: Option<String>,
    /// JSON schema the response is expected to satisfy
    pub schema: Value,
    /// Minutes before the inquiry times out
    pub ttl: i64,
    pub roles: BTreeSet<String>,
    pub users: BTreeSet<String>,
    pub tag: String,
    pub status: InquiryStatus,
    pub response: Option<Value>,
    pub context: InquiryContext,
    pub created_at: i64,
    pub responded_at: Option<i64>,
    pub responded_by: Option<String>,
}

impl Inquiry {
    pub fn from_new(
        id: String,
        new: NewInquiry,
        default_ttl: i64,
        context: InquiryContext,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            liveaction: new.liveaction,
            schema: new.schema,
            ttl: new.ttl.unwrap_or(default_ttl),
            roles: new.roles,
            users: new.users,
            tag: new.tag,
            status: InquiryStatus::Pending,
            response: None,
            context,
            created_at,
            responded_at: None,
            responded_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InquiryStatus::Pending
    }

    /// True when the instance carries a responder allow-list.
    pub fn is_restricted(&self) -> bool {
        !self.roles.is_empty() || !self.users.is_empty()
    }

    /// Unix timestamp after which a pending inquiry is due to time out.
    pub fn expires_at(&self) -> i64 {
        self.created_at.saturating_add(self.ttl.saturating_mul(60))
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at()
    }
}

/// Payload the workflow engine supplies when it pauses on an inquiry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewInquiry {
    #[serde(default)]
    pub liveaction: Option<String>,
    /// Action that raised the inquiry, e.g. `wolfpack.ask`
    #[serde(default)]
    pub action_ref: Option<String>,
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub tag: String,
    /// Minutes; the configured default applies when absent
    #[serde(default)]
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryFilter {
    pub status: Option<InquiryStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl InquiryFilter {
    pub fn matches(&self, inquiry: &Inquiry) -> bool {
        self.status.map_or(true, |s| s == inquiry.status)
    }
}

/// Terminal state written by a compare-and-set from pending.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Responded {
        response: Value,
        by: String,
        at: i64,
    },
    TimedOut,
}

impl Resolution {
    pub fn status(&self) -> InquiryStatus {
        match self {
            Resolution::Responded { .. } => InquiryStatus::Responded,
            Resolution::TimedOut => InquiryStatus::TimedOut,
        }
    }

    /// Apply to a pending inquiry in place.
    pub fn apply(self, inquiry: &mut Inquiry) {
        inquiry.status = self.status();
        if let Resolution::Responded { response, by, at } = self {
            inquiry.response = Some(response);
            inquiry.responded_by = Some(by);
            inquiry.responded_at = Some(at);
        }
    }
}

/// Outcome of a compare-and-set against an inquiry's status.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The inquiry was pending and now carries the resolution.
    Applied(Inquiry),
    /// Someone else resolved it first.
    Rejected(InquiryStatus),
    Missing,
}
