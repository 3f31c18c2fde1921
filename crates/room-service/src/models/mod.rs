//! Room service models.
//!
//! Domain entities (rooms, voice calls, messages) and the request/response
//! bodies of the HTTP API. JSON bodies use camelCase field names.

use chrono::{DateTime, Duration, Utc};
use common::types::{MessageId, RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Default room capacity.
pub const DEFAULT_MAX_PARTICIPANTS: i32 = 2;

/// Smallest allowed room capacity.
pub const MIN_MAX_PARTICIPANTS: i32 = 2;

/// Largest allowed room capacity.
pub const MAX_MAX_PARTICIPANTS: i32 = 50;

/// Number of digits in a join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Maximum chat message length in characters (after trimming).
pub const MAX_MESSAGE_LENGTH: usize = 4000;

// ============================================================================
// Room
// ============================================================================

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting new participants.
    Active,

    /// Reached capacity.
    Locked,

    /// Past its expiry time, awaiting the sweeper.
    Expired,

    /// Retired; its join code may be reused.
    Archived,
}

impl RoomStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Locked => "locked",
            RoomStatus::Expired => "expired",
            RoomStatus::Archived => "archived",
        }
    }

    /// Parses the persisted representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RoomStatus::Active),
            "locked" => Some(RoomStatus::Locked),
            "expired" => Some(RoomStatus::Expired),
            "archived" => Some(RoomStatus::Archived),
            _ => None,
        }
    }
}

/// Supported room lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiresIn {
    TenMinutes,
    OneHour,
    OneDay,
}

impl ExpiresIn {
    /// Parses a lifetime label. Unrecognized labels mean "no expiry".
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "10m" => Some(ExpiresIn::TenMinutes),
            "1h" => Some(ExpiresIn::OneHour),
            "24h" => Some(ExpiresIn::OneDay),
            _ => None,
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            ExpiresIn::TenMinutes => Duration::minutes(10),
            ExpiresIn::OneHour => Duration::hours(1),
            ExpiresIn::OneDay => Duration::hours(24),
        }
    }
}

/// A participant's state within a voice call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    pub user: UserId,
    pub is_muted: bool,
    pub mic_access: bool,
}

/// Voice call sub-state embedded in a room.
///
/// When `is_active` is false, `host` is `None` and `participants` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCallState {
    pub is_active: bool,
    pub host: Option<UserId>,
    pub participants: Vec<CallParticipant>,
}

impl VoiceCallState {
    /// Start a call hosted by `host` with every member muted.
    ///
    /// Only the host gets mic access.
    pub fn started(host: UserId, members: &[UserId]) -> Self {
        let participants = members
            .iter()
            .map(|&user| CallParticipant {
                user,
                is_muted: true,
                mic_access: user == host,
            })
            .collect();

        Self {
            is_active: true,
            host: Some(host),
            participants,
        }
    }

    pub fn participant(&self, user: UserId) -> Option<&CallParticipant> {
        self.participants.iter().find(|p| p.user == user)
    }

    pub fn participant_mut(&mut self, user: UserId) -> Option<&mut CallParticipant> {
        self.participants.iter_mut().find(|p| p.user == user)
    }

    /// Add a late joiner to an active call (muted, no mic access).
    fn admit(&mut self, user: UserId) {
        if self.is_active && self.participant(user).is_none() {
            self.participants.push(CallParticipant {
                user,
                is_muted: true,
                mic_access: false,
            });
        }
    }
}

/// A chat room as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,

    /// Six-digit code shared with invitees.
    pub join_code: String,

    pub creator: UserId,

    /// Members in join order. The creator is always first.
    pub participants: Vec<UserId>,

    pub status: RoomStatus,

    /// Manual lock set by the creator.
    pub is_locked: bool,

    pub max_participants: i32,

    pub expires_at: Option<DateTime<Utc>>,

    pub voice_call: VoiceCallState,

    /// Incremented on every successful conditional write.
    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// A fresh room whose only participant is its creator.
    pub fn new(
        creator: UserId,
        join_code: String,
        max_participants: i32,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RoomId::new(),
            join_code,
            creator,
            participants: vec![creator],
            status: RoomStatus::Active,
            is_locked: false,
            max_participants,
            expires_at,
            voice_call: VoiceCallState::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Status as observed at `now`: a room past its expiry reads as expired
    /// even before the sweeper removes it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RoomStatus {
        if self.status != RoomStatus::Archived && self.is_expired_at(now) {
            RoomStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity()
    }

    /// Whether a user who is not yet a member could be admitted at `now`.
    pub fn accepts_new_participant(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == RoomStatus::Active && !self.is_locked && !self.is_full()
    }

    /// The room with `user` appended.
    ///
    /// Reaching capacity moves the room to `locked`. An active voice call
    /// admits the new member muted and without mic access.
    pub fn with_participant(&self, user: UserId) -> Room {
        let mut next = self.clone();
        next.participants.push(user);
        if next.is_full() {
            next.status = RoomStatus::Locked;
        }
        next.voice_call.admit(user);
        next
    }

    /// First participant other than `user`.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        self.participants.iter().copied().find(|&p| p != user)
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.max_participants).unwrap_or(0)
    }
}

// ============================================================================
// Messages and users
// ============================================================================

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user, resolved from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserSummary {
    /// Summary with only the id, for users missing from the directory.
    pub fn anonymous(id: UserId) -> Self {
        Self {
            id,
            username: None,
            display_name: None,
        }
    }
}

/// A room together with its most recent message, for history listings.
#[derive(Debug, Clone)]
pub struct RoomActivity {
    pub room: Room,
    pub last_message: Option<Message>,
}

impl RoomActivity {
    /// Latest of the last message time and the last room update.
    pub fn last_activity(&self) -> DateTime<Utc> {
        match &self.last_message {
            Some(message) if message.created_at > self.room.updated_at => message.created_at,
            _ => self.room.updated_at,
        }
    }
}

// ============================================================================
// HTTP API bodies
// ============================================================================

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Generic error message, no infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/v1/rooms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub max_participants: Option<i32>,

    #[serde(default)]
    pub expires_in: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub join_code: String,
    pub room_id: RoomId,
}

/// Body of `POST /api/v1/rooms/join`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub join_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room_id: RoomId,
    pub already_member: bool,
    pub message: String,
}

/// Room details with participants resolved to profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailsResponse {
    pub room_id: RoomId,
    pub join_code: String,
    pub creator: UserSummary,
    pub participants: Vec<UserSummary>,
    pub status: RoomStatus,
    pub is_locked: bool,
    pub max_participants: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub voice_call: VoiceCallState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStateResponse {
    pub room_id: RoomId,
    pub is_locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateResponse {
    pub room_id: RoomId,
    pub voice_call: VoiceCallState,
}

/// One entry of the caller's chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistoryEntry {
    pub room_id: RoomId,
    pub join_code: String,
    pub status: RoomStatus,
    pub is_locked: bool,
    pub last_activity: DateTime<Utc>,
    pub last_message: Option<Message>,
    pub other_participant: Option<UserSummary>,
}
