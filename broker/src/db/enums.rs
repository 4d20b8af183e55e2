use crate::schema::sql_types::EstimatedCategoryType;
use crate::schema::sql_types::LeadStatusType;
use crate::schema::sql_types::OutboxStatusType;
use crate::schema::sql_types::RegionBucketType;
use diesel::query_builder::QueryId;
use diesel::AsExpression;
use diesel::FromSqlRow;
use serde::Deserialize;
use serde::Serialize;
use std::any::TypeId;

/// The lead's position in the finite state machine. See `crate::domain::status` for the
/// legal-transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromSqlRow, AsExpression, Serialize, Deserialize)]
#[diesel(sql_type = LeadStatusType)]
pub enum Status {
    New,
    Qualifying,
    PendingApproval,
    AwaitingDeposit,
    DepositPaid,
    BookingPending,
    Booked,
    Rejected,
    NeedsArtistReply,
    NeedsFollowUp,
    TourConversionOffered,
    Waitlisted,
    CollectingTimeWindows,
    DepositExpired,
    Abandoned,
    Stale,
    Optout,
    NeedsManualFollowUp,
    /// Entered via the admin "send booking link" action; see `DESIGN.md` open question (b).
    BookingLinkSent,
}

impl QueryId for LeadStatusType {
    type QueryId = LeadStatusType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Booked | Status::Rejected | Status::Waitlisted | Status::Optout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::Qualifying => "QUALIFYING",
            Status::PendingApproval => "PENDING_APPROVAL",
            Status::AwaitingDeposit => "AWAITING_DEPOSIT",
            Status::DepositPaid => "DEPOSIT_PAID",
            Status::BookingPending => "BOOKING_PENDING",
            Status::Booked => "BOOKED",
            Status::Rejected => "REJECTED",
            Status::NeedsArtistReply => "NEEDS_ARTIST_REPLY",
            Status::NeedsFollowUp => "NEEDS_FOLLOW_UP",
            Status::TourConversionOffered => "TOUR_CONVERSION_OFFERED",
            Status::Waitlisted => "WAITLISTED",
            Status::CollectingTimeWindows => "COLLECTING_TIME_WINDOWS",
            Status::DepositExpired => "DEPOSIT_EXPIRED",
            Status::Abandoned => "ABANDONED",
            Status::Stale => "STALE",
            Status::Optout => "OPTOUT",
            Status::NeedsManualFollowUp => "NEEDS_MANUAL_FOLLOW_UP",
            Status::BookingLinkSent => "BOOKING_LINK_SENT",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression, Serialize, Deserialize)]
#[diesel(sql_type = EstimatedCategoryType)]
pub enum EstimatedCategory {
    Small,
    Medium,
    Large,
    Xl,
}

impl QueryId for EstimatedCategoryType {
    type QueryId = EstimatedCategoryType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression, Serialize, Deserialize)]
#[diesel(sql_type = RegionBucketType)]
pub enum RegionBucket {
    Uk,
    Europe,
    Row,
}

impl QueryId for RegionBucketType {
    type QueryId = RegionBucketType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression, Serialize, Deserialize)]
#[diesel(sql_type = OutboxStatusType)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl QueryId for OutboxStatusType {
    type QueryId = OutboxStatusType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}
