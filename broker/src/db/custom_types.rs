use crate::db::enums::EstimatedCategory;
use crate::db::enums::OutboxStatus;
use crate::db::enums::RegionBucket;
use crate::db::enums::Status;
use crate::schema::sql_types::EstimatedCategoryType;
use crate::schema::sql_types::LeadStatusType;
use crate::schema::sql_types::OutboxStatusType;
use crate::schema::sql_types::RegionBucketType;
use diesel::deserialize;
use diesel::deserialize::FromSql;
use diesel::pg::Pg;
use diesel::pg::PgValue;
use diesel::serialize;
use diesel::serialize::IsNull;
use diesel::serialize::Output;
use diesel::serialize::ToSql;
use std::io::Write;

impl ToSql<LeadStatusType, Pg> for Status {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<LeadStatusType, Pg> for Status {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"NEW" => Ok(Status::New),
            b"QUALIFYING" => Ok(Status::Qualifying),
            b"PENDING_APPROVAL" => Ok(Status::PendingApproval),
            b"AWAITING_DEPOSIT" => Ok(Status::AwaitingDeposit),
            b"DEPOSIT_PAID" => Ok(Status::DepositPaid),
            b"BOOKING_PENDING" => Ok(Status::BookingPending),
            b"BOOKED" => Ok(Status::Booked),
            b"REJECTED" => Ok(Status::Rejected),
            b"NEEDS_ARTIST_REPLY" => Ok(Status::NeedsArtistReply),
            b"NEEDS_FOLLOW_UP" => Ok(Status::NeedsFollowUp),
            b"TOUR_CONVERSION_OFFERED" => Ok(Status::TourConversionOffered),
            b"WAITLISTED" => Ok(Status::Waitlisted),
            b"COLLECTING_TIME_WINDOWS" => Ok(Status::CollectingTimeWindows),
            b"DEPOSIT_EXPIRED" => Ok(Status::DepositExpired),
            b"ABANDONED" => Ok(Status::Abandoned),
            b"STALE" => Ok(Status::Stale),
            b"OPTOUT" => Ok(Status::Optout),
            b"NEEDS_MANUAL_FOLLOW_UP" => Ok(Status::NeedsManualFollowUp),
            b"BOOKING_LINK_SENT" => Ok(Status::BookingLinkSent),
            other => Err(format!(
                "Unrecognized lead_status variant: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

impl ToSql<EstimatedCategoryType, Pg> for EstimatedCategory {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            EstimatedCategory::Small => out.write_all(b"SMALL")?,
            EstimatedCategory::Medium => out.write_all(b"MEDIUM")?,
            EstimatedCategory::Large => out.write_all(b"LARGE")?,
            EstimatedCategory::Xl => out.write_all(b"XL")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<EstimatedCategoryType, Pg> for EstimatedCategory {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"SMALL" => Ok(EstimatedCategory::Small),
            b"MEDIUM" => Ok(EstimatedCategory::Medium),
            b"LARGE" => Ok(EstimatedCategory::Large),
            b"XL" => Ok(EstimatedCategory::Xl),
            _ => Err("Unrecognized enum variant for estimated_category".into()),
        }
    }
}

impl ToSql<RegionBucketType, Pg> for RegionBucket {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            RegionBucket::Uk => out.write_all(b"UK")?,
            RegionBucket::Europe => out.write_all(b"EUROPE")?,
            RegionBucket::Row => out.write_all(b"ROW")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<RegionBucketType, Pg> for RegionBucket {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"UK" => Ok(RegionBucket::Uk),
            b"EUROPE" => Ok(RegionBucket::Europe),
            b"ROW" => Ok(RegionBucket::Row),
            _ => Err("Unrecognized enum variant for region_bucket".into()),
        }
    }
}

impl ToSql<OutboxStatusType, Pg> for OutboxStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            OutboxStatus::Pending => out.write_all(b"PENDING")?,
            OutboxStatus::Sent => out.write_all(b"SENT")?,
            OutboxStatus::Failed => out.write_all(b"FAILED")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<OutboxStatusType, Pg> for OutboxStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"PENDING" => Ok(OutboxStatus::Pending),
            b"SENT" => Ok(OutboxStatus::Sent),
            b"FAILED" => Ok(OutboxStatus::Failed),
            _ => Err("Unrecognized enum variant for outbox_status".into()),
        }
    }
}
