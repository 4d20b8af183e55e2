use crate::schema::processed_events;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = processed_events)]
pub struct ProcessedEvent {
    pub id: i32,
    pub provider: String,
    pub external_id: String,
    pub event_type: String,
    pub lead_id: Option<i32>,
    pub processed_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = processed_events)]
pub struct NewProcessedEvent {
    pub provider: String,
    pub external_id: String,
    pub event_type: String,
    pub lead_id: Option<i32>,
}

impl ProcessedEvent {
    pub fn find(
        conn: &mut PgConnection,
        provider: &str,
        external_id: &str,
    ) -> QueryResult<Option<ProcessedEvent>> {
        processed_events::table
            .filter(processed_events::provider.eq(provider))
            .filter(processed_events::external_id.eq(external_id))
            .first(conn)
            .optional()
    }

    /// Atomic insert; unique-key conflicts on `(provider, external_id)` are classified as a
    /// duplicate rather than an error. Any other integrity error is re-raised per §4.2.
    pub fn try_record(
        conn: &mut PgConnection,
        new_event: NewProcessedEvent,
    ) -> QueryResult<RecordOutcome> {
        match diesel::insert_into(processed_events::table)
            .values(&new_event)
            .get_result::<ProcessedEvent>(conn)
        {
            Ok(record) => Ok(RecordOutcome::Inserted(record)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                let is_our_constraint = info
                    .constraint_name()
                    .map(|name| name.contains("processed_events"))
                    .unwrap_or(true);
                if !is_our_constraint {
                    return Err(DieselError::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        info,
                    ));
                }
                let existing = Self::find(conn, &new_event.provider, &new_event.external_id)?
                    .expect("conflicting row to exist after unique violation");
                Ok(RecordOutcome::Duplicate(existing))
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Inserted(ProcessedEvent),
    Duplicate(ProcessedEvent),
}

impl RecordOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::Duplicate(_))
    }

    pub fn record(&self) -> &ProcessedEvent {
        match self {
            RecordOutcome::Inserted(r) | RecordOutcome::Duplicate(r) => r,
        }
    }
}
