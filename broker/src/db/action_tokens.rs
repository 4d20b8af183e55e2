use crate::db::enums::Status;
use crate::schema::action_tokens;
use diesel::prelude::*;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = action_tokens)]
pub struct ActionToken {
    pub id: i32,
    pub token: String,
    pub lead_id: i32,
    pub action_type: String,
    pub required_status: Status,
    pub expires_at: OffsetDateTime,
    pub used: bool,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = action_tokens)]
pub struct NewActionToken {
    pub token: String,
    pub lead_id: i32,
    pub action_type: String,
    pub required_status: Status,
    pub expires_at: OffsetDateTime,
}

impl ActionToken {
    pub fn insert(conn: &mut PgConnection, new_token: NewActionToken) -> QueryResult<ActionToken> {
        diesel::insert_into(action_tokens::table)
            .values(&new_token)
            .get_result(conn)
    }

    pub fn find_by_token(conn: &mut PgConnection, token: &str) -> QueryResult<Option<ActionToken>> {
        action_tokens::table
            .filter(action_tokens::token.eq(token))
            .first(conn)
            .optional()
    }

    /// Single-use enforcement per §6: `UPDATE ... SET used=true WHERE token=? AND used=false`.
    pub fn try_consume(conn: &mut PgConnection, token: &str, now: OffsetDateTime) -> QueryResult<bool> {
        let affected = diesel::update(action_tokens::table)
            .filter(action_tokens::token.eq(token))
            .filter(action_tokens::used.eq(false))
            .set((
                action_tokens::used.eq(true),
                action_tokens::used_at.eq(now),
            ))
            .execute(conn)?;
        Ok(affected == 1)
    }
}
