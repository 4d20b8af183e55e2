use crate::schema::lead_answers;
use diesel::prelude::*;
use std::collections::HashMap;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = lead_answers)]
pub struct LeadAnswer {
    pub id: i32,
    pub lead_id: i32,
    pub question_key: String,
    pub answer_text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = lead_answers)]
pub struct NewLeadAnswer {
    pub lead_id: i32,
    pub question_key: String,
    pub answer_text: String,
}

impl LeadAnswer {
    pub fn insert(conn: &mut PgConnection, new_answer: NewLeadAnswer) -> QueryResult<LeadAnswer> {
        diesel::insert_into(lead_answers::table)
            .values(&new_answer)
            .get_result(conn)
    }

    pub fn for_lead(conn: &mut PgConnection, lead_id: i32) -> QueryResult<Vec<LeadAnswer>> {
        lead_answers::table
            .filter(lead_answers::lead_id.eq(lead_id))
            .order((lead_answers::created_at.asc(), lead_answers::id.asc()))
            .load(conn)
    }

    pub fn count_for_question(
        conn: &mut PgConnection,
        lead_id: i32,
        question_key: &str,
    ) -> QueryResult<i64> {
        lead_answers::table
            .filter(lead_answers::lead_id.eq(lead_id))
            .filter(lead_answers::question_key.eq(question_key))
            .count()
            .get_result(conn)
    }

    /// "Latest-wins per key" extraction per §3: later `(created_at, id)` overwrites earlier.
    pub fn latest_by_key(answers: &[LeadAnswer]) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for answer in answers {
            out.insert(answer.question_key.clone(), answer.answer_text.clone());
        }
        out
    }
}
