use crate::schema::attachments;
use diesel::prelude::*;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = attachments)]
pub struct Attachment {
    pub id: i32,
    pub lead_id: i32,
    pub wa_media_id: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub lead_id: i32,
    pub wa_media_id: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
}

impl Attachment {
    pub fn insert(conn: &mut PgConnection, new_attachment: NewAttachment) -> QueryResult<Attachment> {
        diesel::insert_into(attachments::table)
            .values(&new_attachment)
            .get_result(conn)
    }

    pub fn for_lead(conn: &mut PgConnection, lead_id: i32) -> QueryResult<Vec<Attachment>> {
        attachments::table
            .filter(attachments::lead_id.eq(lead_id))
            .order(attachments::created_at.asc())
            .load(conn)
    }
}
