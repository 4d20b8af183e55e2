pub mod action_tokens;
pub mod attachments;
pub mod custom_types;
pub mod enums;
pub mod lead_answers;
pub mod leads;
pub mod outbox_messages;
pub mod processed_events;
pub mod system_events;

use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn init_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().build(manager)?;
    Ok(pool)
}
