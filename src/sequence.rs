use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;

use crate::schema::counters;

pub const ENTITY_USER: &str = "users";
pub const ENTITY_CLIENT: &str = "clients";
pub const ENTITY_DOCUMENT: &str = "documents";
pub const ENTITY_COMPANY_CODE: &str = "company_codes";
pub const ENTITY_LOG: &str = "logs";

/// Returns the next identifier for the given entity type from the shared
/// counter table. Ids are monotonically increasing per entity, independent
/// of the storage engine's own sequences.
pub fn next_id(conn: &mut PgConnection, entity: &str) -> Result<i64, DieselError> {
    diesel::insert_into(counters::table)
        .values((counters::entity.eq(entity), counters::value.eq(1_i64)))
        .on_conflict(counters::entity)
        .do_update()
        .set(counters::value.eq(counters::value + 1))
        .returning(counters::value)
        .get_result(conn)
}
