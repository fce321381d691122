//! ISO-8601 timestamps as accepted on event descriptions: UTC with a literal `Z`,
//! with or without milliseconds.
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::BuildError;

const WITH_MILLIS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

const WITHOUT_MILLIS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Parse a timestamp, first with milliseconds and then without them.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime, BuildError> {
    PrimitiveDateTime::parse(input, WITH_MILLIS)
        .or_else(|_| PrimitiveDateTime::parse(input, WITHOUT_MILLIS))
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| BuildError::TimestampParseError(input.to_owned()))
}

pub fn format_with_millis(timestamp: OffsetDateTime) -> String {
    format_utc(timestamp, WITH_MILLIS)
}

#[cfg(test)]
fn format_without_millis(timestamp: OffsetDateTime) -> String {
    format_utc(timestamp, WITHOUT_MILLIS)
}

fn format_utc(timestamp: OffsetDateTime, format: &[FormatItem<'_>]) -> String {
    timestamp
        .to_offset(time::UtcOffset::UTC)
        .format(format)
        .expect("failed to format timestamp with a static description")
}
