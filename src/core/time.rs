use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Compact `YYYYmmdd_HHMMSS` stamp used in batch folder names.
pub(crate) fn batch_stamp(value: PrimitiveDateTime) -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    value.format(&format).unwrap_or_else(|_| value.assume_utc().unix_timestamp().to_string())
}
