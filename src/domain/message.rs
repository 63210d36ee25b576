use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted chat message. The id and timestamp are assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub username: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl Message {
    /// Stamps a submitted message with a fresh time-ordered id and the current time.
    ///
    /// The time is cut to microseconds, the precision Postgres keeps, so the
    /// broadcast copy matches what a later history read returns.
    #[must_use]
    pub fn new(username: String, text: String) -> Self {
        let now = OffsetDateTime::now_utc();
        let time = now - time::Duration::nanoseconds(i64::from(now.nanosecond() % 1_000));
        Self { id: Uuid::now_v7(), username, text, time }
    }
}
