use std::fmt;
use std::time::{Duration, SystemTime};

use log::error;

/// Seconds since the unix epoch, as stored in the database.
#[derive(Debug, Default, Clone, Copy, PartialOrd, Ord, PartialEq, Eq)]
#[derive(sqlx::Type)]
#[sqlx(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Result<Self, ()> {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| Self::default().after(duration))
            .map_err(|e| {
                error!("couldn't get time: {e:?}");
            })
    }

    pub fn after(self, duration: Duration) -> Self {
        let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};

        let formatted = OffsetDateTime::from_unix_timestamp(self.0)
            .ok()
            .and_then(|when| when.format(&Rfc3339).ok());

        match formatted {
            Some(s) => write!(fmt, "{s}"),
            None => write!(fmt, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn after() {
        let day = Duration::from_secs(24 * 60 * 60);
        let t = Timestamp::default().after(day);

        assert!(t > Timestamp::default());
        assert_eq!(t.to_string(), "1970-01-02T00:00:00Z");
        assert_eq!(t.after(Duration::MAX), Timestamp(i64::MAX));
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now().unwrap() > Timestamp::default());
    }
}
