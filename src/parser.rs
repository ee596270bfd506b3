//! CSV batch normalizer for historical bike-share trip files.
//!
//! Two header layouts exist in the published data. Each batch is tagged
//! with its [`Schema`] once, its columns are resolved once, and every row
//! is then normalized into a [`TripRecord`] or dropped.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use csv::{ReaderBuilder, StringRecord};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Read;
use tracing::debug;

/// Trips must be strictly shorter than one day.
pub const MAX_DURATION_SECS: f64 = 86_400.0;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Header layout of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// `start_time`/`end_time`, `user_type`, `start_station_latitude`, optional
    /// `rideable_type` and a precomputed `duration_sec`.
    Legacy,
    /// `started_at`/`ended_at`, `member_casual`, `start_lat`/`start_lng`,
    /// `rideable_type`.
    Current,
}

impl Schema {
    pub fn detect(headers: &StringRecord) -> Self {
        if headers.iter().any(|h| h == "started_at") {
            Schema::Current
        } else {
            Schema::Legacy
        }
    }

    fn default_rideable_type(self) -> &'static str {
        match self {
            Schema::Legacy => "classic_bike",
            Schema::Current => "unknown",
        }
    }
}

/// Positions of the canonical fields within one batch's rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    pub start_time: Option<usize>,
    pub end_time: Option<usize>,
    pub start_lat: Option<usize>,
    pub start_lng: Option<usize>,
    pub start_station: Option<usize>,
    pub end_station: Option<usize>,
    pub rider: Option<usize>,
    pub rideable_type: Option<usize>,
    pub duration: Option<usize>,
}

impl Columns {
    pub fn resolve(schema: Schema, headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let (start_time, end_time, start_lat, start_lng, rider) = match schema {
            Schema::Current => ("started_at", "ended_at", "start_lat", "start_lng", "member_casual"),
            Schema::Legacy => (
                "start_time",
                "end_time",
                "start_station_latitude",
                "start_station_longitude",
                "user_type",
            ),
        };

        Columns {
            start_time: find(start_time),
            end_time: find(end_time),
            start_lat: find(start_lat),
            start_lng: find(start_lng),
            start_station: find("start_station_name"),
            end_station: find("end_station_name"),
            rider: find(rider),
            rideable_type: find("rideable_type"),
            duration: match schema {
                Schema::Legacy => find("duration_sec"),
                Schema::Current => None,
            },
        }
    }
}

/// Rider class, using the legacy vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderClass {
    Subscriber,
    Customer,
    Unknown,
}

impl RiderClass {
    fn from_member_casual(value: &str) -> Self {
        match value {
            "member" => RiderClass::Subscriber,
            "casual" => RiderClass::Customer,
            _ => RiderClass::Unknown,
        }
    }

    fn from_user_type(value: &str) -> Self {
        match value {
            "Subscriber" => RiderClass::Subscriber,
            "Customer" => RiderClass::Customer,
            _ => RiderClass::Unknown,
        }
    }
}

/// Calendar month bucket, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl From<&NaiveDateTime> for YearMonth {
    fn from(ts: &NaiveDateTime) -> Self {
        YearMonth {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One valid trip, with the derived grouping keys precomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub started_at: NaiveDateTime,
    pub duration_secs: f64,
    pub start_station: Option<String>,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_station: Option<String>,
    pub rider: RiderClass,
    pub rideable_type: String,
    pub year_month: YearMonth,
    pub hour: usize,
    /// Monday is 0.
    pub day_of_week: usize,
    pub year: i32,
}

impl TripRecord {
    pub fn is_subscriber(&self) -> bool {
        self.rider == RiderClass::Subscriber
    }

    pub fn is_customer(&self) -> bool {
        self.rider == RiderClass::Customer
    }
}

/// The valid records of one CSV stream.
#[derive(Debug)]
pub struct Batch {
    pub source: String,
    pub schema: Schema,
    pub records: Vec<TripRecord>,
    pub rows_read: usize,
}

impl Batch {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.records.len()
    }
}

/// Reads a whole CSV stream and normalizes every row.
///
/// # Errors
///
/// Returns an error if the stream is not readable as CSV (missing header,
/// invalid UTF-8, I/O failure) or has no start timestamp column. Invalid
/// individual rows are dropped, not reported.
pub fn parse_batch<R: Read>(source: &str, reader: R) -> Result<Batch> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: StringRecord = rdr
        .headers()
        .with_context(|| format!("{source}: unreadable header row"))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    if headers.iter().all(str::is_empty) {
        bail!("{source}: empty header row");
    }

    let schema = Schema::detect(&headers);
    let columns = Columns::resolve(schema, &headers);
    if columns.start_time.is_none() {
        bail!("{source}: no start timestamp column");
    }
    debug!(source, ?schema, "Detected batch schema");

    let mut records = Vec::new();
    let mut rows_read = 0;
    let mut row = StringRecord::new();
    while rdr
        .read_record(&mut row)
        .with_context(|| format!("{source}: malformed row after line {}", rows_read + 1))?
    {
        rows_read += 1;
        if let Some(trip) = normalize_row(schema, &columns, &row) {
            records.push(trip);
        }
    }

    Ok(Batch {
        source: source.to_string(),
        schema,
        records,
        rows_read,
    })
}

/// Normalizes one row, returning `None` when it must not be aggregated.
pub fn normalize_row(schema: Schema, columns: &Columns, row: &StringRecord) -> Option<TripRecord> {
    let started_at = field(row, columns.start_time).and_then(parse_timestamp)?;
    let start_lat = coordinate(row, columns.start_lat)?;
    let start_lng = coordinate(row, columns.start_lng)?;

    let duration_secs = match field(row, columns.end_time).and_then(parse_timestamp) {
        Some(end) => (end - started_at).num_milliseconds() as f64 / 1000.0,
        None => field(row, columns.duration)?.parse::<f64>().ok()?,
    };
    if !(duration_secs > 0.0 && duration_secs < MAX_DURATION_SECS) {
        return None;
    }

    let rider = field(row, columns.rider).map_or(RiderClass::Unknown, |value| match schema {
        Schema::Current => RiderClass::from_member_casual(value),
        Schema::Legacy => RiderClass::from_user_type(value),
    });
    let rideable_type = match columns.rideable_type {
        Some(_) => field(row, columns.rideable_type).unwrap_or("unknown"),
        None => schema.default_rideable_type(),
    };

    Some(TripRecord {
        year_month: YearMonth::from(&started_at),
        hour: started_at.hour() as usize,
        day_of_week: started_at.weekday().num_days_from_monday() as usize,
        year: started_at.year(),
        started_at,
        duration_secs,
        start_station: field(row, columns.start_station).map(str::to_string),
        start_lat,
        start_lng,
        end_station: field(row, columns.end_station).map(str::to_string),
        rider,
        rideable_type: rideable_type.to_string(),
    })
}

/// Parses the timestamp spellings found across the published files.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let raw = raw.strip_suffix(" UTC").unwrap_or(raw);

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z"))
                .ok()
                .map(|ts| ts.naive_local())
        })
}

fn field(row: &StringRecord, index: Option<usize>) -> Option<&str> {
    row.get(index?).map(str::trim).filter(|v| !v.is_empty())
}

fn coordinate(row: &StringRecord, index: Option<usize>) -> Option<f64> {
    field(row, index)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
