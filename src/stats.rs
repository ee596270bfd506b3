//! Running aggregates folded incrementally across batches.
//!
//! [`TripStats`] holds one accumulator per grouping dimension. Folding and
//! merging only ever add, so a run may be split into shards over disjoint
//! batches and merged at the end without changing the result.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::parser::{Batch, TripRecord, YearMonth};

/// Trip count, exact duration sum and rider-class split for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TripTally {
    pub trips: u64,
    pub duration_sum: f64,
    pub subscribers: u64,
    pub customers: u64,
}

impl TripTally {
    pub fn add(&mut self, trip: &TripRecord) {
        self.trips += 1;
        self.duration_sum += trip.duration_secs;
        if trip.is_subscriber() {
            self.subscribers += 1;
        }
        if trip.is_customer() {
            self.customers += 1;
        }
    }

    pub fn merge(&mut self, other: &TripTally) {
        self.trips += other.trips;
        self.duration_sum += other.duration_sum;
        self.subscribers += other.subscribers;
        self.customers += other.customers;
    }
}

/// Count and exact duration sum, for keys that do not split by rider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationTally {
    pub trips: u64,
    pub duration_sum: f64,
}

impl DurationTally {
    pub fn add(&mut self, duration_secs: f64) {
        self.trips += 1;
        self.duration_sum += duration_secs;
    }

    pub fn merge(&mut self, other: &DurationTally) {
        self.trips += other.trips;
        self.duration_sum += other.duration_sum;
    }
}

/// Trips per bike family within a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BikeTypeCounts {
    pub classic: u64,
    pub electric: u64,
    pub docked: u64,
    pub other: u64,
}

impl BikeTypeCounts {
    pub fn add(&mut self, rideable_type: &str) {
        match rideable_type {
            "classic_bike" => self.classic += 1,
            "electric_bike" => self.electric += 1,
            "docked_bike" => self.docked += 1,
            _ => self.other += 1,
        }
    }

    pub fn merge(&mut self, other: &BikeTypeCounts) {
        self.classic += other.classic;
        self.electric += other.electric;
        self.docked += other.docked;
        self.other += other.other;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthTally {
    pub tally: TripTally,
    pub bikes: BikeTypeCounts,
}

/// Departures from one station, with coordinate sums for its centroid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationTally {
    pub tally: TripTally,
    pub lat_sum: f64,
    pub lng_sum: f64,
    pub coord_count: u64,
}

impl StationTally {
    pub fn merge(&mut self, other: &StationTally) {
        self.tally.merge(&other.tally);
        self.lat_sum += other.lat_sum;
        self.lng_sum += other.lng_sum;
        self.coord_count += other.coord_count;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearTally {
    pub tally: DurationTally,
    /// Origin and destination names seen that year.
    pub stations: HashSet<String>,
}

/// Every running aggregate of one run (or one shard of a run).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripStats {
    pub total_trips: u64,
    pub first_start: Option<NaiveDateTime>,
    pub last_start: Option<NaiveDateTime>,

    pub monthly: BTreeMap<YearMonth, MonthTally>,
    pub hourly: [TripTally; 24],
    pub dow: [TripTally; 7],
    pub departures: HashMap<String, StationTally>,
    pub arrivals: HashMap<String, u64>,
    pub routes: HashMap<(String, String), DurationTally>,
    pub station_monthly: HashMap<(String, YearMonth), u64>,
    pub yearly: BTreeMap<i32, YearTally>,
    pub bike_types: HashMap<String, DurationTally>,

    // bookkeeping, not part of the document
    pub batches_folded: usize,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

impl TripStats {
    /// Folds one normalized batch into every dimension. The batch is
    /// consumed so its rows are released as soon as folding finishes.
    pub fn fold(&mut self, batch: Batch) {
        self.batches_folded += 1;
        self.rows_read += batch.rows_read;
        self.rows_dropped += batch.rows_dropped();

        for trip in &batch.records {
            self.add(trip);
        }
    }

    fn add(&mut self, trip: &TripRecord) {
        self.total_trips += 1;
        self.first_start = Some(self.first_start.map_or(trip.started_at, |t| t.min(trip.started_at)));
        self.last_start = Some(self.last_start.map_or(trip.started_at, |t| t.max(trip.started_at)));

        let month = self.monthly.entry(trip.year_month).or_default();
        month.tally.add(trip);
        month.bikes.add(&trip.rideable_type);

        self.hourly[trip.hour].add(trip);
        self.dow[trip.day_of_week].add(trip);

        if let Some(start) = &trip.start_station {
            let station = self.departures.entry(start.clone()).or_default();
            station.tally.add(trip);
            station.lat_sum += trip.start_lat;
            station.lng_sum += trip.start_lng;
            station.coord_count += 1;

            *self
                .station_monthly
                .entry((start.clone(), trip.year_month))
                .or_insert(0) += 1;
        }

        if let Some(end) = &trip.end_station {
            *self.arrivals.entry(end.clone()).or_insert(0) += 1;
        }

        if let (Some(start), Some(end)) = (&trip.start_station, &trip.end_station) {
            self.routes
                .entry((start.clone(), end.clone()))
                .or_default()
                .add(trip.duration_secs);
        }

        let year = self.yearly.entry(trip.year).or_default();
        year.tally.add(trip.duration_secs);
        for name in [&trip.start_station, &trip.end_station].into_iter().flatten() {
            if !year.stations.contains(name) {
                year.stations.insert(name.clone());
            }
        }

        self.bike_types
            .entry(trip.rideable_type.clone())
            .or_default()
            .add(trip.duration_secs);
    }

    /// Adds another shard into this one using the same rules as [`fold`](Self::fold).
    pub fn merge(&mut self, other: TripStats) {
        self.total_trips += other.total_trips;
        self.first_start = match (self.first_start, other.first_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_start = match (self.last_start, other.last_start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        for (key, month) in other.monthly {
            let entry = self.monthly.entry(key).or_default();
            entry.tally.merge(&month.tally);
            entry.bikes.merge(&month.bikes);
        }
        for (mine, theirs) in self.hourly.iter_mut().zip(other.hourly.iter()) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.dow.iter_mut().zip(other.dow.iter()) {
            mine.merge(theirs);
        }
        for (name, station) in other.departures {
            self.departures.entry(name).or_default().merge(&station);
        }
        for (name, count) in other.arrivals {
            *self.arrivals.entry(name).or_insert(0) += count;
        }
        for (route, tally) in other.routes {
            self.routes.entry(route).or_default().merge(&tally);
        }
        for (key, count) in other.station_monthly {
            *self.station_monthly.entry(key).or_insert(0) += count;
        }
        for (year, tally) in other.yearly {
            let entry = self.yearly.entry(year).or_default();
            entry.tally.merge(&tally.tally);
            entry.stations.extend(tally.stations);
        }
        for (kind, tally) in other.bike_types {
            self.bike_types.entry(kind).or_default().merge(&tally);
        }

        self.batches_folded += other.batches_folded;
        self.rows_read += other.rows_read;
        self.rows_dropped += other.rows_dropped;
    }

    /// Subscriber departures summed over every station, before any threshold.
    pub fn subscriber_departures(&self) -> u64 {
        self.departures.values().map(|s| s.tally.subscribers).sum()
    }
}
