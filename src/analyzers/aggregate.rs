use crate::analyzers::types::{
    BikeTypeRow, DashboardDocument, DowRow, HourlyRow, MonthlyRow, RouteRow, StationMonthRow,
    StationRow, Summary, YearRow,
};
use crate::analyzers::utility::{avg_duration, pct, round_to};
use crate::config::AggregationConfig;
use crate::stats::{StationTally, TripStats};
use chrono::NaiveDateTime;
use std::collections::HashMap;

static DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Turns the running aggregates of a completed run into the dashboard document.
///
/// All rounding happens here; the aggregates keep exact sums. Consumes the
/// aggregates, so a run can only be finalized once.
pub fn finalize(stats: TripStats, config: &AggregationConfig) -> DashboardDocument {
    let stations = station_rows(&stats.departures, &stats.arrivals, config.min_station_departures);

    let summary = Summary {
        total_trips: stats.total_trips,
        date_range_start: date_label(stats.first_start),
        date_range_end: date_label(stats.last_start),
        total_stations: stations.len(),
        subscriber_pct: pct(stats.subscriber_departures(), stats.total_trips),
    };

    let monthly = stats
        .monthly
        .iter()
        .map(|(year_month, month)| MonthlyRow {
            year_month: *year_month,
            total_trips: month.tally.trips,
            avg_duration: avg_duration(month.tally.duration_sum, month.tally.trips),
            trips_subscriber: month.tally.subscribers,
            trips_customer: month.tally.customers,
            bike_classic: month.bikes.classic,
            bike_electric: month.bikes.electric,
            bike_docked: month.bikes.docked,
            bike_other: month.bikes.other,
        })
        .collect();

    let hourly = stats
        .hourly
        .iter()
        .enumerate()
        .map(|(hour, tally)| HourlyRow {
            hour,
            total_trips: tally.trips,
            avg_duration: avg_duration(tally.duration_sum, tally.trips),
            trips_subscriber: tally.subscribers,
            trips_customer: tally.customers,
        })
        .collect();

    let dow = stats
        .dow
        .iter()
        .enumerate()
        .map(|(day, tally)| DowRow {
            day_of_week: day,
            day_name: DAY_NAMES[day],
            total_trips: tally.trips,
            avg_duration: avg_duration(tally.duration_sum, tally.trips),
            trips_subscriber: tally.subscribers,
            trips_customer: tally.customers,
        })
        .collect();

    let mut routes: Vec<_> = stats.routes.into_iter().collect();
    routes.sort_by(|((a_start, a_end), a), ((b_start, b_end), b)| {
        b.trips
            .cmp(&a.trips)
            .then_with(|| a_start.cmp(b_start))
            .then_with(|| a_end.cmp(b_end))
    });
    routes.truncate(config.top_routes_limit);
    let top_routes = routes
        .into_iter()
        .map(|((start, end), tally)| RouteRow {
            start_station_name: start,
            end_station_name: end,
            trip_count: tally.trips,
            avg_duration: avg_duration(tally.duration_sum, tally.trips),
        })
        .collect();

    // Rank among the busiest stations decides which trend lines are kept.
    let rank: HashMap<&str, usize> = stations
        .iter()
        .take(config.station_monthly_limit)
        .enumerate()
        .map(|(i, s)| (s.station_name.as_str(), i))
        .collect();
    let mut station_monthly: Vec<(usize, StationMonthRow)> = stats
        .station_monthly
        .into_iter()
        .filter_map(|((name, year_month), trips)| {
            let position = *rank.get(name.as_str())?;
            Some((
                position,
                StationMonthRow {
                    station_name: name,
                    year_month,
                    trips,
                },
            ))
        })
        .collect();
    station_monthly.sort_by(|(a_rank, a), (b_rank, b)| {
        a_rank.cmp(b_rank).then_with(|| a.year_month.cmp(&b.year_month))
    });
    let station_monthly = station_monthly.into_iter().map(|(_, row)| row).collect();

    let yearly = stats
        .yearly
        .iter()
        .map(|(year, tally)| YearRow {
            year: *year,
            total_trips: tally.tally.trips,
            avg_duration: avg_duration(tally.tally.duration_sum, tally.tally.trips),
            unique_stations: tally.stations.len(),
        })
        .collect();

    let mut bike_type: Vec<BikeTypeRow> = stats
        .bike_types
        .into_iter()
        .map(|(rideable_type, tally)| BikeTypeRow {
            rideable_type,
            total_trips: tally.trips,
            avg_duration: avg_duration(tally.duration_sum, tally.trips),
        })
        .collect();
    bike_type.sort_by(|a, b| {
        b.total_trips
            .cmp(&a.total_trips)
            .then_with(|| a.rideable_type.cmp(&b.rideable_type))
    });

    DashboardDocument {
        summary,
        monthly,
        stations,
        hourly,
        dow,
        top_routes,
        station_monthly,
        yearly,
        bike_type,
    }
}

/// Stations above the departure floor, busiest first.
fn station_rows(
    departures: &HashMap<String, StationTally>,
    arrivals: &HashMap<String, u64>,
    min_departures: u64,
) -> Vec<StationRow> {
    let mut rows: Vec<StationRow> = departures
        .iter()
        .filter(|(_, s)| s.tally.trips > 0 && s.tally.trips >= min_departures)
        .map(|(name, s)| {
            let departed = s.tally.trips;
            let arrived = arrivals.get(name).copied().unwrap_or(0);
            let coords = s.coord_count.max(1) as f64;
            StationRow {
                station_name: name.clone(),
                lat: round_to(s.lat_sum / coords, 6),
                lng: round_to(s.lng_sum / coords, 6),
                total_departures: departed,
                total_arrivals: arrived,
                total_activity: departed + arrived,
                net_flow: arrived as i64 - departed as i64,
                avg_duration_depart: avg_duration(s.tally.duration_sum, departed),
                subscriber_departures: s.tally.subscribers,
                customer_departures: s.tally.customers,
                subscriber_pct: pct(s.tally.subscribers, departed),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_activity
            .cmp(&a.total_activity)
            .then_with(|| a.station_name.cmp(&b.station_name))
    });
    rows
}

fn date_label(ts: Option<NaiveDateTime>) -> String {
    ts.map_or_else(|| "N/A".to_string(), |ts| ts.date().format("%Y-%m-%d").to_string())
}
