//! Rows of the finalized dashboard document.
//!
//! Field names are the contract with the report renderer and must not change.

use serde::Serialize;

use crate::parser::YearMonth;

/// Run-wide totals shown in the report header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_trips: u64,
    pub date_range_start: String,
    pub date_range_end: String,
    pub total_stations: usize,
    pub subscriber_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub year_month: YearMonth,
    pub total_trips: u64,
    pub avg_duration: f64,
    #[serde(rename = "trips_Subscriber")]
    pub trips_subscriber: u64,
    #[serde(rename = "trips_Customer")]
    pub trips_customer: u64,
    pub bike_classic: u64,
    pub bike_electric: u64,
    pub bike_docked: u64,
    pub bike_other: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRow {
    pub hour: usize,
    pub total_trips: u64,
    pub avg_duration: f64,
    #[serde(rename = "trips_Subscriber")]
    pub trips_subscriber: u64,
    #[serde(rename = "trips_Customer")]
    pub trips_customer: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowRow {
    pub day_of_week: usize,
    pub day_name: &'static str,
    pub total_trips: u64,
    pub avg_duration: f64,
    #[serde(rename = "trips_Subscriber")]
    pub trips_subscriber: u64,
    #[serde(rename = "trips_Customer")]
    pub trips_customer: u64,
}

/// One station, positioned at the centroid of its departure coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRow {
    pub station_name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_departures: u64,
    pub total_arrivals: u64,
    pub total_activity: u64,
    /// Arrivals minus departures.
    pub net_flow: i64,
    pub avg_duration_depart: f64,
    pub subscriber_departures: u64,
    pub customer_departures: u64,
    pub subscriber_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
    pub start_station_name: String,
    pub end_station_name: String,
    pub trip_count: u64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMonthRow {
    pub station_name: String,
    pub year_month: YearMonth,
    pub trips: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRow {
    pub year: i32,
    pub total_trips: u64,
    pub avg_duration: f64,
    pub unique_stations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BikeTypeRow {
    pub rideable_type: String,
    pub total_trips: u64,
    pub avg_duration: f64,
}

/// The single document handed to the report renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardDocument {
    pub summary: Summary,
    pub monthly: Vec<MonthlyRow>,
    pub stations: Vec<StationRow>,
    pub hourly: Vec<HourlyRow>,
    pub dow: Vec<DowRow>,
    pub top_routes: Vec<RouteRow>,
    pub station_monthly: Vec<StationMonthRow>,
    pub yearly: Vec<YearRow>,
    pub bike_type: Vec<BikeTypeRow>,
}
