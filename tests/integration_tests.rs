use bikeshare_digest::analyzers::aggregate::finalize;
use bikeshare_digest::analyzers::analyzer::{aggregate_archives, fold_archive, run};
use bikeshare_digest::analyzers::types::DashboardDocument;
use bikeshare_digest::archive::discover;
use bikeshare_digest::config::AggregationConfig;
use bikeshare_digest::output::write_json;
use bikeshare_digest::stats::TripStats;
use chrono::{Duration, NaiveDateTime};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use zip::write::SimpleFileOptions;

const CURRENT_HEADER: &str = "ride_id,rideable_type,started_at,ended_at,start_station_name,start_station_id,end_station_name,end_station_id,start_lat,start_lng,end_lat,end_lng,member_casual";
const LEGACY_HEADER: &str = "duration_sec,start_time,end_time,start_station_id,start_station_name,start_station_latitude,start_station_longitude,end_station_id,end_station_name,end_station_latitude,end_station_longitude,bike_id,user_type";

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bikeshare_digest_it_{name}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn end_of(start: &str, secs: i64) -> String {
    let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S").unwrap();
    (start + Duration::seconds(secs))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn ride(from: &str, to: &str, start: &str, secs: i64, rider: &str) -> String {
    format!(
        "r,electric_bike,{start},{},{from},1,{to},2,37.77,-122.41,37.78,-122.40,{rider}",
        end_of(start, secs)
    )
}

fn legacy_ride(from: &str, to: &str, start: &str, secs: i64, user_type: &str) -> String {
    format!(
        "{secs},{start},{},1,{from},37.79,-122.39,2,{to},37.78,-122.40,99,{user_type}",
        end_of(start, secs)
    )
}

fn csv(header: &str, rows: &[String]) -> String {
    let mut text = format!("{header}\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

fn write_zip(path: &Path, entries: &[(&str, String)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, body) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

async fn stats_for(dir: &Path, jobs: usize) -> TripStats {
    let (stats, _) = aggregate_archives(discover(dir).unwrap(), jobs).await.unwrap();
    stats
}

/// Twelve rides across three stations, two months and both rider classes.
fn sample_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for i in 0..12 {
        let start = format!("2021-0{}-0{} 0{}:15:00", 3 + i % 2, 1 + i % 5, 6 + i % 4);
        let (from, to) = match i % 3 {
            0 => ("Market St", "Howard St"),
            1 => ("Howard St", "Market St"),
            _ => ("Market St", "Embarcadero"),
        };
        let rider = if i % 4 == 0 { "casual" } else { "member" };
        rows.push(ride(from, to, &start, 60 * (i + 1), rider));
    }
    rows
}

#[tokio::test]
async fn test_two_batch_scenario() {
    let dir = temp_dir("scenario");
    write_zip(
        &dir.join("a_2021.zip"),
        &[(
            "batch1.csv",
            csv(
                CURRENT_HEADER,
                &[
                    ride("A", "B", "2021-03-01 08:00:00", 100, "member"),
                    ride("A", "B", "2021-03-01 08:10:00", 200, "member"),
                    ride("A", "B", "2021-03-01 08:20:00", 300, "member"),
                ],
            ),
        )],
    );
    fs::write(
        dir.join("b_2021.csv"),
        csv(CURRENT_HEADER, &[ride("A", "B", "2021-03-02 08:30:00", 400, "casual")]),
    )
    .unwrap();

    let doc = run(&dir, &AggregationConfig::default(), 1).await.unwrap();

    let route = &doc.top_routes[0];
    assert_eq!(doc.top_routes.len(), 1);
    assert_eq!((route.start_station_name.as_str(), route.end_station_name.as_str()), ("A", "B"));
    assert_eq!(route.trip_count, 4);
    assert_eq!(route.avg_duration, 250.0);

    let hour = &doc.hourly[8];
    assert_eq!(hour.total_trips, 4);
    assert_eq!(hour.trips_subscriber, 3);
    assert_eq!(hour.trips_customer, 1);

    assert_eq!(doc.summary.total_trips, 4);
    assert_eq!(doc.summary.date_range_start, "2021-03-01");
    assert_eq!(doc.summary.date_range_end, "2021-03-02");
    assert_eq!(doc.summary.subscriber_pct, 75.0);
    // station "A" has only four departures
    assert!(doc.stations.is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_split_batches_match_single_batch() {
    let rows = sample_rows();

    let whole = temp_dir("additivity_whole");
    fs::write(whole.join("all.csv"), csv(CURRENT_HEADER, &rows)).unwrap();

    let split = temp_dir("additivity_split");
    fs::write(split.join("part1.csv"), csv(CURRENT_HEADER, &rows[..5])).unwrap();
    write_zip(
        &split.join("part2.zip"),
        &[
            ("x.csv", csv(CURRENT_HEADER, &rows[5..9])),
            ("y.csv", csv(CURRENT_HEADER, &rows[9..])),
        ],
    );

    let config = AggregationConfig::default().with_overrides(None, None, Some(1));
    let one = finalize(stats_for(&whole, 1).await, &config);
    let sequential = finalize(stats_for(&split, 1).await, &config);
    let sharded = finalize(stats_for(&split, 4).await, &config);

    assert_eq!(one, sequential);
    assert_eq!(one, sharded);
    assert_eq!(
        serde_json::to_string(&one).unwrap(),
        serde_json::to_string(&sharded).unwrap()
    );

    fs::remove_dir_all(&whole).unwrap();
    fs::remove_dir_all(&split).unwrap();
}

#[tokio::test]
async fn test_conservation_and_station_identities() {
    let dir = temp_dir("conservation");
    let mut rows = sample_rows();
    rows.extend(sample_rows());
    fs::write(dir.join("trips.csv"), csv(CURRENT_HEADER, &rows)).unwrap();

    let stats = stats_for(&dir, 1).await;
    let departures: u64 = stats.departures.values().map(|s| s.tally.trips).sum();
    let doc: DashboardDocument = finalize(stats, &AggregationConfig::default());

    let monthly: u64 = doc.monthly.iter().map(|m| m.total_trips).sum();
    assert_eq!(monthly, doc.summary.total_trips);
    assert_eq!(departures, doc.summary.total_trips);
    assert_eq!(doc.summary.total_trips, 24);

    assert!(!doc.stations.is_empty());
    for station in &doc.stations {
        assert!(station.total_departures >= 10);
        assert_eq!(
            station.net_flow,
            station.total_arrivals as i64 - station.total_departures as i64
        );
        assert_eq!(station.total_activity, station.total_departures + station.total_arrivals);
    }
    assert_eq!(doc.summary.total_stations, doc.stations.len());
    assert!(
        doc.stations
            .windows(2)
            .all(|w| w[0].total_activity >= w[1].total_activity)
    );
    assert!(
        doc.top_routes
            .windows(2)
            .all(|w| w[0].trip_count >= w[1].trip_count)
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_sparse_input_is_zero_filled() {
    let dir = temp_dir("sparse");
    fs::write(
        dir.join("one.csv"),
        csv(CURRENT_HEADER, &[ride("A", "B", "2021-03-03 17:00:00", 90, "member")]),
    )
    .unwrap();

    let doc = run(&dir, &AggregationConfig::default(), 1).await.unwrap();

    assert_eq!(doc.hourly.len(), 24);
    assert_eq!(doc.dow.len(), 7);
    assert_eq!(doc.hourly.iter().map(|h| h.hour).collect::<Vec<_>>(), (0..24).collect::<Vec<_>>());
    assert_eq!(doc.hourly[17].total_trips, 1);
    assert_eq!(doc.hourly[16].total_trips, 0);
    assert_eq!(doc.hourly[16].avg_duration, 0.0);
    // 2021-03-03 was a Wednesday
    assert_eq!(doc.dow[2].total_trips, 1);
    assert_eq!(doc.dow[2].day_name, "Wed");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_coordinate_never_counted() {
    let dir = temp_dir("missing_coordinate");
    let mut rows: Vec<String> = (0..10)
        .map(|i| ride("A", "B", &format!("2021-03-01 08:0{i}:00"), 60, "member"))
        .collect();
    rows.push(
        "r,classic_bike,2021-03-01 09:00:00,2021-03-01 09:05:00,A,1,B,2,,-122.41,37.78,-122.40,member"
            .to_string(),
    );
    fs::write(dir.join("trips.csv"), csv(CURRENT_HEADER, &rows)).unwrap();

    let stats = stats_for(&dir, 1).await;
    assert_eq!(stats.rows_read, 11);
    assert_eq!(stats.rows_dropped, 1);
    assert_eq!(stats.departures["A"].tally.trips, 10);
    assert_eq!(stats.departures["A"].coord_count, 10);

    let doc = finalize(stats, &AggregationConfig::default());
    assert_eq!(doc.stations[0].total_departures, 10);
    assert_eq!(doc.stations[0].lat, 37.77);
    assert!(doc.bike_type.iter().all(|b| b.rideable_type != "classic_bike"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_legacy_and_current_schemas_combine() {
    let dir = temp_dir("schemas");
    write_zip(
        &dir.join("2018.zip"),
        &[
            (
                "2018-tripdata.csv",
                csv(
                    LEGACY_HEADER,
                    &[
                        legacy_ride("Market St", "Howard St", "2018-06-04 07:00:00", 300, "Subscriber"),
                        legacy_ride("Market St", "Howard St", "2018-06-04 07:30:00", 500, "Customer"),
                    ],
                ),
            ),
            ("__MACOSX/._2018-tripdata.csv", "junk".to_string()),
        ],
    );
    fs::write(
        dir.join("2021.csv"),
        csv(CURRENT_HEADER, &[ride("Market St", "Howard St", "2021-06-07 07:00:00", 400, "member")]),
    )
    .unwrap();

    let doc = run(&dir, &AggregationConfig::default(), 1).await.unwrap();

    assert_eq!(doc.summary.total_trips, 3);
    let years: Vec<_> = doc.yearly.iter().map(|y| (y.year, y.total_trips, y.unique_stations)).collect();
    assert_eq!(years, [(2018, 2, 2), (2021, 1, 2)]);
    assert_eq!(doc.yearly[0].avg_duration, 400.0);

    let kinds: Vec<_> = doc
        .bike_type
        .iter()
        .map(|b| (b.rideable_type.as_str(), b.total_trips))
        .collect();
    assert_eq!(kinds, [("classic_bike", 2), ("electric_bike", 1)]);

    let months: Vec<_> = doc.monthly.iter().map(|m| m.year_month.to_string()).collect();
    assert_eq!(months, ["2018-06", "2021-06"]);
    assert_eq!(doc.monthly[0].bike_classic, 2);
    assert_eq!(doc.monthly[1].bike_electric, 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_bad_batches_are_skipped() {
    let dir = temp_dir("bad_batches");
    fs::write(dir.join("a_corrupt.zip"), b"definitely not a zip").unwrap();
    write_zip(
        &dir.join("b_mixed.zip"),
        &[
            ("bad.csv", "just,some\nunrelated,table\n".to_string()),
            ("good.csv", csv(CURRENT_HEADER, &[ride("A", "B", "2021-03-01 08:00:00", 60, "member")])),
        ],
    );

    let mut stats = TripStats::default();
    let report = fold_archive(&dir.join("b_mixed.zip"), &mut stats);
    assert_eq!(report.batches_folded, 1);
    assert_eq!(report.batches_skipped, 1);

    let (stats, report) = aggregate_archives(discover(&dir).unwrap(), 1).await.unwrap();
    assert_eq!(report.batches_folded, 1);
    assert_eq!(report.batches_skipped, 2);
    assert_eq!(stats.total_trips, 1);

    let doc = run(&dir, &AggregationConfig::default(), 1).await.unwrap();
    assert_eq!(doc.summary.total_trips, 1);

    fs::remove_dir_all(&dir).unwrap();
}

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_merge_log_carries_running_total() {
    let dir = temp_dir("running_total");
    fs::write(
        dir.join("a.csv"),
        csv(CURRENT_HEADER, &[ride("A", "B", "2021-03-01 08:00:00", 60, "member")]),
    )
    .unwrap();
    fs::write(
        dir.join("b.csv"),
        csv(
            CURRENT_HEADER,
            &[
                ride("A", "B", "2021-03-02 08:00:00", 60, "member"),
                ride("B", "A", "2021-03-02 09:00:00", 60, "casual"),
            ],
        ),
    )
    .unwrap();

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (stats, _) = aggregate_archives(discover(&dir).unwrap(), 2).await.unwrap();
    assert_eq!(stats.total_trips, 3);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let merged: Vec<_> = output.lines().filter(|l| l.contains("Archive merged")).collect();
    assert_eq!(merged.len(), 2);
    assert!(merged[0].contains("archive_trips=1") && merged[0].contains("running_total=1"));
    assert!(merged[1].contains("archive_trips=2") && merged[1].contains("running_total=3"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_no_input_is_fatal() {
    let empty = temp_dir("no_input");
    fs::write(empty.join("readme.txt"), "nothing here").unwrap();
    assert!(run(&empty, &AggregationConfig::default(), 1).await.is_err());

    let unreadable = temp_dir("only_bad_input");
    fs::write(unreadable.join("broken.zip"), b"nope").unwrap();
    assert!(run(&unreadable, &AggregationConfig::default(), 1).await.is_err());

    fs::remove_dir_all(&empty).unwrap();
    fs::remove_dir_all(&unreadable).unwrap();
}

#[tokio::test]
async fn test_full_pipeline_writes_document() {
    let dir = temp_dir("pipeline");
    fs::write(dir.join("trips.csv"), csv(CURRENT_HEADER, &sample_rows())).unwrap();
    let output = dir.join("out").join("dashboard_data.json");

    let doc = run(&dir, &AggregationConfig::default(), 2).await.unwrap();
    write_json(&output, &doc, false).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["summary"]["total_trips"], 12);
    assert_eq!(json["hourly"].as_array().unwrap().len(), 24);
    assert_eq!(json["dow"].as_array().unwrap().len(), 7);
    assert!(json["top_routes"].as_array().unwrap().len() <= 100);
    assert!(json["monthly"][0].get("trips_Subscriber").is_some());

    fs::remove_dir_all(&dir).unwrap();
}
