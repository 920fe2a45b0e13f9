// End-to-end runs: DBC on disk -> candump replay -> dispatch loop -> sink
use can_telemetry::{
    CancelToken, CandumpSource, DashboardSink, DisplayOptions, JsonLinesSink, LineSink,
    MessageSchema, Monitor, MonitorConfig, MonitorPhase, SchemaLoadError, StopReason,
};
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

const BATTERY_DBC: &str = r#"
VERSION ""

NS_ :
    CM_
    VAL_

BS_:

BU_: LBC VCM

BO_ 1371 LBC_Status: 8 LBC
 SG_ LBC_StateOfCharge : 0|10@1+ (0.1,0) [0|100] "%" VCM

BO_ 1459 LBC_Health: 8 LBC
 SG_ BatteryStateOfHealth : 0|10@1+ (0.1,0) [0|100] "%" VCM
"#;

const REPLAY: &str = "\
(1436509052.249713) can0 55B#F401000000000000
(1436509052.250001) can0 123#DEADBEEF
this line is not a frame
(1436509052.250522) can0 5B3#2003000000000000
";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dbc_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn replay() -> CandumpSource<Cursor<&'static str>> {
    CandumpSource::from_reader(Cursor::new(REPLAY), "replay.log")
}

#[test]
fn replay_prints_latest_values() {
    init_logging();
    let dbc = dbc_file(BATTERY_DBC);
    let schema = MessageSchema::load(&[dbc.path()]).unwrap();
    assert_eq!(schema.stats().num_messages, 2);

    let options = DisplayOptions::new()
        .with_label("LBC_StateOfCharge", "LBC SOC")
        .with_label("BatteryStateOfHealth", "SOH");
    let mut sink = LineSink::new(Vec::new(), options);
    let mut monitor = Monitor::new(&schema, MonitorConfig::new());

    let reason = monitor
        .run(|| Ok(replay()), &mut sink, &CancelToken::new())
        .unwrap();

    assert_eq!(reason, StopReason::EndOfStream);
    assert_eq!(monitor.phase(), MonitorPhase::Stopped);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(output, "Received LBC SOC: 50.0%\nReceived SOH: 80.0%\n");

    let snapshot = monitor.state().snapshot();
    assert!((snapshot["LBC_StateOfCharge"] - 50.0).abs() < 1e-9);
    assert!((snapshot["BatteryStateOfHealth"] - 80.0).abs() < 1e-9);

    // The malformed line is skipped by the source, the unknown ID by the loop
    let stats = monitor.stats();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.frames_published, 2);
    assert_eq!(stats.frames_ignored, 1);
}

#[test]
fn watch_set_limits_decoding() {
    init_logging();
    let dbc = dbc_file(BATTERY_DBC);
    let schema = MessageSchema::load(&[dbc.path()]).unwrap();

    let config = MonitorConfig::new().with_watch_ids(vec![0x5B3]);
    let mut sink = LineSink::new(Vec::new(), DisplayOptions::new());
    let mut monitor = Monitor::new(&schema, config);

    monitor
        .run(|| Ok(replay()), &mut sink, &CancelToken::new())
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(output, "Received BatteryStateOfHealth: 80.0%\n");
    assert!(monitor.state().get("LBC_StateOfCharge").is_none());
    assert_eq!(monitor.state().value_or("LBC_StateOfCharge", 0.0), 0.0);
}

#[test]
fn dashboard_redraws_in_place() {
    init_logging();
    let dbc = dbc_file(BATTERY_DBC);
    let schema = MessageSchema::load(&[dbc.path()]).unwrap();

    let options = DisplayOptions::new()
        .with_label("LBC_StateOfCharge", "SOC")
        .with_label("BatteryStateOfHealth", "SOH");
    let columns = vec![
        "LBC_StateOfCharge".to_string(),
        "BatteryStateOfHealth".to_string(),
    ];
    let mut sink = DashboardSink::new(Vec::new(), columns, options);
    let mut monitor = Monitor::new(&schema, MonitorConfig::new());

    monitor
        .run(|| Ok(replay()), &mut sink, &CancelToken::new())
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        output,
        "\rSOC: 50.0%   SOH: --    \rSOC: 50.0%   SOH: 80.0%    \n"
    );
}

#[test]
fn json_lines_per_frame() {
    init_logging();
    let dbc = dbc_file(BATTERY_DBC);
    let schema = MessageSchema::load(&[dbc.path()]).unwrap();

    let mut sink = JsonLinesSink::new(Vec::new());
    let mut monitor = Monitor::new(&schema, MonitorConfig::new());
    monitor
        .run(|| Ok(replay()), &mut sink, &CancelToken::new())
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let records: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["message"], "LBC_Status");
    assert_eq!(records[0]["signals"]["LBC_StateOfCharge"]["raw"], 500);
    assert_eq!(records[1]["can_id"], 0x5B3);
    assert_eq!(records[1]["timestamp"], "2015-07-10T06:17:32.250522Z");
}

#[test]
fn cancelled_before_start_reads_nothing() {
    init_logging();
    let dbc = dbc_file(BATTERY_DBC);
    let schema = MessageSchema::load(&[dbc.path()]).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();

    let mut sink = LineSink::new(Vec::new(), DisplayOptions::new());
    let mut monitor = Monitor::new(&schema, MonitorConfig::new());
    let reason = monitor.run(|| Ok(replay()), &mut sink, &cancel).unwrap();

    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(monitor.stats().frames_received, 0);
    assert!(sink.into_inner().is_empty());
}

#[test]
fn schema_errors_are_reported() {
    let missing = MessageSchema::load(&["/nonexistent/battery.dbc"]).unwrap_err();
    assert!(matches!(missing, SchemaLoadError::Io { .. }));

    let first = dbc_file(BATTERY_DBC);
    let second = dbc_file(BATTERY_DBC);
    let duplicate = MessageSchema::load(&[first.path(), second.path()]).unwrap_err();
    assert!(matches!(duplicate, SchemaLoadError::DuplicateMessage { can_id: 0x55B, .. }));
}
