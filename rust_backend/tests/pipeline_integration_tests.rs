//! End-to-end runs of the housing pipeline against files on disk.
//!
//! These tests ensure that:
//! 1. Valid rows are cleaned, enriched and published in a fixed column order
//! 2. Rejected rows carry their reason into the rejected CSV and the report
//! 3. Structural failures publish no data artifact but still write a report
//! 4. Repeated runs over the same source give byte-identical outputs

use std::fs;
use std::path::{Path, PathBuf};

use luxury_housing_etl::config::{AmenityPolicy, MissingPolicy, PipelineConfig};
use luxury_housing_etl::io::{ExportFormat, RunReport, RunStatus, EXPORT_COLUMNS};
use luxury_housing_etl::preprocessing::{HousingPipeline, RejectReason};
use luxury_housing_etl::EtlError;
use tempfile::TempDir;

// ==================== Helper Functions ====================

const RAW_EXTRACT: &str = "\
Property_ID,Micro_Market,Project_Name,Developer_Name,Unit_Size_Sqft,Configuration,Ticket_Price_Cr,Buyer_Type,Purchase_Quarter,Amenity_Score,Booking_Status,Possession_Status,Sales_Channel
P1,Whitefield,Prestige Lakeside,Prestige,2100,3BHK,-5,NRI,Q1 2024,7,Booked,Ready To Move,Broker
P2,  hebbal ,Sobha Royal,sobha,2800,4 bhk,₹ 6.5 Cr,HNI,Q2_2024,8.5,Booked,Under Construction,Direct
P3,Sarjapur Road,Brigade Oasis,Brigade,1900,3 BHK,45 Lac,Local,2024-Q3,12,Not Booked,,Online
P4,Indiranagar,Embassy One,Embassy,3500,5BHK,abc,NRI,Q4 2024,9,Booked,Ready To Move,Broker
,Whitefield,Prestige Park,Prestige,2000,3BHK,4.2,HNI,Q1 2024,8,Booked,Ready To Move,Direct
P2,Hebbal,Sobha Royal,Sobha,2800,4BHK,6.6,HNI,Q2_2024,8,Booked,Under Construction,Direct
P5,Koramangala,,Total Environment,2500,4BHK,12.0,Local,Q1_2023,,Sold,Ready To Move,
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(raw: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("raw.csv"), raw).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, format: ExportFormat) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.pipeline.input = Some(self.path("raw.csv"));
        config.pipeline.output = Some(self.path("out/clean.dat"));
        config.pipeline.report = Some(self.path("out/report.json"));
        config.pipeline.rejected = Some(self.path("out/rejected.csv"));
        config.pipeline.format = format;
        config
    }

    fn run(&self, config: PipelineConfig) -> Result<RunReport, luxury_housing_etl::preprocessing::RunFailure> {
        HousingPipeline::new(config).unwrap().run()
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }

    fn report(&self) -> RunReport {
        RunReport::from_json(&fs::read(self.path("out/report.json")).unwrap()).unwrap()
    }
}

fn csv_rows(content: &str) -> Vec<csv::StringRecord> {
    csv::Reader::from_reader(content.as_bytes())
        .records()
        .map(|r| r.unwrap())
        .collect()
}

fn column(name: &str) -> usize {
    EXPORT_COLUMNS.iter().position(|c| *c == name).unwrap()
}

fn partial_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".partial"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ==================== Successful Runs ====================

#[test]
fn test_full_run_publishes_clean_csv() {
    let ws = Workspace::new(RAW_EXTRACT);
    let report = ws.run(ws.config(ExportFormat::Csv)).unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.validation.rows_read, 7);
    assert_eq!(report.validation.rows_valid, 3);
    assert_eq!(report.validation.rows_rejected, 4);

    let content = ws.read("out/clean.dat");
    assert_eq!(content.lines().next(), Some(EXPORT_COLUMNS.join(",").as_str()));

    let rows = csv_rows(&content);
    let ids: Vec<&str> = rows.iter().map(|r| &r[column("Property_ID")]).collect();
    assert_eq!(ids, vec!["P2", "P3", "P5"]);

    let p2 = &rows[0];
    assert_eq!(&p2[column("Micro_Market")], "Hebbal");
    assert_eq!(&p2[column("Developer_Name")], "Sobha");
    assert_eq!(&p2[column("Configuration")], "4BHK");
    assert_eq!(&p2[column("Ticket_Price_Cr")], "6.5");
    assert_eq!(&p2[column("Booking_Flag")], "1");
    assert_eq!(&p2[column("Period")], "2024-Q2");
    assert_eq!(&p2[column("Season")], "Spring");
    assert_eq!(&p2[column("Price_Category")], "5-10Cr");
    assert!(p2[column("Additional_Data")].contains("\"Buyer_Type\":\"HNI\""));

    let p3 = &rows[1];
    assert_eq!(&p3[column("Ticket_Price_Cr")], "0.45");
    assert_eq!(&p3[column("Amenity_Score")], "10.0");
    assert_eq!(&p3[column("Booking_Flag")], "0");
    assert_eq!(&p3[column("Possession_Status")], "Unknown");
    assert!(p3[column("Imputed_Fields")].contains("Possession_Status"));

    let p5 = &rows[2];
    assert_eq!(&p5[column("Booking_Flag")], "1");
    assert_eq!(&p5[column("Price_Category")], "10-20Cr");
    assert_eq!(&p5[column("Sales_Channel")], "Unknown");
}

#[test]
fn test_rejections_reported_with_reasons() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::Csv)).unwrap();

    let rejected = csv_rows(&ws.read("out/rejected.csv"));
    let summary: Vec<(String, String)> = rejected
        .iter()
        .map(|r| (r[1].to_string(), r[4].to_string()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("P1".to_string(), "negative price".to_string()),
            ("P4".to_string(), "non-numeric price".to_string()),
            ("".to_string(), "missing property id".to_string()),
            ("P2".to_string(), "duplicate property id".to_string()),
        ]
    );
    assert_eq!(&rejected[0][0], "2");
    assert_eq!(&rejected[0][2], "Ticket_Price_Cr");
    assert_eq!(&rejected[0][3], "-5");

    let report = ws.report();
    assert_eq!(report.rejections.len(), 4);
    assert_eq!(report.rejections[0].reason, RejectReason::NegativePrice);
    assert_eq!(report.validation.rejections_by_reason["negative price"], 1);
    assert_eq!(report.validation.amenity_clipped, 1);
    assert_eq!(report.rejected_artifact.as_ref().unwrap().rows, 4);
}

#[test]
fn test_report_describes_run() {
    let ws = Workspace::new(RAW_EXTRACT);
    let returned = ws.run(ws.config(ExportFormat::Csv)).unwrap();
    let report = ws.report();

    assert_eq!(report, returned);
    assert!(report.error.is_none());
    assert_eq!(report.schema.column_mapping["Ticket_Price_Cr"], "Ticket_Price_Cr");
    assert!(report.schema.unmapped_columns.contains(&"Buyer_Type".to_string()));

    let stages: Vec<(&str, usize, usize)> = report
        .stages
        .iter()
        .map(|s| (s.stage.as_str(), s.rows_in, s.rows_out))
        .collect();
    assert_eq!(
        stages,
        vec![
            ("load", 7, 7),
            ("validate", 7, 3),
            ("clean", 3, 3),
            ("derive_features", 3, 3),
            ("export", 3, 3),
        ]
    );

    let measures = report.measures.unwrap();
    assert_eq!(measures.total_projects, 3);
    assert_eq!(measures.total_bookings, 2);
    assert_eq!(measures.total_revenue_cr, 18.5);

    let artifact = report.artifact.unwrap();
    assert_eq!(artifact.rows, 3);
    assert_eq!(
        artifact.sha256,
        luxury_housing_etl::io::calculate_checksum(&fs::read(ws.path("out/clean.dat")).unwrap())
    );
    assert!(partial_files(&ws.path("out")).is_empty());
}

#[test]
fn test_output_ids_unique_and_present() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::Csv)).unwrap();

    let rows = csv_rows(&ws.read("out/clean.dat"));
    let mut ids: Vec<String> = rows
        .iter()
        .map(|r| r[column("Property_ID")].to_string())
        .collect();
    assert!(ids.iter().all(|id| !id.is_empty()));

    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let ws = Workspace::new(RAW_EXTRACT);

    ws.run(ws.config(ExportFormat::Csv)).unwrap();
    let first_data = fs::read(ws.path("out/clean.dat")).unwrap();
    let first_report = fs::read(ws.path("out/report.json")).unwrap();
    let first_rejected = fs::read(ws.path("out/rejected.csv")).unwrap();

    ws.run(ws.config(ExportFormat::Csv)).unwrap();
    assert_eq!(fs::read(ws.path("out/clean.dat")).unwrap(), first_data);
    assert_eq!(fs::read(ws.path("out/report.json")).unwrap(), first_report);
    assert_eq!(fs::read(ws.path("out/rejected.csv")).unwrap(), first_rejected);
}

#[test]
fn test_json_lines_export() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::JsonLines)).unwrap();

    let content = ws.read("out/clean.dat");
    let rows: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["Property_ID"], "P2");
    assert_eq!(rows[0]["Booking_Flag"], 1);
    assert_eq!(rows[1]["Ticket_Price_Cr"], 0.45);
    assert_eq!(ws.report().format, ExportFormat::JsonLines);
}

#[test]
fn test_sql_export() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::Sql)).unwrap();

    let script = ws.read("out/clean.dat");
    assert!(script.starts_with("CREATE TABLE IF NOT EXISTS housing_data"));
    assert_eq!(script.matches("INSERT INTO housing_data").count(), 3);
    assert!(script.contains("VALUES ('P2', 'Hebbal', 'Sobha', 6.5, '4BHK'"));
}

#[test]
fn test_reject_policies() {
    let ws = Workspace::new(RAW_EXTRACT);
    let mut config = ws.config(ExportFormat::Csv);
    config.validation.amenity_policy = AmenityPolicy::Reject;
    config.cleaning.missing_policy = MissingPolicy::Flag;

    let report = ws.run(config).unwrap();
    assert_eq!(report.validation.rows_valid, 2);
    assert_eq!(
        report.validation.rejections_by_reason["amenity score out of range"],
        1
    );

    let rows = csv_rows(&ws.read("out/clean.dat"));
    let p5 = &rows[1];
    assert_eq!(&p5[column("Property_ID")], "P5");
    assert_eq!(&p5[column("Sales_Channel")], "");
    assert!(p5[column("Imputed_Fields")].contains("Sales_Channel:missing"));
    assert!(p5[column("Imputed_Fields")].contains("Amenity_Score:missing"));
}

#[test]
fn test_header_only_source_gives_header_only_artifact() {
    let ws = Workspace::new("Property_ID,Ticket_Price_Cr\n");
    let report = ws.run(ws.config(ExportFormat::Csv)).unwrap();

    assert_eq!(report.validation.rows_read, 0);
    assert_eq!(ws.read("out/clean.dat"), format!("{}\n", EXPORT_COLUMNS.join(",")));
    assert_eq!(report.measures.unwrap().conversion_rate, 0.0);
}

// ==================== Failed Runs ====================

#[test]
fn test_missing_property_id_column_aborts_without_artifact() {
    let ws = Workspace::new("Micro_Market,Ticket_Price_Cr,Booking_Status\nWhitefield,4.5,Booked\n");
    let failure = ws.run(ws.config(ExportFormat::Csv)).unwrap_err();

    match &failure.error {
        EtlError::Schema { missing } => assert_eq!(missing, &vec!["Property_ID".to_string()]),
        other => panic!("Expected schema error, got {:?}", other),
    }
    assert!(!ws.path("out/clean.dat").exists());
    assert!(!ws.path("out/rejected.csv").exists());
    assert!(partial_files(&ws.path("out")).is_empty());

    let report = ws.report();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.schema.missing_columns, vec!["Property_ID".to_string()]);
    let error = report.error.unwrap();
    assert_eq!(error.kind, "schema_error");
    assert_eq!(error.stage, "load");
    assert!(report.artifact.is_none());
    assert_eq!(*failure.report, ws.report());
}

#[test]
fn test_failed_run_keeps_previous_artifact() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::Csv)).unwrap();
    let published = fs::read(ws.path("out/clean.dat")).unwrap();

    fs::write(ws.path("raw.csv"), "Developer_Name\nPrestige\n").unwrap();
    ws.run(ws.config(ExportFormat::Csv)).unwrap_err();

    assert_eq!(fs::read(ws.path("out/clean.dat")).unwrap(), published);
    assert_eq!(ws.report().status, RunStatus::Failed);
}

fn block_report_path(ws: &Workspace) {
    let report = ws.path("out/report.json");
    let _ = fs::remove_file(&report);
    fs::create_dir_all(&report).unwrap();
    fs::write(report.join("notes.txt"), "keep").unwrap();
}

fn backup_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".previous"))
        .collect()
}

#[test]
fn test_unwritable_report_publishes_no_artifact() {
    let ws = Workspace::new(RAW_EXTRACT);
    block_report_path(&ws);

    let failure = ws.run(ws.config(ExportFormat::Csv)).unwrap_err();
    assert!(matches!(failure.error, EtlError::Io { .. }));
    assert_eq!(failure.report.status, RunStatus::Failed);

    assert!(!ws.path("out/clean.dat").exists());
    assert!(!ws.path("out/rejected.csv").exists());
    assert!(partial_files(&ws.path("out")).is_empty());
    assert_eq!(ws.read("out/report.json/notes.txt"), "keep");
}

#[test]
fn test_unwritable_report_keeps_previous_artifacts() {
    let ws = Workspace::new(RAW_EXTRACT);
    ws.run(ws.config(ExportFormat::Csv)).unwrap();
    let data = fs::read(ws.path("out/clean.dat")).unwrap();
    let rejected = fs::read(ws.path("out/rejected.csv")).unwrap();

    fs::write(ws.path("raw.csv"), "Property_ID,Ticket_Price_Cr\nP9,3.0\n").unwrap();
    block_report_path(&ws);
    ws.run(ws.config(ExportFormat::Csv)).unwrap_err();

    assert_eq!(fs::read(ws.path("out/clean.dat")).unwrap(), data);
    assert_eq!(fs::read(ws.path("out/rejected.csv")).unwrap(), rejected);
    assert!(partial_files(&ws.path("out")).is_empty());
    assert!(backup_files(&ws.path("out")).is_empty());
}

#[test]
fn test_ids_differing_only_in_spacing_publish_once() {
    let ws = Workspace::new("Property_ID,Ticket_Price_Cr\nP 1,1\nP  1,2\nP2,3\n");
    let report = ws.run(ws.config(ExportFormat::Csv)).unwrap();

    let rows = csv_rows(&ws.read("out/clean.dat"));
    let ids: Vec<&str> = rows.iter().map(|r| &r[column("Property_ID")]).collect();
    assert_eq!(ids, vec!["P 1", "P2"]);
    assert_eq!(
        report.rejections[0].reason,
        RejectReason::DuplicatePropertyId
    );
    assert_eq!(report.rejections[0].line, 3);
}

#[test]
fn test_missing_source_is_io_error() {
    let ws = Workspace::new(RAW_EXTRACT);
    let mut config = ws.config(ExportFormat::Csv);
    config.pipeline.input = Some(ws.path("does-not-exist.csv"));

    let failure = ws.run(config).unwrap_err();
    assert!(matches!(failure.error, EtlError::Io { .. }));
    assert_eq!(ws.report().error.unwrap().kind, "io_error");
}

#[test]
fn test_refuses_to_overwrite_source() {
    let ws = Workspace::new(RAW_EXTRACT);
    let mut config = ws.config(ExportFormat::Csv);
    config.pipeline.output = Some(ws.path("raw.csv"));

    let failure = ws.run(config).unwrap_err();
    assert!(matches!(failure.error, EtlError::Config(_)));
    assert_eq!(ws.read("raw.csv"), RAW_EXTRACT);
}

#[test]
fn test_run_from_config_file() {
    let ws = Workspace::new(RAW_EXTRACT);
    let toml = format!(
        "[pipeline]\ninput = {:?}\noutput = {:?}\nformat = \"jsonl\"\n\n[validation]\namenity_policy = \"reject\"\n",
        ws.path("raw.csv").to_string_lossy(),
        ws.path("out/clean.jsonl").to_string_lossy()
    );
    fs::write(ws.path("housing_etl.toml"), toml).unwrap();

    let config = PipelineConfig::from_file(ws.path("housing_etl.toml")).unwrap();
    let report = ws.run(config).unwrap();

    assert_eq!(report.format, ExportFormat::JsonLines);
    assert_eq!(report.amenity_policy, AmenityPolicy::Reject);
    assert_eq!(ws.read("out/clean.jsonl").lines().count(), 2);
    assert!(!ws.path("out/report.json").exists());
}

#[test]
fn test_bundled_sample_extract() {
    let dir = TempDir::new().unwrap();
    let mut config = PipelineConfig::from_file("housing_etl.toml").unwrap();
    config.pipeline.output = Some(dir.path().join("clean.csv"));
    config.pipeline.report = Some(dir.path().join("report.json"));
    config.pipeline.rejected = None;

    let report = HousingPipeline::new(config).unwrap().run().unwrap();

    assert_eq!(report.validation.rows_read, 10);
    assert_eq!(report.validation.rows_valid, 6);
    assert_eq!(report.validation.rows_rejected, 4);

    let measures = report.measures.unwrap();
    assert_eq!(measures.total_bookings, 3);
    assert_eq!(measures.by_period.len(), 6);
}
