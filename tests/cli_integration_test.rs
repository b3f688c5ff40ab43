//! CLI integration tests over a CSV store on disk.
//!
//! Tests cover:
//! - Backtest command end to end: reports and the copied rule file
//! - Filter command persisting activation flags
//! - Indicator export
//! - Sample rule and filter files shipped with the crate

use clap::Parser;
use ruletrader::adapters::csv_adapter::CsvAdapter;
use ruletrader::cli::{self, Cli};
use ruletrader::domain::price_bar::DateRange;
use ruletrader::domain::registry::Registry;
use ruletrader::domain::rule_file::{RuleSet, load_filter_chain};
use ruletrader::ports::data_port::DataPort;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ROUND_TRIP: &str = r#"{
    "entry_groups": [{"order_type": "LONG", "rule": {"key": "simple", "timing": "OPEN"}}],
    "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple", "timing": "CLOSE"}}]
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("data/prices")).unwrap();
        fs::create_dir_all(root.join("rules")).unwrap();
        fs::create_dir_all(root.join("filters")).unwrap();

        fs::write(
            root.join("data/securities.csv"),
            "symbol,name,sector,market,activated\n\
             BHP,BHP Group,Materials,ASX,true\n\
             CBA,Commonwealth Bank,Financials,ASX,false\n",
        )
        .unwrap();
        fs::write(
            root.join("data/prices/BHP.csv"),
            "date,open,high,low,close,volume\n\
             2023-12-29,100,105,95,104,100000\n\
             2024-01-02,104,110,101,108,120000\n\
             2024-01-03,108,109,99,100,90000\n",
        )
        .unwrap();
        fs::write(
            root.join("data/prices/CBA.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-02,50,51,49,50,500\n\
             2024-01-03,50,52,48,51,700\n",
        )
        .unwrap();
        fs::write(root.join("rules/round_trip.json"), ROUND_TRIP).unwrap();
        fs::write(
            root.join("filters/liquid.json"),
            r#"{"filters": [{"key": "average_volume", "volume": 1000}]}"#,
        )
        .unwrap();

        let ini = format!(
            "[data]\ndir = {data}\n\n\
             [backtest]\nrules_dir = {rules}\ndefault_rule = round_trip\n\n\
             [filter]\nfilters_dir = {filters}\ndefault_filter = liquid\n\n\
             [output]\ndir = {output}\n",
            data = root.join("data").display(),
            rules = root.join("rules").display(),
            filters = root.join("filters").display(),
            output = root.join("output").display(),
        );
        fs::write(root.join("config.ini"), ini).unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn config(&self) -> String {
        self.path("config.ini").display().to_string()
    }

    fn port(&self) -> CsvAdapter {
        CsvAdapter::new(self.path("data"))
    }
}

fn run(args: &[&str]) {
    let cli = Cli::try_parse_from(args).unwrap();
    let _ = cli::run(cli);
}

mod backtest_command {
    use super::*;

    #[test]
    fn writes_reports_and_rule_copy() {
        let ws = Workspace::new();
        let out = ws.path("report");
        let config = ws.config();
        run(&[
            "ruletrader",
            "backtest",
            "-c",
            &config,
            "--output",
            out.to_str().unwrap(),
        ]);

        let total = fs::read_to_string(out.join("total.md")).unwrap();
        assert!(total.contains("Rule: round_trip"));
        assert!(total.contains("### 2023"));
        assert!(total.contains("### 2024"));
        assert!(out.join("bhp.md").exists());
        assert!(!out.join("cba.md").exists());
        assert_eq!(fs::read_to_string(out.join("rule.json")).unwrap(), ROUND_TRIP);
    }

    #[test]
    fn default_output_dir_is_named_after_rule() {
        let ws = Workspace::new();
        let config = ws.config();
        run(&["ruletrader", "backtest", "-c", &config, "--start-year", "2024"]);

        let total = fs::read_to_string(ws.path("output/round_trip/total.md")).unwrap();
        assert!(!total.contains("### 2023"));
        assert!(total.contains("### 2024"));
    }

    #[test]
    fn symbol_override_does_not_bypass_activation() {
        let ws = Workspace::new();
        let out = ws.path("cba_only");
        let config = ws.config();
        run(&[
            "ruletrader",
            "backtest",
            "-c",
            &config,
            "--symbol",
            "cba",
            "--output",
            out.to_str().unwrap(),
        ]);
        // CBA is not activated, so nothing is selected and no report is written.
        assert!(!out.join("total.md").exists());
    }
}

mod filter_command {
    use super::*;

    #[test]
    fn apply_filter_persists_activation() {
        let ws = Workspace::new();
        let (total, kept) = cli::apply_filter(&ws.port(), &ws.path("filters/liquid.json")).unwrap();
        assert_eq!(total, 2);
        assert_eq!(kept, vec!["BHP".to_string()]);

        let securities = ws.port().list_securities().unwrap();
        assert!(securities[0].activated);
        assert!(!securities[1].activated);
        assert_eq!(securities[1].name, "Commonwealth Bank");
    }

    #[test]
    fn cash_flow_filter_reads_statement_files() {
        let ws = Workspace::new();
        fs::create_dir_all(ws.path("data/financials")).unwrap();
        fs::write(
            ws.path("data/financials/CBA.csv"),
            "year,filing_date,revenue,net_income,operating_cf,investing_cf,financing_cf\n\
             2022,2022-08-10,,,900,,\n\
             2023,2023-08-09,,,1000,,\n",
        )
        .unwrap();
        fs::write(
            ws.path("filters/growth.json"),
            r#"{"filters": [{"key": "operating_cf_increasing", "percentage": 5, "years": 1}]}"#,
        )
        .unwrap();

        let (total, kept) = cli::apply_filter(&ws.port(), &ws.path("filters/growth.json")).unwrap();
        assert_eq!(total, 2);
        assert_eq!(kept, vec!["CBA".to_string()]);
    }

    #[test]
    fn filter_command_uses_default_filter() {
        let ws = Workspace::new();
        fs::write(
            ws.path("filters/liquid.json"),
            r#"{"filters": [{"key": "average_volume", "volume": 100}]}"#,
        )
        .unwrap();
        let config = ws.config();
        run(&["ruletrader", "filter", "-c", &config]);

        let securities = ws.port().list_securities().unwrap();
        assert!(securities.iter().all(|s| s.activated));
    }
}

mod export_command {
    use super::*;

    #[test]
    fn exports_one_column_per_indicator() {
        let ws = Workspace::new();
        let specs = vec!["price".to_string(), "moving_average:span=2".to_string()];
        let mut buf = Vec::new();
        let rows = cli::export_indicators(&ws.port(), "bhp", &specs, DateRange::unbounded(), &mut buf)
            .unwrap();
        assert_eq!(rows, 3);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("date,"));
        assert_eq!(lines[1], "2023-12-29,104,");
        assert_eq!(lines[2], "2024-01-02,108,106");
    }

    #[test]
    fn unknown_indicator_key_fails() {
        let ws = Workspace::new();
        let specs = vec!["nope".to_string()];
        let err = cli::export_indicators(&ws.port(), "BHP", &specs, DateRange::unbounded(), Vec::<u8>::new())
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}

mod shipped_files {
    use super::*;

    fn crate_file(rel: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
    }

    #[test]
    fn sample_rule_loads() {
        let rules = RuleSet::load(&crate_file("rules/default.json"), &Registry::default()).unwrap();
        assert_eq!(rules.name, "default");
        assert!(!rules.entry_groups.is_empty());
        assert!(!rules.exit_groups.is_empty());
    }

    #[test]
    fn sample_filter_loads() {
        let chain = load_filter_chain(&crate_file("filters/default.json"), &Registry::default()).unwrap();
        assert!(!chain.is_empty());
    }
}
