//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::markdown_report::{MarkdownReportAdapter, render_overview};
use crate::domain::backtest::{BacktestConfig, Backtester};
use crate::domain::config_validation::{self, validate_config};
use crate::domain::error::{PluginFamily, RuletraderError};
use crate::domain::indicator::{Indicator, IndicatorEngine};
use crate::domain::order::OrderType;
use crate::domain::params::{Params, parse_pairs};
use crate::domain::price_bar::DateRange;
use crate::domain::registry::Registry;
use crate::domain::result::BacktestResult;
use crate::domain::rule_file::{RuleSet, load_filter_chain};
use crate::domain::security::Security;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "ruletrader", about = "Rule-based daily bar backtester")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest a rule file over the activated securities
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Rule name under the rules directory, or a path to a .json file
        rule: Option<String>,
        /// Restrict the run to these symbols
        #[arg(long)]
        symbol: Vec<String>,
        /// long, short, 1 or 2
        #[arg(long)]
        order_type: Option<String>,
        #[arg(long)]
        start_year: Option<i32>,
        #[arg(long)]
        end_year: Option<i32>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply a filter file and store which securities are activated
    Filter {
        #[arg(short, long)]
        config: PathBuf,
        /// Filter name under the filters directory, or a path to a .json file
        filter: Option<String>,
    },
    /// List registered plugins or activated securities
    Show {
        what: ShowTarget,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write indicator series for one security as CSV
    ExportIndicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        /// KEY or KEY:k=v,k=v
        #[arg(required = true)]
        indicators: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowTarget {
    Indicators,
    Conditions,
    EntryRules,
    ExitRules,
    Filters,
    Securities,
}

impl ShowTarget {
    fn family(self) -> Option<PluginFamily> {
        match self {
            ShowTarget::Indicators => Some(PluginFamily::Indicators),
            ShowTarget::Conditions => Some(PluginFamily::Conditions),
            ShowTarget::EntryRules => Some(PluginFamily::EntryRules),
            ShowTarget::ExitRules => Some(PluginFamily::ExitRules),
            ShowTarget::Filters => Some(PluginFamily::Filters),
            ShowTarget::Securities => None,
        }
    }
}

/// Overrides given on the backtest command line.
#[derive(Debug, Default)]
pub struct BacktestOverrides {
    pub symbols: Vec<String>,
    pub order_type: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            rule,
            symbol,
            order_type,
            start_year,
            end_year,
            output,
        } => run_backtest(
            &config,
            rule.as_deref(),
            BacktestOverrides {
                symbols: symbol,
                order_type,
                start_year,
                end_year,
            },
            output.as_deref(),
        ),
        Command::Filter { config, filter } => run_filter(&config, filter.as_deref()),
        Command::Show { what, config } => run_show(what, config.as_deref()),
        Command::ExportIndicators {
            config,
            symbol,
            indicators,
            output,
        } => run_export_indicators(&config, &symbol, &indicators, output.as_deref()),
    }
}

fn fail(err: &RuletraderError) -> ExitCode {
    eprintln!("error: {err}");
    if err.is_invariant_violation() {
        eprintln!("this is a bug, please report it");
    }
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path).map_err(|e| fail(&e))?;
    validate_config(&adapter).map_err(|e| fail(&e))?;
    Ok(adapter)
}

fn data_port(config: &dyn ConfigPort) -> Result<CsvAdapter, RuletraderError> {
    Ok(CsvAdapter::new(PathBuf::from(config_validation::data_dir(config)?)))
}

/// A bare name resolves to `<dir>/<name>.json`; anything ending in `.json`
/// is taken as a path.
pub fn resolve_document(dir: &str, name: &str) -> PathBuf {
    if name.ends_with(".json") {
        PathBuf::from(name)
    } else {
        Path::new(dir).join(format!("{name}.json"))
    }
}

pub fn build_backtest_config(
    config: &dyn ConfigPort,
    overrides: &BacktestOverrides,
) -> Result<BacktestConfig, RuletraderError> {
    let mut order_types = config_validation::order_types(config)?;
    if let Some(raw) = &overrides.order_type {
        order_types = vec![parse_order_type(raw)?];
    }

    let configured = config_validation::date_range(config)?;
    let start = match overrides.start_year {
        Some(year) => Some(year_bound(year, 1, 1)?),
        None => configured.start,
    };
    let end = match overrides.end_year {
        Some(year) => Some(year_bound(year, 12, 31)?),
        None => configured.end,
    };
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(RuletraderError::argument(
                "start-year",
                "no later than the end of the range",
            ));
        }
    }

    Ok(BacktestConfig {
        order_types,
        amount_per_trade: config_validation::amount_per_trade(config)?,
        date_range: DateRange::new(start, end),
        symbols: (!overrides.symbols.is_empty()).then(|| overrides.symbols.clone()),
    })
}

fn parse_order_type(raw: &str) -> Result<OrderType, RuletraderError> {
    if let Some(order_type) = OrderType::from_token(raw) {
        return Ok(order_type);
    }
    match raw.trim().parse::<i64>() {
        Ok(code @ (1 | 2)) => OrderType::from_code(code),
        _ => Err(RuletraderError::argument("order-type", "long, short, 1 or 2")),
    }
}

fn year_bound(year: i32, month: u32, day: u32) -> Result<NaiveDate, RuletraderError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| RuletraderError::argument("year", "a calendar year"))
}

fn run_backtest(
    config_path: &Path,
    rule: Option<&str>,
    overrides: BacktestOverrides,
    output: Option<&Path>,
) -> ExitCode {
    // Stage 1: Load and validate config
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    // Stage 2: Build the run configuration
    let bt_config = match build_backtest_config(&config, &overrides) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    // Stage 3: Load the rule file
    let rules_dir = config.get_string_or("backtest", "rules_dir", "rules");
    let rule_name = rule
        .map(str::to_string)
        .unwrap_or_else(|| config.get_string_or("backtest", "default_rule", "default"));
    let rule_path = resolve_document(&rules_dir, &rule_name);
    eprintln!("Loading rule from {}", rule_path.display());
    let registry = Registry::default();
    let rules = match RuleSet::load(&rule_path, &registry) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Rule '{}': {} entry groups, {} exit groups",
        rules.name,
        rules.entry_groups.len(),
        rules.exit_groups.len()
    );

    // Stage 4: Open the data store and build the engine
    let port = match data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let engine = match config_validation::max_indicator_cache(&config) {
        Ok(max) => IndicatorEngine::new(max),
        Err(e) => return fail(&e),
    };

    // Stage 5: Run
    let mut backtester = Backtester::new(rules, bt_config, engine);
    if let Err(e) = backtester.run(&port) {
        return fail(&e);
    }
    let result = backtester.into_result();
    eprintln!("\n{}", render_overview(&result));

    // Stage 6: Reports
    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => Path::new(&config.get_string_or("output", "dir", "output")).join(&result.rule_name),
    };
    if let Err(e) = write_outputs(&result, &rule_path, &output_dir) {
        return fail(&e);
    }
    eprintln!("Report written to: {}", output_dir.display());
    ExitCode::SUCCESS
}

fn write_outputs(
    result: &BacktestResult,
    rule_path: &Path,
    output_dir: &Path,
) -> Result<(), RuletraderError> {
    MarkdownReportAdapter::new().write(result, output_dir)?;
    fs::copy(rule_path, output_dir.join("rule.json"))?;
    Ok(())
}

fn run_filter(config_path: &Path, filter: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let port = match data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let filters_dir = config.get_string_or("filter", "filters_dir", "filters");
    let filter_name = filter
        .map(str::to_string)
        .unwrap_or_else(|| config.get_string_or("filter", "default_filter", "default"));
    let filter_path = resolve_document(&filters_dir, &filter_name);
    eprintln!("Loading filter from {}", filter_path.display());

    match apply_filter(&port, &filter_path) {
        Ok((total, kept)) => {
            eprintln!("{} of {total} securities activated", kept.len());
            for symbol in kept {
                println!("{symbol}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Applies the filter chain at `path` to every security and persists the
/// survivors as the activated set.
pub fn apply_filter(
    port: &dyn DataPort,
    path: &Path,
) -> Result<(usize, Vec<String>), RuletraderError> {
    let chain = load_filter_chain(path, &Registry::default())?;
    let securities = port.list_securities()?;
    let total = securities.len();
    let kept: Vec<String> = chain
        .apply(securities, port)?
        .into_iter()
        .map(|s| s.symbol)
        .collect();
    port.set_activated(&kept)?;
    Ok((total, kept))
}

fn run_show(what: ShowTarget, config_path: Option<&Path>) -> ExitCode {
    if let Some(family) = what.family() {
        for key in Registry::default().keys(family) {
            println!("{key}");
        }
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = config_path else {
        eprintln!("error: --config is required to show securities");
        return ExitCode::from(2);
    };
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let securities = match data_port(&config).and_then(|p| p.list_securities()) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let active: Vec<&Security> = securities.iter().filter(|s| s.activated).collect();
    for s in &active {
        println!("{}\t{}\t{}\t{}", s.symbol, s.name, s.sector, s.market);
    }
    eprintln!("{} activated securities", active.len());
    ExitCode::SUCCESS
}

fn run_export_indicators(
    config_path: &Path,
    symbol: &str,
    specs: &[String],
    output: Option<&Path>,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let port = match data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let range = match config_validation::date_range(&config) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let writer: Box<dyn Write> = match output {
        Some(path) => match fs::File::create(path) {
            Ok(f) => Box::new(f),
            Err(e) => return fail(&RuletraderError::from(e)),
        },
        None => Box::new(io::stdout().lock()),
    };

    match export_indicators(&port, symbol, specs, range, writer) {
        Ok(rows) => {
            eprintln!("{rows} rows written");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Splits `KEY:k=v,k=v` into the registry key and its parameters.
pub fn parse_indicator_spec(spec: &str) -> Result<(&str, Params), RuletraderError> {
    match spec.split_once(':') {
        Some((key, pairs)) => Ok((key.trim(), parse_pairs(pairs)?)),
        None => Ok((spec.trim(), Params::new())),
    }
}

/// Writes `date` plus one column per indicator for `symbol`. Missing values
/// are left empty. Returns the number of rows written.
pub fn export_indicators(
    port: &dyn DataPort,
    symbol: &str,
    specs: &[String],
    range: DateRange,
    writer: impl Write,
) -> Result<usize, RuletraderError> {
    let registry = Registry::default();
    let mut security = port
        .list_securities()?
        .into_iter()
        .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| RuletraderError::Data {
            reason: format!("unknown symbol {symbol}"),
        })?;
    security.set_date_range(range)?;
    security.load_bars(port)?;
    let security = Rc::new(security);

    let mut engine = IndicatorEngine::default();
    let mut indicators: Vec<Indicator> = Vec::with_capacity(specs.len());
    for spec in specs {
        let (key, params) = parse_indicator_spec(spec)?;
        let kind = registry.new_indicator(key, &params)?;
        indicators.push(engine.build(&security, kind)?);
    }

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(indicators.iter().map(|i| i.kind().to_string()));
    wtr.write_record(&header)?;

    for (idx, bar) in security.bars().iter().enumerate() {
        let mut row = vec![bar.date.format("%Y-%m-%d").to_string()];
        row.extend(
            indicators
                .iter()
                .map(|i| i.value_at(idx).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(security.len())
}
