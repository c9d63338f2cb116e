//! evaldata command line
//!
//! Lists scans of a raw source, prints metadata and data, and rebuilds the
//! cache file.

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use evaldata_io::{ReaderKind, Source, SourceConfig};
use evaldata_scan::{Scan, ScanData, ScanNumber};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("evaldata")
        .version(clap::crate_version!())
        .about("Read experimental scan data with a NeXus cache")
        .subcommand_required(true)
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .global(true)
                .help("Raw file or folder name"),
        )
        .arg(
            Arg::new("path")
                .long("path")
                .short('p')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the raw data"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML source configuration"),
        )
        .arg(
            Arg::new("reader")
                .long("reader")
                .global(true)
                .value_parser(value_parser!(ReaderKind))
                .help("Force a reader: spec, pal_xfel or nexus"),
        )
        .arg(
            Arg::new("no-nexus")
                .long("no-nexus")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Run without cache file"),
        )
        .arg(
            Arg::new("force-overwrite")
                .long("force-overwrite")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Discard the cache file and rebuild it"),
        )
        .arg(
            Arg::new("nexus-path")
                .long("nexus-path")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of the cache file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("More log output (-v debug, -vv trace)"),
        )
        .subcommand(Command::new("scans").about("List scans with status and point count"))
        .subcommand(
            Command::new("show")
                .about("Print the metadata of a scan")
                .arg(scan_arg()),
        )
        .subcommand(
            Command::new("data")
                .about("Print the data of a scan")
                .arg(scan_arg())
                .arg(
                    Arg::new("columns")
                        .long("columns")
                        .value_delimiter(',')
                        .help("Comma separated columns to print"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .action(ArgAction::SetTrue)
                        .help("Print CSV instead of a table"),
                ),
        )
        .subcommand(Command::new("cache").about("Rebuild the cache file and print the summary"))
}

fn scan_arg() -> Arg {
    Arg::new("scan")
        .required(true)
        .value_parser(value_parser!(ScanNumber))
        .help("Scan number")
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Source options from the config file and flags; flags win
fn source_config(matches: &ArgMatches) -> anyhow::Result<SourceConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SourceConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let Some(file) = matches.get_one::<String>("file") else {
                bail!("either --file or --config is required");
            };
            SourceConfig::new(file.as_str(), "./")
        }
    };

    if let Some(file) = matches.get_one::<String>("file") {
        config.file_name.clone_from(file);
    }
    if let Some(path) = matches.get_one::<PathBuf>("path") {
        config.file_path.clone_from(path);
    }
    if let Some(reader) = matches.get_one::<ReaderKind>("reader") {
        config.reader = Some(*reader);
    }
    if matches.get_flag("no-nexus") {
        config.use_nexus = false;
    }
    if matches.get_flag("force-overwrite") {
        config.force_overwrite = true;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("nexus-path") {
        config.nexus_file_path = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn render_scans(source: &Source) -> String {
    let mut out = format!("{:>6}  {:<9}  {:>6}  command\n", "#", "status", "points");
    for scan in source.scans() {
        let points = scan
            .data()
            .map_or_else(|| "-".to_string(), |d| d.len().to_string());
        let _ = writeln!(
            out,
            "{:>6}  {:<9}  {:>6}  {}",
            scan.number(),
            scan.status(),
            points,
            scan.meta().command
        );
    }
    out
}

fn render_meta(scan: &Scan) -> String {
    let meta = scan.meta();
    let mut out = format!("scan #{}\n", meta.number);
    let _ = writeln!(out, "command:   {}", meta.command);
    let _ = writeln!(out, "date:      {}", meta.date);
    let _ = writeln!(out, "time:      {}", meta.time);
    if let Some(int_time) = meta.int_time {
        let _ = writeln!(out, "int_time:  {int_time}");
    }
    let _ = writeln!(out, "status:    {}", meta.status);
    let _ = writeln!(out, "columns:   {}", meta.column_names.join(", "));
    if let Some(mca) = &meta.mca {
        let _ = writeln!(out, "mca:       {} channels ({}..{})", mca.channels, mca.start, mca.stop);
    }
    if !meta.init_motors.is_empty() {
        out.push_str("motors:\n");
        for (name, value) in &meta.init_motors {
            let _ = writeln!(out, "  {name} = {value}");
        }
    }
    out
}

fn render_data(data: &ScanData, csv: bool) -> String {
    let names: Vec<&str> = data.column_names().collect();
    let mut out = String::new();
    if csv {
        out.push_str(&names.join(","));
        out.push('\n');
        for row in data.rows() {
            let line: Vec<String> = row.iter().map(f64::to_string).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
    } else {
        for name in &names {
            let _ = write!(out, "{name:>14}");
        }
        out.push('\n');
        for row in data.rows() {
            for value in row {
                let _ = write!(out, "{value:>14}");
            }
            out.push('\n');
        }
    }
    out
}

fn run(matches: &ArgMatches) -> anyhow::Result<String> {
    let (command, args) = matches.subcommand().context("missing subcommand")?;
    let mut config = source_config(matches)?;
    if command == "cache" {
        if !config.use_nexus {
            bail!("cache needs a cache file, drop --no-nexus");
        }
        config.force_overwrite = true;
    }
    let mut source = Source::new(config)?;
    tracing::debug!("Opened {} ({}) with {} scans", source.name(), source.reader_kind(), source.len());

    match command {
        "scans" => {
            source.read_all_scan_data()?;
            Ok(render_scans(&source))
        }
        "show" => {
            let number = *args.get_one::<ScanNumber>("scan").context("missing scan number")?;
            Ok(render_meta(source.get_scan(number, false, true)?))
        }
        "data" => {
            let number = *args.get_one::<ScanNumber>("scan").context("missing scan number")?;
            let mut data = source.get_scan_data(number, true)?;
            if let Some(columns) = args.get_many::<String>("columns") {
                let columns: Vec<&String> = columns.collect();
                data = data.select(&columns)?;
            }
            Ok(render_data(&data, args.get_flag("csv")))
        }
        "cache" => {
            let file = source
                .nexus_file()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string());
            Ok(format!("{}: {}\n", file, source.last_update()))
        }
        other => bail!("unknown command '{other}'"),
    }
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));
    let output = run(&matches)?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evaldata_test_utils::spec_fixture;
    use pretty_assertions::assert_eq;

    fn run_args(args: &[&str]) -> anyhow::Result<String> {
        let matches = cli().try_get_matches_from(args)?;
        run(&matches)
    }

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = cli()
            .try_get_matches_from([
                "evaldata",
                "scans",
                "--file",
                "run.spec",
                "--path",
                "/data",
                "--no-nexus",
                "--reader",
                "spec",
            ])
            .unwrap();
        let config = source_config(&matches).unwrap();
        assert_eq!(config.raw_path(), PathBuf::from("/data/run.spec"));
        assert!(!config.use_nexus);
        assert_eq!(config.reader, Some(ReaderKind::Spec));
    }

    #[test]
    fn file_or_config_required() {
        let matches = cli().try_get_matches_from(["evaldata", "scans"]).unwrap();
        assert!(source_config(&matches).is_err());
    }

    #[test]
    fn scans_table() {
        let fixture = spec_fixture();
        let path = fixture.dir_path().to_string_lossy().into_owned();
        let out = run_args(&["evaldata", "scans", "-f", "sample.spec", "-p", &path, "--no-nexus"]).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].contains("ABORTED"));
        assert!(lines[1].trim_start().starts_with("1  OK"));
    }

    #[test]
    fn data_as_csv() {
        let fixture = spec_fixture();
        let path = fixture.dir_path().to_string_lossy().into_owned();
        let out = run_args(&[
            "evaldata", "data", "1", "-f", "sample.spec", "-p", &path, "--no-nexus", "--columns", "th,Detector",
            "--csv",
        ])
        .unwrap();
        assert_eq!(out, "th,Detector\n0,5\n0.5,7\n1,6\n");
    }

    #[test]
    fn show_and_cache() {
        let fixture = spec_fixture();
        let path = fixture.dir_path().to_string_lossy().into_owned();
        let out = run_args(&["evaldata", "show", "2", "-f", "sample.spec", "-p", &path]).unwrap();
        assert!(out.contains("command:   ascan th 0 1 3 1"));
        assert!(out.contains("Two Theta = 11"));

        let out = run_args(&["evaldata", "cache", "-f", "sample.spec", "-p", &path]).unwrap();
        assert!(out.contains("parsed 4 scans, wrote 4 to cache"));
    }

    #[test]
    fn unknown_scan_fails() {
        let fixture = spec_fixture();
        let path = fixture.dir_path().to_string_lossy().into_owned();
        assert!(run_args(&["evaldata", "show", "42", "-f", "sample.spec", "-p", &path, "--no-nexus"]).is_err());
    }
}
