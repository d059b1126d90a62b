/*!
 * Command-line interface for codeflat
 */

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use codeflat::config::{Args, Config};
use codeflat::flattener::Flattener;
use codeflat::report::{ReportFormat, Reporter};

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Parse command line arguments
    let args = Args::parse();

    if let Some(shell) = args.generate {
        let mut command = Args::command();
        clap_complete::generate(shell, &mut command, "codeflat", &mut io::stdout());
        return Ok(());
    }

    let quiet = args.quiet;

    // Create and validate configuration
    let config = Config::from_args(args);
    config.validate()?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:.bold.cyan} {wide_msg:.dim.white} {pos}/{len} ({percent}%) {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    };
    progress.set_prefix("Flattening");
    progress.set_message(format!("Scanning {}", config.root.display()));

    let flattener = Flattener::new(config, Arc::new(progress.clone()));
    let report = flattener.run()?;

    progress.finish_and_clear();

    if quiet {
        println!("{}", report.output_file);
    } else {
        Reporter::new(ReportFormat::ConsoleTable).print_report(&report);
    }

    Ok(())
}
