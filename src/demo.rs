use std::io::Write;
use std::time::Duration;
use indicatif::{ParallelProgressIterator, ProgressStyle};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use tracing::info;

use crate::{
    error::AppError,
    harness::{self, HarnessError, HarnessSettings, RunReport},
    misc::*,
    parse::parse,
    DemoOpts,
    StressOpts
};

pub fn print_default_settings() -> Result<(), AppError>
{
    let json = serde_json::to_string_pretty(&HarnessSettings::default())?;
    println!("{json}");
    Ok(())
}

pub fn execute_demo(opts: DemoOpts) -> Result<(), AppError>
{
    let (mut settings, _): (HarnessSettings, _) = parse(opts.json.as_ref())?;
    opts.apply(&mut settings);

    let report = harness::run(&settings)?;
    for (i, values) in report.pushed.iter().enumerate(){
        println!("producer-{i} pushed {values:?}");
    }
    for (i, values) in report.popped.iter().enumerate(){
        println!("consumer-{i} popped {values:?}");
    }
    println!("{report}");
    report.verify()?;

    if let Some(out) = opts.out{
        let mut buf = create_buf(out.as_std_path())?;
        write_report(&mut buf, &report)?;
        buf.flush()?;
        info!("report written to {out}");
    }
    Ok(())
}

/// Version and command comments, the effective settings as a json comment
/// line, then the report itself as pretty json.
pub fn write_report<W: Write>(mut w: W, report: &RunReport) -> Result<(), AppError>
{
    write_commands_and_version(&mut w)?;
    write_json(&mut w, &serde_json::to_value(&report.settings)?)?;
    serde_json::to_writer_pretty(&mut w, report)?;
    writeln!(w)?;
    Ok(())
}

#[derive(Debug)]
pub struct RoundResult{
    pub round: usize,
    pub seed: u64,
    pub pushed: usize,
    pub elapsed: Duration
}

/// Runs `rounds` verified workloads, `threads` of them at the same time.
///
/// Every round gets its own queue and its own workers, the seeds are derived
/// from `settings.seed`.
pub fn stress_rounds(
    settings: &HarnessSettings,
    rounds: usize,
    threads: usize
) -> Result<Vec<RoundResult>, AppError>
{
    let settings = settings.clone().without_delays();
    settings.validate()?;

    let mut seeding_rng = Pcg64::seed_from_u64(settings.seed);
    let jobs = (0..rounds)
        .map(
            |round|
            {
                let mut s = settings.clone();
                s.seed = seeding_rng.gen();
                (round, s)
            }
        ).collect_vec();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise} - {eta_precise}] {wide_bar} {pos}/{len}")?;

    let results = pool.install(
        ||
        {
            jobs.into_par_iter()
                .progress_with_style(style)
                .map(
                    |(round, s)| -> Result<RoundResult, HarnessError>
                    {
                        let report = harness::run(&s)?;
                        report.verify()?;
                        Ok(
                            RoundResult{
                                round,
                                seed: s.seed,
                                pushed: report.total_pushed(),
                                elapsed: report.elapsed
                            }
                        )
                    }
                ).collect::<Result<Vec<_>, _>>()
        }
    )?;
    Ok(results)
}

pub fn execute_stress(opts: StressOpts) -> Result<(), AppError>
{
    let (settings, json): (HarnessSettings, _) = parse(opts.json.as_ref())?;
    let results = stress_rounds(&settings, opts.rounds.get(), opts.j.get())?;

    let total: usize = results.iter().map(|r| r.pushed).sum();
    let slowest = results.iter()
        .map(|r| r.elapsed)
        .max()
        .unwrap_or_default();
    println!(
        "{} rounds verified, {total} values passed through the queue, slowest round took {}",
        results.len(),
        humantime::format_duration(Duration::from_micros(slowest.as_micros() as u64))
    );

    if let Some(out) = opts.out{
        let mut buf = create_buf_with_command_and_version(&out)?;
        write_json(&mut buf, &json)?;
        writeln!(buf, "#round seed pushed elapsed_ms")?;
        for r in results.iter(){
            writeln!(
                buf,
                "{} {} {} {}",
                r.round,
                r.seed,
                r.pushed,
                r.elapsed.as_secs_f64() * 1e3
            )?;
        }
        buf.flush()?;
        info!("round table written to {out}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;

    #[test]
    #[timeout(30000)]
    fn every_round_is_verified_and_in_order()
    {
        let settings = HarnessSettings{
            producers: 3,
            consumers: 2,
            items_per_producer: 50,
            ..HarnessSettings::default()
        };
        let results = stress_rounds(&settings, 8, 3).unwrap();
        assert_eq!(results.len(), 8);
        assert!(results.iter().map(|r| r.round).eq(0..8));
        assert!(results.iter().all(|r| r.pushed == 150));
        assert_eq!(results.iter().map(|r| r.seed).unique().count(), 8);
    }

    #[test]
    fn invalid_settings_fail_before_any_round()
    {
        let settings = HarnessSettings{ consumers: 0, ..HarnessSettings::default() };
        let res = stress_rounds(&settings, 4, 2);
        assert!(matches!(res, Err(AppError::Harness(HarnessError::InvalidSettings(_)))));
    }

    #[test]
    #[timeout(10000)]
    fn demo_report_starts_with_header()
    {
        let settings = HarnessSettings::default().without_delays();
        let report = harness::run(&settings).unwrap();
        let mut out = Vec::new();
        write_report(&mut out, &report).unwrap();
        let out = String::from_utf8(out).unwrap();

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(format!("# {VERSION}").as_str()));
        assert!(lines.next().unwrap().starts_with("# Git Hash: "));
        assert!(lines.next().unwrap().starts_with('#'));
        let settings_line = lines.next().unwrap();
        let written: HarnessSettings = serde_json::from_str(&settings_line[1..]).unwrap();
        assert_eq!(written, settings);

        let body = lines.collect_vec().join("\n");
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["leftover"], 0);
        assert_eq!(json["pushed"].as_array().unwrap().len(), 2);
    }
}
