use std::num::NonZeroUsize;
use clap::Parser;
use camino::Utf8PathBuf;

use crate::harness::HarnessSettings;

#[derive(Parser)]
#[command(author, version, about)]
pub enum Exec{
    /// Run the producers and consumers once, pauses included
    Demo(DemoOpts),
    /// Repeat the workload without pauses and verify every round
    Stress(StressOpts),
    /// Print the default settings as json
    DefaultSettings
}

#[derive(Parser)]
pub struct DemoOpts{
    #[arg(long, short)]
    /// Settings json, defaults are used otherwise
    pub json: Option<Utf8PathBuf>,

    #[arg(long, short)]
    /// Write the run report as json
    pub out: Option<Utf8PathBuf>,

    #[arg(long, short)]
    pub producers: Option<usize>,

    #[arg(long, short)]
    pub consumers: Option<usize>,

    #[arg(long, short)]
    /// Values pushed by every producer
    pub items: Option<usize>
}

impl DemoOpts{
    /// Command line values win over the json file
    pub fn apply(&self, settings: &mut HarnessSettings)
    {
        if let Some(producers) = self.producers{
            settings.producers = producers;
        }
        if let Some(consumers) = self.consumers{
            settings.consumers = consumers;
        }
        if let Some(items) = self.items{
            settings.items_per_producer = items;
        }
    }
}

#[derive(Parser)]
pub struct StressOpts{
    #[arg(long)]
    /// Settings json, defaults are used otherwise
    pub json: Option<Utf8PathBuf>,

    #[arg(long, short, default_value = "100")]
    pub rounds: NonZeroUsize,

    #[arg(short, default_value = "4")]
    /// Number of rounds running at the same time
    pub j: NonZeroUsize,

    #[arg(long, short)]
    /// Write one line per round into this file
    pub out: Option<Utf8PathBuf>
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent()
    {
        Exec::command().debug_assert();
    }

    #[test]
    fn demo_overrides_json_values()
    {
        let Exec::Demo(opts) = Exec::parse_from(["mt_queue_demo", "demo", "-p", "4", "--items", "3"]) else {
            panic!("expected demo subcommand");
        };
        let mut settings = HarnessSettings::default();
        opts.apply(&mut settings);
        assert_eq!(settings.producers, 4);
        assert_eq!(settings.consumers, 2);
        assert_eq!(settings.items_per_producer, 3);
    }

    #[test]
    fn stress_defaults()
    {
        let Exec::Stress(opts) = Exec::parse_from(["mt_queue_demo", "stress"]) else {
            panic!("expected stress subcommand");
        };
        assert_eq!(opts.rounds.get(), 100);
        assert_eq!(opts.j.get(), 4);
        assert!(opts.out.is_none());
    }
}
