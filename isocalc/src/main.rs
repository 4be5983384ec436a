use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use isocalc::data::instrument::Analyzer;
use isocalc::error::{IsoError, Result};
use isocalc::settings::{Selection, Settings};
use isocalc::{isotope_pattern_with, Spectrum};

/// Isotope patterns, instrument envelopes and centroids of sum formulas.
#[derive(Parser, Debug)]
#[command(name = "isocalc", version, about)]
struct Cli {
    /// JSON settings file, command line options take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Theoretical isotope pattern of a formula
    Pattern {
        formula: String,
        /// Relative abundance threshold
        #[arg(long, conflicts_with = "coverage")]
        threshold: Option<f64>,
        /// Keep the most probable peaks until this probability is covered
        #[arg(long)]
        coverage: Option<f64>,
        #[arg(long)]
        fft_threshold: Option<f64>,
        /// Overrides the charge given in the formula
        #[arg(long, allow_hyphen_values = true)]
        charge: Option<i32>,
        /// Keep only the N most intense peaks
        #[arg(long)]
        top: Option<usize>,
    },
    /// Peaks an instrument would report for a formula
    Centroids {
        formula: String,
        #[command(flatten)]
        instrument: InstrumentArgs,
        #[arg(long)]
        min_abundance: Option<f64>,
        #[arg(long)]
        points_per_fwhm: Option<usize>,
    },
    /// Instrument envelope of a formula sampled on a regular grid
    Envelope {
        formula: String,
        #[command(flatten)]
        instrument: InstrumentArgs,
        #[arg(long)]
        from: f64,
        #[arg(long)]
        to: f64,
        #[arg(long)]
        step: f64,
    },
}

#[derive(clap::Args, Debug)]
struct InstrumentArgs {
    /// orbitrap, fticr or tof
    #[arg(long)]
    analyzer: Option<Analyzer>,
    #[arg(long)]
    resolving_power: Option<f64>,
    /// m/z at which the resolving power is given
    #[arg(long)]
    at_mz: Option<f64>,
}

impl InstrumentArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(analyzer) = self.analyzer {
            settings.instrument.analyzer = analyzer;
        }
        if let Some(resolving_power) = self.resolving_power {
            settings.instrument.resolving_power = resolving_power;
        }
        if let Some(at_mz) = self.at_mz {
            settings.instrument.at_mz = at_mz;
        }
    }
}

#[derive(Serialize)]
struct Peak {
    mz: f64,
    intensity: f64,
}

#[derive(Serialize)]
struct Output<'a> {
    formula: &'a str,
    kind: String,
    peaks: Vec<Peak>,
}

fn print_spectrum(formula: &str, spectrum: &Spectrum) -> Result<()> {
    let output = Output {
        formula,
        kind: spectrum.kind().to_string(),
        peaks: spectrum.peaks().map(|(mz, intensity)| Peak { mz, intensity }).collect(),
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| IsoError::InvalidInput(format!("cannot serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };

    match args.command {
        Command::Pattern { formula, threshold, coverage, fft_threshold, charge, top } => {
            if let Some(threshold) = threshold {
                settings.isotope.selection = Selection::Threshold { threshold, relative: true };
            }
            if let Some(desired_prob) = coverage {
                settings.isotope.selection = Selection::Coverage { desired_prob };
            }
            if let Some(fft_threshold) = fft_threshold {
                settings.isotope.fft_threshold = fft_threshold;
            }
            if charge.is_some() {
                settings.isotope.charge = charge;
            }
            settings.validate()?;

            let mut pattern = isotope_pattern_with(&formula, &settings.isotope)?;
            if let Some(n) = top {
                pattern.trim(n);
            }
            info!("{}: {} peaks", formula, pattern.len());
            print_spectrum(&formula, &pattern)
        }
        Command::Centroids { formula, instrument, min_abundance, points_per_fwhm } => {
            instrument.apply(&mut settings);
            if let Some(min_abundance) = min_abundance {
                settings.centroid.min_abundance = min_abundance;
            }
            if let Some(points_per_fwhm) = points_per_fwhm {
                settings.centroid.points_per_fwhm = points_per_fwhm;
            }
            settings.validate()?;

            let model = settings.instrument.model()?;
            let pattern = isotope_pattern_with(&formula, &settings.isotope)?;
            let centroids = pattern.envelope_centroids(&model, &settings.centroid)?;
            info!("{}: {} centroids at R = {} ({})", formula, centroids.len(), model.resolving_power(), model.analyzer());
            print_spectrum(&formula, &centroids)
        }
        Command::Envelope { formula, instrument, from, to, step } => {
            instrument.apply(&mut settings);
            settings.validate()?;

            let model = settings.instrument.model()?;
            let pattern = isotope_pattern_with(&formula, &settings.isotope)?;
            let profile = pattern.envelope(&model)?.rasterize(from, to, step)?;
            print_spectrum(&formula, &profile)
        }
    }
}
