extern crate ecgstream;
#[macro_use]
extern crate failure_derive;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::thread::{sleep, spawn};

use clap::{Parser, Subcommand, ValueEnum};
use failure::Error;
use log::{info, warn};
use rand::Rng;
use threadpool::ThreadPool;

use ecgstream::debug::{write_trace, TracePoint};
use ecgstream::decoder::{self, Sample, SAMPLE_BYTES};
use ecgstream::{Config, DetectorKind, DualSlope, Event, Pipeline, Session, Strategy};

// points kept by the chart on the rendering side
const DISPLAY_POINTS: usize = 100;

#[derive(Parser)]
#[command(name = "ecgstream", about = "Beat detection and heart rate from sensor captures")]
struct Opts {
    /// JSON configuration, defaults are used for missing fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic capture with QRS-like pulses
    Synth {
        out: PathBuf,
        #[arg(long, default_value_t = 72.0)]
        bpm: f32,
        #[arg(long, default_value_t = 30.0)]
        seconds: f32,
        #[arg(long, default_value_t = 0.02)]
        noise: f32,
    },
    /// Feed a capture through the detection pipeline
    Replay {
        capture: PathBuf,
        #[arg(long, value_enum)]
        detector: Option<Detector>,
        /// samples per simulated notification
        #[arg(long, default_value_t = 4)]
        packet: usize,
        /// pace packets at the sample rate through a live session
        #[arg(long)]
        realtime: bool,
        /// write a gnuplot trace of raw, filtered and beats
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Offline dual-slope detection over several captures in parallel
    Batch {
        #[arg(required = true)]
        captures: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Detector {
    Threshold,
    DualSlope,
}

impl From<Detector> for DetectorKind {
    fn from(d: Detector) -> DetectorKind {
        match d {
            Detector::Threshold => DetectorKind::Threshold,
            Detector::DualSlope => DetectorKind::DualSlope,
        }
    }
}

#[derive(Debug, Fail)]
#[fail(display = "invalid argument: {}", _0)]
struct UsageError(String);

fn synth(config: &Config, out: &Path, bpm: f32, seconds: f32, noise: f32) -> Result<(), Error> {
    let fs = config.sample_rate;
    if !(bpm > 0.0 && bpm <= 60.0 * fs) {
        return Err(UsageError(format!("--bpm {} outside (0, {}] at {} Hz", bpm, 60.0 * fs, fs)).into());
    }
    if !(noise >= 0.0) {
        return Err(UsageError(format!("--noise {} must not be negative", noise)).into());
    }
    let n = (seconds * fs) as usize;
    let period = usize::max((60.0 * fs / bpm).round() as usize, 1);
    let half_width = usize::max(2, (0.024 * fs) as usize);
    let mut rng = rand::thread_rng();

    let samples: Vec<Sample> = (0..n)
        .map(|i| {
            let t = i as f32 / fs;
            // baseline wander the band-pass has to remove
            let mut value = 0.1 * (2.0 * std::f32::consts::PI * 0.3 * t).sin();
            let phase = i % period;
            if phase < 2 * half_width {
                let d = phase as f32 - half_width as f32;
                value += 1.0 - d.abs() / half_width as f32;
            }
            if noise > 0.0 {
                value += rng.gen_range(-noise..noise);
            }
            Sample::new(i as u32, value)
        })
        .collect();

    fs::write(out, decoder::encode(&samples))?;
    info!(
        "wrote {} samples ({} bpm at {} Hz) to {}",
        samples.len(),
        bpm,
        fs,
        out.display()
    );
    Ok(())
}

fn report(event: &Event) {
    match *event {
        Event::Beat { beat, bpm } => match bpm {
            Some(bpm) => println!(
                "beat {:>8} ts {:>10} slot {:>3} bpm {}",
                beat.position,
                beat.timestamp,
                beat.slot(DISPLAY_POINTS),
                bpm
            ),
            None => println!(
                "beat {:>8} ts {:>10} slot {:>3} bpm -",
                beat.position,
                beat.timestamp,
                beat.slot(DISPLAY_POINTS)
            ),
        },
        Event::Overrun { discarded } => println!("overrun, {} samples dropped", discarded),
    }
}

fn replay_live(config: &Config, bytes: &[u8], packet: usize) -> Result<(), Error> {
    let (tx, rx) = channel();
    let mut session = Session::start(config, Strategy::from_config(config)?, tx)?;
    let printer = spawn(move || {
        let mut beats = 0;
        for event in rx.iter() {
            if let Event::Beat { .. } = event {
                beats += 1;
            }
            report(&event);
        }
        beats
    });

    let period = config.tick_period();
    for chunk in bytes.chunks(packet * SAMPLE_BYTES) {
        session.feed(chunk)?;
        sleep(period * packet as u32);
    }
    while session.queued() > 0 && session.is_running() {
        sleep(period);
    }
    session.stop();
    drop(session);

    match printer.join() {
        Ok(beats) => info!("{} beats reported", beats),
        Err(_) => warn!("event printer panicked"),
    }
    Ok(())
}

fn replay_offline(config: &Config, bytes: &[u8], plot: Option<&Path>) -> Result<(), Error> {
    let mut pipeline = Pipeline::new(config, Strategy::from_config(config)?)?;
    let mut trace = vec![];
    let mut beats = 0;

    for sample in decoder::decode(bytes) {
        let events = pipeline.process(sample);
        for event in events.iter() {
            report(event);
        }
        beats += events.len();
        if plot.is_some() {
            trace.push(TracePoint {
                position: pipeline.position() - 1,
                raw: sample.value,
                filtered: pipeline.filtered(),
                beat: false,
            });
        }
        // beats may be reported behind the live position
        for event in events {
            if let Event::Beat { beat, .. } = event {
                if let Some(point) = trace.get_mut(beat.position as usize) {
                    point.beat = true;
                }
            }
        }
    }

    info!(
        "{} beats in {} samples, final bpm {:?}",
        beats,
        pipeline.position(),
        pipeline.bpm()
    );
    if let Some(path) = plot {
        write_trace(path, &trace)?;
        info!("trace written to {}", path.display());
    }
    Ok(())
}

struct Summary {
    beats: usize,
    bpm: Option<f32>,
}

fn summarize(config: &Config, path: &Path) -> Result<Summary, Error> {
    let samples = decoder::decode(&fs::read(path)?);
    let values: Vec<f32> = samples.iter().map(|s| s.value).collect();
    let peaks = DualSlope::new(config).detect_batch(&values);
    let bpm = if peaks.len() > 1 {
        let span = peaks[peaks.len() - 1].saturating_sub(peaks[0]) as f32;
        let mean_rr = span / (peaks.len() - 1) as f32;
        Some(60.0 * config.sample_rate / mean_rr)
    } else {
        None
    };
    Ok(Summary {
        beats: peaks.len(),
        bpm: bpm,
    })
}

fn batch(config: &Config, captures: Vec<PathBuf>) {
    let pool = ThreadPool::new(num_cpus::get());
    let (tx, rx) = channel();
    let jobs = captures.len();

    for path in captures {
        let tx = tx.clone();
        let config = config.clone();
        pool.execute(move || {
            let summary = summarize(&config, &path);
            // the receiver outlives the pool
            let _ = tx.send((path, summary));
        });
    }

    for (path, summary) in rx.iter().take(jobs) {
        match summary {
            Ok(Summary { beats, bpm: Some(bpm) }) => {
                println!("{}: {} beats, mean {:.1} bpm", path.display(), beats, bpm)
            }
            Ok(Summary { beats, bpm: None }) => println!("{}: {} beats", path.display(), beats),
            Err(e) => println!("{}: {}", path.display(), e),
        }
    }
    pool.join();
}

fn run(opts: Opts) -> Result<(), Error> {
    let mut config = match opts.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match opts.command {
        Command::Synth {
            out,
            bpm,
            seconds,
            noise,
        } => synth(&config, &out, bpm, seconds, noise),
        Command::Replay {
            capture,
            detector,
            packet,
            realtime,
            plot,
        } => {
            if let Some(detector) = detector {
                config.detector = detector.into();
            }
            let bytes = fs::read(&capture)?;
            if realtime {
                replay_live(&config, &bytes, usize::max(packet, 1))
            } else {
                replay_offline(&config, &bytes, plot.as_ref().map(|p| p.as_path()))
            }
        }
        Command::Batch { captures } => {
            batch(&config, captures);
            Ok(())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Opts::parse()) {
        eprintln!("error: {}", e);
        for cause in e.iter_causes() {
            eprintln!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
