// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use bwsync::config::{self, ProgramFile};
use bwsync::options::Options;
use bwsync::presets;
use bwsync::program::Program;
use bwsync::render;
use bwsync::session::{Session, SessionEvent, RELEASE_DELAY};
use bwsync::util::{duration_minutes_seconds, seconds};
use clap::{crate_version, Args, Parser, Subcommand};
use duration_string::DurationString;

/// Rows in the beat table printed by `show`.
const TABLE_ROWS: usize = 10;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A brainwave entrainment player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

/// Where a program comes from: a YAML file or one of the built-in presets.
#[derive(Args)]
struct ProgramSource {
    /// The path to a program file.
    #[arg(required_unless_present = "preset", conflicts_with = "preset")]
    program_path: Option<PathBuf>,
    /// The built-in preset to use instead of a program file.
    #[arg(short, long)]
    preset: Option<usize>,
}

impl ProgramSource {
    fn load(&self) -> Result<(ProgramFile, Program, Options), Box<dyn Error>> {
        if let Some(path) = &self.program_path {
            return Ok(config::load_program(path)?);
        }

        let index = self.preset.unwrap_or(1);
        let file = presets::get(index).ok_or_else(|| {
            format!(
                "no preset {}, expected 1 to {}",
                index,
                presets::PRESET_COUNT
            )
        })?;
        let program = file.to_program()?;
        let options = file.to_options()?;
        Ok((file, program, options))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Prints a program and its beat frequency over time.
    Show {
        #[command(flatten)]
        source: ProgramSource,
    },
    /// Renders a program to a WAV file.
    Render {
        #[command(flatten)]
        source: ProgramSource,
        /// Where to write the file. Defaults to a name derived from the program.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overrides the program's sample rate.
        #[arg(short, long)]
        sample_rate: Option<u32>,
    },
    /// Plays a program through the audio interface.
    Play {
        /// The device name to play through.
        device_name: String,
        #[command(flatten)]
        source: ProgramSource,
        /// How far into the program to start, e.g. 5m30s.
        #[arg(long)]
        offset: Option<String>,
    },
    /// Prints a built-in preset as a program file, or saves it with --output.
    Preset {
        /// The preset number.
        index: usize,
        /// Where to save the program file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = bwsync::audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Show { source } => {
            let (file, program, options) = source.load()?;
            let total = program.total_duration();

            println!("{}", file.name());
            if !file.description().is_empty() {
                println!("{}", file.description());
            }
            println!("Program: {}", program);
            println!(
                "Carrier: {:.1}Hz, mode: {}, at end: {}",
                options.carrier_hz(),
                options.beat_mode(),
                options.end_action()
            );
            println!("Length: {}\n", duration_minutes_seconds(seconds(total)));

            for row in 0..=TABLE_ROWS {
                let elapsed = total * row as f64 / TABLE_ROWS as f64;
                println!(
                    "{:>8}  {:>6.2}Hz",
                    duration_minutes_seconds(seconds(elapsed)),
                    program.beat_at(elapsed)
                );
            }
        }
        Commands::Render {
            source,
            output,
            sample_rate,
        } => {
            let (file, program, mut options) = source.load()?;
            if let Some(sample_rate) = sample_rate {
                if sample_rate == 0 {
                    return Err("sample rate must be positive".into());
                }
                options = options.with_sample_rate(sample_rate);
            }
            let path = output.unwrap_or_else(|| {
                PathBuf::from(render::export_file_name(file.name(), options.beat_mode()))
            });

            let buffer = render::render_to_file(&program, &options, &path)?;
            println!(
                "Wrote {} ({} frames at {}Hz).",
                path.display(),
                buffer.frames(),
                buffer.sample_rate()
            );
        }
        Commands::Play {
            device_name,
            source,
            offset,
        } => {
            let (file, program, options) = source.load()?;
            let offset = match offset {
                Some(offset) => Duration::from(DurationString::from_string(offset)?).as_secs_f64(),
                None => 0.0,
            };

            let device = bwsync::audio::get_device(
                config::Audio::new(&device_name).with_sample_rate(options.sample_rate()),
            )?;
            let session = Session::new(program, options, device);
            let events = session.subscribe();
            session.start(offset)?;
            println!("Playing {}. Press Ctrl-C to stop.", file.name());

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            let mut readout = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    result = &mut ctrl_c => {
                        result?;
                        session.stop()?;
                        break;
                    }
                    _ = readout.tick() => {
                        if events.try_iter().any(|event| event == SessionEvent::Finished) {
                            println!("Program finished.");
                            break;
                        }
                        println!(
                            "{}  {:.2}Hz",
                            duration_minutes_seconds(seconds(session.elapsed())),
                            session.beat_now()
                        );
                    }
                }
            }

            // Let the fade out finish before the process exits.
            tokio::time::sleep(RELEASE_DELAY).await;
        }
        Commands::Preset { index, output } => {
            let file = presets::get(index).ok_or_else(|| {
                format!(
                    "no preset {}, expected 1 to {}",
                    index,
                    presets::PRESET_COUNT
                )
            })?;
            match output {
                Some(path) => {
                    file.save(&path)?;
                    println!("Saved {} to {}.", file.name(), path.display());
                }
                None => print!("{}", file.to_yaml()?),
            }
        }
    }

    Ok(())
}
