use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::info;

use ledloom::{
    Color, Ease, EffectExt, EffectsManager, EffectsRunner, Executor, Keyframe, ShowConfig, System,
    effect::SystemEffect,
    effects::{FadeTransition, Rainbow, Sparkle},
    executor::FrameTimer,
    output::{OutputMiddleware, debug::DebugServer, hardware::HardwareOutput},
    timeline::{self, Generator, Template},
    topology::{self, TopologySources},
};

#[derive(Parser)]
#[command(name = "ledloom", version, about = "LED installation render engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the topology files and print a summary.
    Check {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Render the show.
    Run {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => check(&config),
        Command::Run { config } => run(&config),
    }
}

fn load_system(config: &ShowConfig) -> Result<System> {
    let positions = fs::read_to_string(&config.positions)
        .with_context(|| format!("reading {}", config.positions.display()))?;
    let adjacency = fs::read_to_string(&config.adjacency)
        .with_context(|| format!("reading {}", config.adjacency.display()))?;
    let controllers = config
        .controllers
        .as_ref()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        })
        .transpose()?;

    let system = topology::build(&TopologySources {
        positions: &positions,
        adjacency: &adjacency,
        controllers: controllers.as_deref(),
    })?;
    Ok(system)
}

fn check(config_path: &PathBuf) -> Result<()> {
    let config = ShowConfig::load(config_path)?;
    let system = load_system(&config)?;

    let edges: usize = system.leds().iter().map(|l| l.neighbors.len()).sum();
    let max_degree = system
        .leds()
        .iter()
        .map(|l| l.neighbors.len())
        .max()
        .unwrap_or(0);
    println!("leds:        {}", system.len());
    println!("edges:       {}", edges / 2);
    println!("max degree:  {max_degree}");
    println!("controllers: {}", system.controllers().len());
    for (ip, controller) in system.controllers() {
        println!(
            "  {ip}: {} chains, {} leds",
            controller.chains.len(),
            controller.total_leds()
        );
    }
    Ok(())
}

fn run(config_path: &PathBuf) -> Result<()> {
    let config = ShowConfig::load(config_path)?;
    let system = load_system(&config)?;
    info!(leds = system.len(), "topology built");

    let keyframes = match &config.timings {
        Some(path) => {
            let sheet =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let timings = timeline::parse_timings(&sheet)?;
            info!(segments = timings.len(), "timing sheet loaded");
            generator().generate(&timings, config.seed.unwrap_or(0))
        }
        None => demo_show(),
    };
    info!(keyframes = keyframes.len(), "show assembled");

    let mut executor = Executor::new(system, config.frame_rate);
    executor.push(Box::new(FrameTimer::new()));
    executor.push(Box::new(EffectsRunner::new(EffectsManager::new(
        keyframes,
    )?)));
    if let Some(listen) = &config.debug_listen {
        executor.push(Box::new(OutputMiddleware(DebugServer::bind(listen)?)));
    }
    if let Some(hardware) = &config.hardware {
        executor.push(Box::new(OutputMiddleware(HardwareOutput::new(
            executor.system(),
            &hardware.bind,
            hardware.target_port,
        )?)));
    }

    // Runs until the process is killed.
    let (_keepalive, cancel) = crossbeam_channel::bounded::<()>(1);
    executor.run(&cancel)?;
    Ok(())
}

/// Wraps a segment's main effect with its fade envelope: the effect spans
/// the whole segment on layer 0, the fades sit above it on layer 10.
fn enveloped(
    label: &str,
    main: Box<dyn ledloom::Effect>,
    fade_in: Duration,
    effect: Duration,
    fade_out: Duration,
) -> Vec<Keyframe> {
    let total = fade_in + effect + fade_out;
    let mut keyframes = vec![Keyframe::new(label, Duration::ZERO, total, 0, main)];
    if !fade_in.is_zero() {
        keyframes.push(Keyframe::new(
            format!("{label}/fade-in"),
            Duration::ZERO,
            fade_in,
            10,
            FadeTransition::fade_in().eased(Ease::OutQuad).boxed(),
        ));
    }
    if !fade_out.is_zero() {
        keyframes.push(Keyframe::new(
            format!("{label}/fade-out"),
            fade_in + effect,
            fade_out,
            10,
            FadeTransition::fade_out().eased(Ease::InQuad).boxed(),
        ));
    }
    keyframes
}

fn generator() -> Generator {
    let rainbow: Template = Box::new(|fade_in, effect, fade_out, _rng| {
        enveloped(
            "rainbow",
            Rainbow::new(2.0).boxed(),
            fade_in,
            effect,
            fade_out,
        )
    });
    let sparkle: Template = Box::new(|fade_in, effect, fade_out, rng| {
        let hue = rng.gen_range(0.0..360.0);
        enveloped(
            "sparkle",
            Sparkle::new(
                fade_in + effect + fade_out,
                Duration::from_millis(800),
                Duration::from_millis(400),
                Color::hsv(hue, 0.6, 1.0),
            )
            .boxed(),
            fade_in,
            effect,
            fade_out,
        )
    });
    let breathe: Template = Box::new(|fade_in, effect, fade_out, rng| {
        let hue = rng.gen_range(0.0..360.0);
        let color = Color::hsv(hue, 0.8, 0.8);
        enveloped(
            "breathe",
            SystemEffect(move |progress: f64, system: &mut System| {
                system.fill(color.scaled(progress));
            })
            .eased(Ease::InOutCubic)
            .ping_pong(4)
            .boxed(),
            fade_in,
            effect,
            fade_out,
        )
    });

    let mut generator = Generator::new();
    generator
        .add_template(rainbow)
        .add_template(sparkle)
        .add_template(breathe);
    generator
}

/// A short looping show for rigs without a timing sheet.
fn demo_show() -> Vec<Keyframe> {
    let mut show = enveloped(
        "demo/rainbow",
        Rainbow::new(1.0).boxed(),
        Duration::from_secs(2),
        Duration::from_secs(8),
        Duration::from_secs(2),
    );
    show.push(Keyframe::new(
        "demo/sparkle",
        Duration::from_secs(12),
        Duration::from_secs(8),
        0,
        Sparkle::new(
            Duration::from_secs(8),
            Duration::from_millis(800),
            Duration::from_millis(400),
            Color::new(1.0, 0.9, 0.7),
        )
        .boxed(),
    ));
    show
}
