//! End-to-end: topology files in, composited frame colors out.

use std::time::Duration;

use ledloom::{
    Color, EffectExt, EffectsManager, EffectsRunner, Executor, Keyframe, MiddlewareFn,
    effects::{FadeTransition, Monochrome},
    schedule::MediaClock,
    topology::{self, TopologySources},
};

const POSITIONS: &str = "\
{1}
0. {0.0, 0.0, 0.0}
1. {1.0, 0.0, 0.0}
2. {2.0, 0.0, 0.0}
";

// Cross-link between the chain's endpoints.
const ADJACENCY: &str = "0.0, 0.0, 0.0, 2.0, 0.0, 0.0\n";

fn line_system() -> ledloom::System {
    topology::build(&TopologySources {
        positions: POSITIONS,
        adjacency: ADJACENCY,
        controllers: None,
    })
    .unwrap()
}

#[test]
fn topology_links_runs_and_adjacency_edges() {
    let sys = line_system();
    assert_eq!(sys.len(), 3);

    // path edges plus the extra endpoint edge
    assert_eq!(sys.leds()[0].neighbors.len(), 2);
    assert_eq!(sys.leds()[1].neighbors.len(), 2);
    assert_eq!(sys.leds()[2].neighbors.len(), 2);
    for led in sys.leds() {
        for &n in &led.neighbors {
            assert!(sys.leds()[n].neighbors.contains(&led.id));
        }
    }

    // normalized onto the unit segment
    let xs: Vec<f64> = sys.leds().iter().map(|l| l.x).collect();
    assert_eq!(xs, vec![0.0, 0.5, 1.0]);
}

#[test]
fn layers_composite_through_the_executor() {
    let sys = line_system();

    let keyframes = vec![
        Keyframe::new(
            "base",
            Duration::ZERO,
            Duration::from_secs(2),
            0,
            Monochrome::new(Color::new(1.0, 0.0, 0.0)).boxed(),
        ),
        Keyframe::new(
            "fade",
            Duration::ZERO,
            Duration::from_secs(2),
            1,
            FadeTransition::fade_in().boxed(),
        ),
    ];
    let manager = EffectsManager::new(keyframes).unwrap();

    // a frozen media clock pins the play head at the 1s mark
    let clock: MediaClock = Box::new(|| Ok(Duration::from_secs(1)));
    let mut executor = Executor::new(sys, 40);
    executor.push(Box::new(EffectsRunner::with_clock(manager, clock)));

    let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = captured.clone();
    executor.push(Box::new(MiddlewareFn(
        move |system: &mut ledloom::System, next: ledloom::Next<'_>| {
            sink.lock()
                .unwrap()
                .extend(system.leds().iter().map(|l| l.color));
            next(system)
        },
    )));

    executor.tick().unwrap();

    let colors = captured.lock().unwrap();
    assert_eq!(colors.len(), 3);
    for color in colors.iter() {
        assert!((color.r - 0.5).abs() < 1e-9);
        assert_eq!(color.g, 0.0);
        assert_eq!(color.b, 0.0);
    }
}

#[test]
fn show_past_its_end_wraps_to_the_start() {
    let sys = line_system();
    let keyframes = vec![Keyframe::new(
        "solid",
        Duration::ZERO,
        Duration::from_secs(1),
        0,
        Monochrome::new(Color::new(0.0, 1.0, 0.0)).boxed(),
    )];
    let mut manager = EffectsManager::new(keyframes).unwrap();
    let mut sys = sys;

    manager.evaluate(&mut sys, Duration::from_millis(3500));
    assert_eq!(sys.leds()[0].color, Color::new(0.0, 1.0, 0.0));
}
