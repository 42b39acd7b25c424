//! Show generation from a soundtrack timing sheet.
//!
//! The timing sheet is tab-separated with one row per cue: start seconds,
//! end seconds, cue kind. Cues come in pairs, a "fade in" followed by a
//! "fade out", and each pair delimits one song segment. The [`Generator`]
//! assigns a keyframe template to every segment, shuffling the template
//! order with a seeded RNG so a given seed always reproduces the same show.

use std::{sync::LazyLock, time::Duration};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use regex::Regex;
use tracing::warn;

use crate::{
    error::{LoomError, LoomResult},
    schedule::Keyframe,
};

static CUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9.]+)\t([0-9.]+)\t(.+)$").unwrap());

/// One song segment: when it starts and how its three phases divide it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub offset: Duration,
    pub fade_in: Duration,
    pub effect: Duration,
    pub fade_out: Duration,
}

impl Timing {
    pub fn total(&self) -> Duration {
        self.fade_in + self.effect + self.fade_out
    }
}

/// Parses the timing sheet. Rows that do not match the cue format are
/// skipped; cue pairs that run backwards are an error.
pub fn parse_timings(input: &str) -> LoomResult<Vec<Timing>> {
    let mut cues: Vec<(Duration, Duration, bool)> = Vec::new();
    for (lineno, line) in input.lines().enumerate() {
        let Some(caps) = CUE_LINE.captures(line.trim_end()) else {
            continue;
        };
        let (Ok(start), Ok(end)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
            warn!(line = lineno + 1, "unparseable cue times, row skipped");
            continue;
        };
        if end < start {
            return Err(LoomError::schedule(format!(
                "timing line {} runs backwards",
                lineno + 1
            )));
        }
        let fading_in = match caps[3].trim() {
            "fade in" => true,
            "fade out" => false,
            other => {
                warn!(line = lineno + 1, kind = other, "unknown cue kind skipped");
                continue;
            }
        };
        cues.push((
            Duration::from_secs_f64(start),
            Duration::from_secs_f64(end),
            fading_in,
        ));
    }

    if cues.len() % 2 != 0 {
        return Err(LoomError::schedule("unpaired fade cue at end of sheet"));
    }

    let mut timings = Vec::with_capacity(cues.len() / 2);
    for pair in cues.chunks_exact(2) {
        let (in_start, in_end, first_in) = pair[0];
        let (out_start, out_end, second_in) = pair[1];
        if !first_in || second_in {
            return Err(LoomError::schedule(
                "cues must alternate fade in and fade out",
            ));
        }
        let effect = out_start.checked_sub(in_end).ok_or_else(|| {
            LoomError::schedule("fade out begins before its fade in completes")
        })?;
        timings.push(Timing {
            offset: in_start,
            fade_in: in_end - in_start,
            effect,
            fade_out: out_end - out_start,
        });
    }
    Ok(timings)
}

/// Builds the keyframes for one segment. Receives the three phase
/// durations, all measured from the segment's start.
pub type Template = Box<dyn Fn(Duration, Duration, Duration, &mut StdRng) -> Vec<Keyframe> + Send>;

#[derive(Default)]
pub struct Generator {
    templates: Vec<Template>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&mut self, template: Template) -> &mut Self {
        self.templates.push(template);
        self
    }

    /// Produces the full show. Templates are dealt out in shuffled rounds;
    /// when a round ends the deck reshuffles, rejecting orders that would
    /// hand the same template to adjacent segments.
    pub fn generate(&self, timings: &[Timing], seed: u64) -> Vec<Keyframe> {
        if self.templates.is_empty() {
            warn!("generator has no templates, show will be empty");
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut deck: Vec<usize> = (0..self.templates.len()).collect();
        deck.shuffle(&mut rng);
        let mut cursor = 0;
        let mut last = None;

        let mut show = Vec::new();
        for timing in timings {
            if cursor == deck.len() {
                deck.shuffle(&mut rng);
                if deck.len() > 1 {
                    while Some(deck[0]) == last {
                        deck.shuffle(&mut rng);
                    }
                }
                cursor = 0;
            }
            let pick = deck[cursor];
            cursor += 1;
            last = Some(pick);

            for mut kf in (self.templates[pick])(
                timing.fade_in,
                timing.effect,
                timing.fade_out,
                &mut rng,
            ) {
                kf.offset += timing.offset;
                show.push(kf);
            }
        }
        show
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{effect::Effect, system::System};

    struct Noop;

    impl Effect for Noop {
        fn eval(&mut self, _progress: f64, _system: &mut System) {}
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn parses_paired_cues() {
        let sheet = "0.0\t1.5\tfade in\n10.0\t12.0\tfade out\n20.0\t21.0\tfade in\n30.0\t30.5\tfade out\n";
        let timings = parse_timings(sheet).unwrap();
        assert_eq!(timings.len(), 2);
        assert_eq!(
            timings[0],
            Timing {
                offset: secs(0.0),
                fade_in: secs(1.5),
                effect: secs(8.5),
                fade_out: secs(2.0),
            }
        );
        assert_eq!(timings[1].offset, secs(20.0));
    }

    #[test]
    fn skips_header_and_blank_lines() {
        let sheet = "start\tend\tkind\n\n0.0\t1.0\tfade in\n5.0\t6.0\tfade out\n";
        let timings = parse_timings(sheet).unwrap();
        assert_eq!(timings.len(), 1);
    }

    #[test]
    fn unparseable_cue_times_are_skipped() {
        let sheet = "1.2.3\t4.0\tfade in\n0.0\t1.0\tfade in\n5.0\t6.0\tfade out\n";
        let timings = parse_timings(sheet).unwrap();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].offset, secs(0.0));
    }

    #[test]
    fn unpaired_cue_is_an_error() {
        let sheet = "0.0\t1.0\tfade in\n";
        assert!(parse_timings(sheet).is_err());
    }

    #[test]
    fn cues_must_alternate() {
        let sheet = "0.0\t1.0\tfade in\n2.0\t3.0\tfade in\n";
        assert!(parse_timings(sheet).is_err());
    }

    #[test]
    fn overlapping_fades_are_an_error() {
        let sheet = "0.0\t5.0\tfade in\n2.0\t3.0\tfade out\n";
        assert!(parse_timings(sheet).is_err());
    }

    fn labeled_template(label: &'static str) -> Template {
        Box::new(move |fade_in, effect, _fade_out, _rng| {
            vec![Keyframe::new(
                label,
                fade_in,
                effect.max(Duration::from_millis(1)),
                0,
                Box::new(Noop),
            )]
        })
    }

    fn four_segments() -> Vec<Timing> {
        (0..4)
            .map(|i| Timing {
                offset: secs(i as f64 * 20.0),
                fade_in: secs(1.0),
                effect: secs(10.0),
                fade_out: secs(1.0),
            })
            .collect()
    }

    #[test]
    fn same_seed_reproduces_the_show() {
        let mut generator = Generator::new();
        generator
            .add_template(labeled_template("alpha"))
            .add_template(labeled_template("beta"))
            .add_template(labeled_template("gamma"));
        let timings = four_segments();

        let labels = |show: &[Keyframe]| -> Vec<String> {
            show.iter().map(|kf| kf.label.clone()).collect()
        };
        let a = generator.generate(&timings, 7);
        let b = generator.generate(&timings, 7);
        assert_eq!(labels(&a), labels(&b));
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn keyframes_are_shifted_to_segment_offsets() {
        let mut generator = Generator::new();
        generator.add_template(labeled_template("only"));
        let timings = four_segments();

        let show = generator.generate(&timings, 1);
        let offsets: Vec<Duration> = show.iter().map(|kf| kf.offset).collect();
        assert_eq!(
            offsets,
            vec![secs(1.0), secs(21.0), secs(41.0), secs(61.0)]
        );
    }

    #[test]
    fn adjacent_segments_avoid_template_repeats_when_possible() {
        let mut generator = Generator::new();
        generator
            .add_template(labeled_template("alpha"))
            .add_template(labeled_template("beta"));
        let timings = four_segments();

        let show = generator.generate(&timings, 99);
        for pair in show.windows(2) {
            assert_ne!(pair[0].label, pair[1].label);
        }
    }

    #[test]
    fn empty_generator_yields_empty_show() {
        let generator = Generator::new();
        assert!(generator.generate(&four_segments(), 0).is_empty());
    }
}
