//! Sampling profiler.
//!
//! A timer thread raises a tick flag at the requested rate; the interpreter
//! checks it at instruction boundaries and records which unit and generic
//! offset was executing. Samples are aggregated per compilation unit into
//! per-source-character counts.

use crate::comp::Comp;
use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// One recorded tick.
#[derive(Debug, Clone)]
pub struct Sample {
    pub comp: Rc<Comp>,
    /// Generic-bytecode offset.
    pub pos: usize,
}

pub(crate) struct Profiler {
    tick: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
    samples: Vec<Sample>,
    capacity: usize,
    full: bool,
}

impl Profiler {
    pub(crate) fn start(hz: u32, capacity: usize) -> Profiler {
        let tick = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
        let timer = {
            let tick = tick.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(period);
                    tick.store(true, Ordering::Relaxed);
                }
            })
        };
        Profiler {
            tick,
            stop,
            timer: Some(timer),
            samples: Vec::new(),
            capacity,
            full: false,
        }
    }

    /// Whether a tick arrived since the last call.
    pub(crate) fn due(&self) -> bool {
        self.tick.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn record(&mut self, comp: &Rc<Comp>, pos: usize) {
        if self.samples.len() >= self.capacity {
            self.full = true;
            return;
        }
        self.samples.push(Sample {
            comp: comp.clone(),
            pos,
        });
    }

    pub(crate) fn finish(mut self) -> Profile {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
        if self.full {
            warn!(
                samples = self.samples.len(),
                "Profiler buffer ran out in the middle of execution. Only timings of the start of profiling will be shown."
            );
        }
        Profile::aggregate(&self.samples)
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Samples of one compilation unit.
#[derive(Debug, Clone)]
pub struct UnitProfile {
    pub comp: Rc<Comp>,
    /// Sample count per source character; a single entry without source.
    pub counts: Vec<u64>,
}

impl UnitProfile {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn name(&self) -> &str {
        self.comp.path.as_deref().unwrap_or("(anonymous)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UnitKey {
    Path(String),
    Anonymous([u8; 32]),
}

/// Aggregated profiler results.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub samples: usize,
    /// In order of first appearance.
    pub units: Vec<UnitProfile>,
}

impl Profile {
    /// Group samples by unit path, or by content for units without one,
    /// counting each at the first source character of its instruction.
    pub fn aggregate(samples: &[Sample]) -> Profile {
        let mut index: HashMap<UnitKey, usize> = HashMap::new();
        let mut units: Vec<UnitProfile> = Vec::new();
        for sample in samples {
            let comp = &sample.comp;
            let key = match &comp.path {
                Some(path) => UnitKey::Path(path.clone()),
                None => UnitKey::Anonymous(comp.fingerprint()),
            };
            let idx = *index.entry(key).or_insert_with(|| {
                let len = comp.source.as_ref().map_or(1, |s| s.chars().count().max(1));
                units.push(UnitProfile {
                    comp: comp.clone(),
                    counts: vec![0; len],
                });
                units.len() - 1
            });
            let counts = &mut units[idx].counts;
            let at = comp.span(sample.pos).map_or(0, |(cs, _)| cs);
            let last = counts.len() - 1;
            counts[at.min(last)] += 1;
        }
        Profile {
            samples: samples.len(),
            units,
        }
    }

    /// `Got N samples`, then per unit either a total or the source with a
    /// per-line sample gutter.
    pub fn render(&self) -> String {
        let mut out = format!("Got {} samples\n", self.samples);
        for unit in &self.units {
            let Some(source) = unit.comp.source.as_deref() else {
                let _ = writeln!(out, "{}: {} samples", unit.name(), unit.total());
                continue;
            };
            let _ = writeln!(out, "{}:", unit.name());
            let chars: Vec<char> = source.chars().collect();
            let mut line_start = 0;
            let mut line_total = 0;
            for (i, &c) in chars.iter().enumerate() {
                line_total += unit.counts.get(i).copied().unwrap_or(0);
                if c == '\n' || i == chars.len() - 1 {
                    let end = if c == '\n' { i } else { i + 1 };
                    let line: String = chars[line_start..end].iter().collect();
                    if line_total == 0 {
                        let _ = writeln!(out, "      │{line}");
                    } else {
                        let _ = writeln!(out, "{line_total:6}│{line}");
                    }
                    line_total = 0;
                    line_start = i + 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comp::UnitDesc;
    use blockvm_common::SourceIndices;

    fn comp(source: Option<&str>, path: Option<&str>) -> Rc<Comp> {
        let mut unit = UnitDesc::new(vec![0; 4], vec![], vec![], vec![]);
        if let Some(source) = source {
            unit = unit.with_source(
                source,
                SourceIndices::new(vec![0, 2, 4, 5], vec![0, 2, 4, 5]),
            );
        }
        if let Some(path) = path {
            unit = unit.with_path(path);
        }
        Rc::new(Comp::new(&unit))
    }

    fn sample(comp: &Rc<Comp>, pos: usize) -> Sample {
        Sample {
            comp: comp.clone(),
            pos,
        }
    }

    #[test]
    fn aggregates_per_unit() {
        let a = comp(Some("ab\ncd\n"), Some("a.bqn"));
        let a_again = comp(Some("ab\ncd\n"), Some("a.bqn"));
        let anon = comp(None, None);
        let profile = Profile::aggregate(&[
            sample(&a, 0),
            sample(&anon, 3),
            sample(&a_again, 2),
            sample(&a, 2),
        ]);
        assert_eq!(profile.samples, 4);
        assert_eq!(profile.units.len(), 2);
        assert_eq!(profile.units[0].counts, vec![1, 0, 0, 0, 2, 0]);
        assert_eq!(profile.units[1].counts, vec![1]);
    }

    #[test]
    fn render_gutter() {
        let a = comp(Some("ab\ncd\nef"), Some("a.bqn"));
        let anon = comp(None, None);
        let profile = Profile::aggregate(&[sample(&a, 3), sample(&anon, 0), sample(&anon, 1)]);
        assert_eq!(
            profile.render(),
            "Got 3 samples\n\
             a.bqn:\n      \
             │ab\n     \
             1│cd\n      \
             │ef\n\
             (anonymous): 2 samples\n"
        );
    }

    #[test]
    fn full_buffer_stops_recording() {
        let a = comp(None, None);
        let mut profiler = Profiler::start(1000, 2);
        for pos in 0..5 {
            profiler.record(&a, pos);
        }
        assert!(profiler.full);
        let profile = profiler.finish();
        assert_eq!(profile.samples, 2);
    }
}
