//! The poll, map, composite, render loop.

use derive_more::{Display, Error, From};
use log::{debug, error, info};
use smart_leds::{SmartLedsWrite, RGB8};
use std::fmt::Debug;
use std::time::Duration;
use tramlights_position_lib::{
    build_color_map, Branch, BranchReadings, LedColorMap, MappingError, StripLayout,
};

use crate::fetch::{FetchError, VehicleSource};
use crate::leds::LedController;

/// Why a cycle was abandoned before rendering
#[derive(Debug, Display, Error, From)]
pub enum CycleError {
    #[display("fetch failed: {_0}")]
    Fetch(FetchError),
    #[display("mapping failed: {_0}")]
    Mapping(MappingError),
    #[display("strip write failed: {message}")]
    #[from(ignore)]
    Render { message: String },
}

/// Outcome counts of [`CycleDriver::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub aborted: u64,
}

pub struct CycleDriver<S, W> {
    source: S,
    leds: LedController<W>,
    layout: StripLayout,
    cycle_delay: Duration,
}

impl<S, W> CycleDriver<S, W>
where
    S: VehicleSource,
    W: SmartLedsWrite<Color = RGB8>,
    W::Error: Debug,
{
    pub fn new(source: S, leds: LedController<W>, layout: StripLayout, cycle_delay: Duration) -> Self {
        Self {
            source,
            leds,
            layout,
            cycle_delay,
        }
    }

    /// Fetch every branch in turn, stopping at the first failure.
    pub fn fetch_all(&mut self) -> Result<BranchReadings, FetchError> {
        let mut readings = BranchReadings::default();
        for branch in Branch::ALL {
            let vehicles = self.source.fetch(branch)?;
            debug!("{branch}: {} vehicles", vehicles.len());
            readings.set(branch, vehicles);
        }
        Ok(readings)
    }

    /// One full cycle. On error nothing is written and the strip keeps its
    /// previous frame.
    pub fn run_cycle(&mut self) -> Result<LedColorMap, CycleError> {
        let readings = self.fetch_all()?;
        let map = build_color_map(&readings, &self.layout)?;
        self.leds
            .render(&map)
            .map_err(|e| CycleError::Render {
                message: format!("{e:?}"),
            })?;
        info!(
            "{} vehicles ({} / {} / {}), {} LEDs lit",
            readings.vehicle_count(),
            readings.plouzane.len(),
            readings.gouesnou.len(),
            readings.guipavas.len(),
            map.len()
        );
        Ok(map)
    }

    /// Run `max_cycles` cycles, or forever when it is 0.
    pub fn run(&mut self, max_cycles: u64) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut cycle = 0u64;
        loop {
            cycle += 1;
            match self.run_cycle() {
                Ok(_) => summary.completed += 1,
                Err(e) => {
                    error!("Cycle {cycle} aborted: {e}");
                    summary.aborted += 1;
                }
            }

            if max_cycles != 0 && cycle >= max_cycles {
                break;
            }
            std::thread::sleep(self.cycle_delay);
        }
        info!(
            "Stopped after {cycle} cycles ({} completed, {} aborted)",
            summary.completed, summary.aborted
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leds::tests::RecordingStrip;
    use std::collections::VecDeque;
    use tramlights_position_lib::VehicleReading;

    /// Serves one scripted cycle per Plouzané request; `Err(branch)` makes
    /// that branch's fetch fail.
    #[derive(Default)]
    struct FakeSource {
        script: VecDeque<Result<BranchReadings, Branch>>,
        current: Option<Result<BranchReadings, Branch>>,
        requests: Vec<Branch>,
    }

    impl FakeSource {
        fn new(script: Vec<Result<BranchReadings, Branch>>) -> Self {
            Self {
                script: script.into(),
                ..Self::default()
            }
        }
    }

    impl VehicleSource for FakeSource {
        fn fetch(&mut self, branch: Branch) -> Result<Vec<VehicleReading>, FetchError> {
            self.requests.push(branch);
            if branch == Branch::PlouzaneBound {
                self.current = self.script.pop_front();
            }
            match &self.current {
                Some(Ok(readings)) => Ok(readings.get(branch).to_vec()),
                Some(Err(failing)) if *failing == branch => Err(FetchError::RetriesExhausted {
                    branch,
                    attempts: 1,
                    last_error: "connection refused".to_string(),
                }),
                _ => Ok(Vec::new()),
            }
        }
    }

    fn driver(script: Vec<Result<BranchReadings, Branch>>) -> CycleDriver<FakeSource, RecordingStrip> {
        CycleDriver::new(
            FakeSource::new(script),
            LedController::new(RecordingStrip::default(), 65, 255),
            StripLayout::default(),
            Duration::ZERO,
        )
    }

    fn sample() -> BranchReadings {
        BranchReadings {
            plouzane: vec![VehicleReading::new("12300")],
            gouesnou: vec![VehicleReading::new("0")],
            guipavas: vec![VehicleReading::new("6200")],
        }
    }

    #[test]
    fn test_cycle_renders_composited_frame() {
        let mut d = driver(vec![Ok(sample())]);
        let map = d.run_cycle().unwrap();

        // Plouzané terminus reverses onto LED 0, shared with Gouesnou's origin
        assert_eq!(map.get(0), Some(RGB8::new(0, 255, 255)));
        assert_eq!(map.get(28), Some(RGB8::new(255, 0, 0)));
        assert_eq!(map.len(), 2);

        let frames = &d.leds.driver().frames;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], map.to_frame(65));
    }

    #[test]
    fn test_branches_fetched_in_order() {
        let mut d = driver(vec![Ok(BranchReadings::default())]);
        d.run_cycle().unwrap();
        assert_eq!(d.source.requests, Branch::ALL.to_vec());
    }

    #[test]
    fn test_fetch_failure_aborts_without_render() {
        let mut d = driver(vec![Err(Branch::GouesnouBound)]);
        let err = d.run_cycle().unwrap_err();

        assert!(matches!(
            err,
            CycleError::Fetch(FetchError::RetriesExhausted {
                branch: Branch::GouesnouBound,
                ..
            })
        ));
        // Guipavas is never asked for
        assert_eq!(
            d.source.requests,
            vec![Branch::PlouzaneBound, Branch::GouesnouBound]
        );
        assert!(d.leds.driver().frames.is_empty());
    }

    #[test]
    fn test_mapping_failure_aborts_without_render() {
        let readings = BranchReadings {
            guipavas: vec![VehicleReading::new("n/a")],
            ..sample()
        };
        let mut d = driver(vec![Ok(readings)]);
        let err = d.run_cycle().unwrap_err();

        assert!(matches!(
            err,
            CycleError::Mapping(MappingError::InvalidReading {
                branch: Branch::GuipavasBound,
                ..
            })
        ));
        assert!(d.leds.driver().frames.is_empty());
    }

    #[test]
    fn test_run_counts_and_continues_after_abort() {
        let mut d = driver(vec![Ok(sample()), Err(Branch::PlouzaneBound), Ok(sample())]);
        let summary = d.run(3);

        assert_eq!(
            summary,
            RunSummary {
                completed: 2,
                aborted: 1
            }
        );
        assert_eq!(d.leds.driver().frames.len(), 2);
    }

    #[test]
    fn test_no_state_carried_between_cycles() {
        let mut d = driver(vec![Ok(sample()), Ok(BranchReadings::default())]);
        d.run(2);

        let frames = &d.leds.driver().frames;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].iter().all(|&c| c == RGB8::default()));
    }
}
