//! Tram position rendering logic for the line A LED display
//!
//! This library turns the raw track positions reported for the three branches
//! of the line into LED indices on a single strip, then composites the
//! branches' colours where vehicles share an LED. It is hardware-agnostic and
//! holds no state between refresh cycles.

mod branch;
mod compositor;
mod mapping;

pub use branch::{Branch, VehicleReading};
pub use compositor::{additive_mix, composite, composite_draining, LedColorMap};
pub use mapping::{
    classify, map_branch, map_position, map_reading, reverse, BranchIndices, HeadingOrder,
    MappingError, StripLayout, GOUESNOU_SPUR_OFFSET, HEADING_THRESHOLD, HEADING_THRESHOLD_VALUE,
    LED_COUNT, PLOUZANE_SPUR_OFFSET, RESERVED_LEDS, SPLIT_THRESHOLD,
};
pub use rgb::RGB8;

/// The readings of one refresh cycle, one list per branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchReadings {
    pub plouzane: Vec<VehicleReading>,
    pub gouesnou: Vec<VehicleReading>,
    pub guipavas: Vec<VehicleReading>,
}

impl BranchReadings {
    #[must_use]
    pub fn get(&self, branch: Branch) -> &[VehicleReading] {
        match branch {
            Branch::PlouzaneBound => &self.plouzane,
            Branch::GouesnouBound => &self.gouesnou,
            Branch::GuipavasBound => &self.guipavas,
        }
    }

    pub fn set(&mut self, branch: Branch, readings: Vec<VehicleReading>) {
        match branch {
            Branch::PlouzaneBound => self.plouzane = readings,
            Branch::GouesnouBound => self.gouesnou = readings,
            Branch::GuipavasBound => self.guipavas = readings,
        }
    }

    /// Total vehicles across all branches
    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.plouzane.len() + self.gouesnou.len() + self.guipavas.len()
    }
}

/// Map all three branches and composite them into this cycle's colour map.
///
/// # Errors
/// Returns the first [`MappingError`] met; nothing is composited in that case.
pub fn build_color_map(
    readings: &BranchReadings,
    layout: &StripLayout,
) -> Result<LedColorMap, MappingError> {
    let plouzane = map_branch(Branch::PlouzaneBound, &readings.plouzane, layout)?;
    let mut gouesnou = map_branch(Branch::GouesnouBound, &readings.gouesnou, layout)?;
    let mut guipavas = map_branch(Branch::GuipavasBound, &readings.guipavas, layout)?;
    Ok(composite_draining(&plouzane, &mut gouesnou, &mut guipavas))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_color_map_end_to_end() {
        let readings = BranchReadings {
            // -> reversed 50, Guipavas spur
            plouzane: vec![VehicleReading::new("1400").with_heading("230")],
            // 11000 -> 50 -> 59
            gouesnou: vec![VehicleReading::new("11000")],
            // 11100 -> 50
            guipavas: vec![VehicleReading::new("11100"), VehicleReading::new("0")],
        };
        let map = build_color_map(&readings, &StripLayout::default()).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(50), Some(RGB8::new(255, 0, 255)));
        assert_eq!(map.get(59), Some(RGB8::new(0, 255, 0)));
        assert_eq!(map.get(0), Some(RGB8::new(255, 0, 0)));
    }

    #[test]
    fn test_build_color_map_empty_branches() {
        let map = build_color_map(&BranchReadings::default(), &StripLayout::default()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_build_color_map_aborts_on_bad_reading() {
        let readings = BranchReadings {
            plouzane: vec![VehicleReading::new("6150")],
            gouesnou: vec![VehicleReading::new("")],
            guipavas: Vec::new(),
        };
        let err = build_color_map(&readings, &StripLayout::default()).unwrap_err();
        assert_eq!(
            err,
            MappingError::InvalidReading {
                branch: Branch::GouesnouBound,
                raw: String::new()
            }
        );
    }

    #[test]
    fn test_branch_readings_accessors() {
        let mut readings = BranchReadings::default();
        readings.set(Branch::GuipavasBound, vec![VehicleReading::new("1")]);
        assert_eq!(readings.get(Branch::GuipavasBound).len(), 1);
        assert!(readings.get(Branch::PlouzaneBound).is_empty());
        assert_eq!(readings.vehicle_count(), 1);
    }
}
