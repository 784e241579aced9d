//! Coordinate mapping from vendor track positions to LED indices.
//!
//! A reading goes through three stages:
//!
//! ```text
//!   raw "Pos" text ──parse──► track position
//!                  ──scale──► [0, usable_range]        (map_position)
//!                  ──reverse► usable_range - value      (Plouzané only)
//!                  ──classify► + spur offset            (past SPLIT_THRESHOLD)
//!                  ──check──► [0, led_count)
//! ```
//!
//! The last LEDs of the mapped range are territory shared by the Gouesnou and
//! Guipavas spurs, so vehicles past [`SPLIT_THRESHOLD`] are shifted onto the
//! physical spur they are actually on.

use derive_more::{Display, Error};
use log::debug;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::branch::{Branch, VehicleReading};

/// Physical pixels on the strip
pub const LED_COUNT: usize = 65;

/// LEDs kept out of the linear range for the shared spur territory
pub const RESERVED_LEDS: usize = 8;

/// Mapped values above this are on the shared spur territory
pub const SPLIT_THRESHOLD: i64 = 48;

/// Shift applied to Plouzané-bound vehicles identified as being on the Gouesnou spur
pub const PLOUZANE_SPUR_OFFSET: i64 = 8;

/// Shift applied to Gouesnou-bound vehicles on their spur.
///
/// Deliberately distinct from [`PLOUZANE_SPUR_OFFSET`].
pub const GOUESNOU_SPUR_OFFSET: i64 = 9;

/// Heading codes strictly above this put a Plouzané-bound vehicle on the Guipavas spur
pub const HEADING_THRESHOLD: &str = "225";

/// [`HEADING_THRESHOLD`] as a number, for [`HeadingOrder::Numeric`]
pub const HEADING_THRESHOLD_VALUE: i64 = 225;

/// Inline capacity of a branch's index list; a branch rarely has more trams in service.
const INLINE_INDICES: usize = 20;

/// LED indices produced by one branch's mapping pass, duplicates included.
pub type BranchIndices = SmallVec<[usize; INLINE_INDICES]>;

/// How heading codes are compared against [`HEADING_THRESHOLD`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingOrder {
    /// Byte-wise string comparison, so `"3" > "225"`. The feed sends
    /// three-digit codes, for which this matches numeric order.
    #[default]
    Lexicographic,
    /// Parse the heading as an integer first.
    Numeric,
}

/// Strip geometry and classifier settings for one display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub led_count: usize,
    pub reserved_leds: usize,
    pub heading_order: HeadingOrder,
}

impl Default for StripLayout {
    fn default() -> Self {
        Self {
            led_count: LED_COUNT,
            reserved_leds: RESERVED_LEDS,
            heading_order: HeadingOrder::default(),
        }
    }
}

impl StripLayout {
    /// Highest index of the linear range: `led_count - 1 - reserved_leds`.
    #[must_use]
    pub fn usable_range(&self) -> i64 {
        let range = self.led_count.saturating_sub(1).saturating_sub(self.reserved_leds);
        i64::try_from(range).unwrap_or(i64::MAX)
    }
}

/// Errors from mapping a single reading.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[display("{branch}: invalid track position {raw:?}")]
    InvalidReading { branch: Branch, raw: String },
    #[display("{branch}: vehicle mapped to {index} has no heading code")]
    MissingHeading { branch: Branch, index: i64 },
    #[display("{branch}: invalid heading code {raw:?}")]
    InvalidHeading { branch: Branch, raw: String },
    #[display("{branch}: LED index {index} is outside the {led_count}-pixel strip")]
    MappingOverflow {
        branch: Branch,
        index: i64,
        led_count: usize,
    },
}

/// Linearly rescale a track position onto `[0, usable_range]`.
///
/// Integer arithmetic throughout; the quotient truncates toward zero and is
/// never rounded.
#[must_use]
pub fn map_position(track_position: i64, max_track_position: i64, usable_range: i64) -> i64 {
    debug_assert!(max_track_position != 0, "max_track_position must be non-zero");
    let scaled =
        i128::from(track_position) * i128::from(usable_range) / i128::from(max_track_position);
    i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX })
}

/// Flip a mapped value to count from the other end of the range.
#[inline]
#[must_use]
pub fn reverse(mapped: i64, usable_range: i64) -> i64 {
    usable_range.saturating_sub(mapped).saturating_abs()
}

fn heading_above_threshold(
    branch: Branch,
    heading_code: &str,
    order: HeadingOrder,
) -> Result<bool, MappingError> {
    match order {
        HeadingOrder::Lexicographic => Ok(heading_code > HEADING_THRESHOLD),
        HeadingOrder::Numeric => heading_code
            .trim()
            .parse::<i64>()
            .map(|heading| heading > HEADING_THRESHOLD_VALUE)
            .map_err(|_| MappingError::InvalidHeading {
                branch,
                raw: heading_code.to_string(),
            }),
    }
}

/// Apply the shared-territory correction to an already scaled (and, for
/// Plouzané, reversed) value.
///
/// The heading code is only consulted for Plouzané-bound vehicles past
/// [`SPLIT_THRESHOLD`]; it may be absent otherwise.
pub fn classify(
    branch: Branch,
    mapped: i64,
    heading_code: Option<&str>,
    order: HeadingOrder,
) -> Result<i64, MappingError> {
    if mapped <= SPLIT_THRESHOLD {
        return Ok(mapped);
    }
    match branch {
        Branch::PlouzaneBound => {
            let heading = heading_code.ok_or(MappingError::MissingHeading {
                branch,
                index: mapped,
            })?;
            if heading_above_threshold(branch, heading, order)? {
                // Guipavas spur
                Ok(mapped)
            } else {
                // Gouesnou spur
                Ok(mapped + PLOUZANE_SPUR_OFFSET)
            }
        }
        Branch::GouesnouBound => Ok(mapped + GOUESNOU_SPUR_OFFSET),
        Branch::GuipavasBound => Ok(mapped),
    }
}

/// Map one reading to its LED index on the strip.
///
/// # Errors
/// - [`MappingError::InvalidReading`] if the track position is not an integer
/// - [`MappingError::MissingHeading`] / [`MappingError::InvalidHeading`] when a
///   Plouzané-bound vehicle on the shared territory cannot be classified
/// - [`MappingError::MappingOverflow`] if the result falls outside the strip
pub fn map_reading(
    branch: Branch,
    reading: &VehicleReading,
    layout: &StripLayout,
) -> Result<usize, MappingError> {
    let track_position: i64 =
        reading
            .track_position
            .trim()
            .parse()
            .map_err(|_| MappingError::InvalidReading {
                branch,
                raw: reading.track_position.clone(),
            })?;

    let usable_range = layout.usable_range();
    let mut value = map_position(track_position, branch.max_track_position(), usable_range);
    if branch.is_reversed() {
        value = reverse(value, usable_range);
    }
    let index = classify(
        branch,
        value,
        reading.heading_code.as_deref(),
        layout.heading_order,
    )?;

    let led = usize::try_from(index)
        .ok()
        .filter(|&led| led < layout.led_count)
        .ok_or(MappingError::MappingOverflow {
            branch,
            index,
            led_count: layout.led_count,
        })?;

    debug!(
        "{branch}: vehicle {} at {track_position} -> LED {led}",
        reading.vehicle_id.as_deref().unwrap_or("?")
    );
    Ok(led)
}

/// Map every reading of one branch, in order.
///
/// Returns a fresh list on each call. The first reading that fails to map
/// aborts the whole pass.
pub fn map_branch(
    branch: Branch,
    readings: &[VehicleReading],
    layout: &StripLayout,
) -> Result<BranchIndices, MappingError> {
    readings
        .iter()
        .map(|reading| map_reading(branch, reading, layout))
        .collect()
}
