//! The three branches of line A and the raw readings received for them.

use derive_more::Display;
use rgb::RGB8;
use serde::{Deserialize, Serialize};

/// One of the destination feeds sharing the strip.
///
/// Plouzané-bound trams count their track position from the opposite end of
/// the strip, so their mapping is reversed (see [`Branch::is_reversed`]).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    #[display("Porte de Plouzané")]
    PlouzaneBound,
    #[display("Porte de Gouesnou")]
    GouesnouBound,
    #[display("Porte de Guipavas")]
    GuipavasBound,
}

impl Branch {
    /// Processing order for a refresh cycle. Compositing precedence depends on it.
    pub const ALL: [Self; 3] = [Self::PlouzaneBound, Self::GouesnouBound, Self::GuipavasBound];

    /// Largest track position observed on this branch, in vendor units.
    #[must_use]
    pub const fn max_track_position(self) -> i64 {
        match self {
            Self::PlouzaneBound => 12300,
            Self::GouesnouBound => 12200,
            Self::GuipavasBound => 12400,
        }
    }

    /// Colour of a lone vehicle of this branch.
    ///
    /// Overlaps are the channel-wise sum of these triples.
    #[must_use]
    pub const fn base_color(self) -> RGB8 {
        match self {
            Self::PlouzaneBound => RGB8::new(0, 0, 255),
            Self::GouesnouBound => RGB8::new(0, 255, 0),
            Self::GuipavasBound => RGB8::new(255, 0, 0),
        }
    }

    /// Whether position zero sits at the far end of the strip.
    #[must_use]
    pub const fn is_reversed(self) -> bool {
        matches!(self, Self::PlouzaneBound)
    }
}

/// A vehicle as reported by the position feed, still in raw textual form.
///
/// `track_position` is parsed during mapping so malformed values can be
/// reported together with the branch they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    pub track_position: String,
    /// Only meaningful for [`Branch::PlouzaneBound`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_code: Option<String>,
}

impl VehicleReading {
    pub fn new(track_position: impl Into<String>) -> Self {
        Self {
            vehicle_id: None,
            track_position: track_position.into(),
            heading_code: None,
        }
    }

    #[must_use]
    pub fn with_heading(mut self, heading_code: impl Into<String>) -> Self {
        self.heading_code = Some(heading_code.into());
        self
    }

    #[must_use]
    pub fn with_vehicle_id(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }
}
