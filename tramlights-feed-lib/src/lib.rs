//! Geolocated vehicle position feed for tram line A
//!
//! This library knows the shape of the Brest métropole transport API: which
//! query selects each branch, and how a response body decodes into
//! [`VehicleReading`]s. It performs no I/O so it can be shared by the display
//! driver and the mock feed server.

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tramlights_position_lib::{Branch, VehicleReading};

/// Production endpoint returning the vehicles of one route and headsign
pub const DEFAULT_ENDPOINT: &str =
    "https://applications002.brest-metropole.fr/WIPOD01/Transport/REST/getGeolocatedVehiclesPosition";

/// Route identifier of the tram line
pub const ROUTE_ID: &str = "A";

/// Trip headsign selecting one branch's vehicles
#[must_use]
pub const fn headsign(branch: Branch) -> &'static str {
    match branch {
        Branch::PlouzaneBound => "porte de plouzane",
        Branch::GouesnouBound => "porte de gouesnou",
        Branch::GuipavasBound => "porte de guipavas",
    }
}

/// Inverse of [`headsign`], case-insensitive
#[must_use]
pub fn branch_for_headsign(value: &str) -> Option<Branch> {
    Branch::ALL
        .into_iter()
        .find(|&branch| headsign(branch).eq_ignore_ascii_case(value.trim()))
}

/// Query string pairs for one branch of `route_id`
#[must_use]
pub fn query_params(route_id: &str, branch: Branch) -> [(&'static str, String); 3] {
    [
        ("format", "json".to_string()),
        ("route_id", route_id.to_string()),
        ("trip_headsign", headsign(branch).to_string()),
    ]
}

/// One element of the response array, as sent on the wire.
///
/// Field values are kept as raw JSON; the feed has been seen to send both
/// strings and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    #[serde(rename = "IdVehicle", default, skip_serializing_if = "Option::is_none")]
    pub id_vehicle: Option<Value>,
    #[serde(rename = "Pos")]
    pub pos: Value,
    #[serde(rename = "Cape", default, skip_serializing_if = "Option::is_none")]
    pub cape: Option<Value>,
}

impl From<VehiclePosition> for VehicleReading {
    fn from(v: VehiclePosition) -> Self {
        Self {
            vehicle_id: v.id_vehicle.as_ref().map(raw_text),
            track_position: raw_text(&v.pos),
            heading_code: v.cape.as_ref().map(raw_text),
        }
    }
}

/// Errors from decoding a response body
#[derive(Debug, Display, Error, From)]
pub enum FeedError {
    /// The server answered with nothing; worth asking again
    #[display("empty response body")]
    #[from(ignore)]
    EmptyBody,
    #[display("response is not a vehicle list: {_0}")]
    Json(serde_json::Error),
}

impl FeedError {
    /// Whether repeating the request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::EmptyBody)
    }
}

/// Text of a JSON value as the mapper expects it.
///
/// Numbers become integer text (fractions truncated toward zero); anything
/// other than a string or number keeps its JSON rendering so it is reported
/// verbatim when it fails to parse.
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // Finite by construction of serde_json::Number
                #[allow(clippy::cast_possible_truncation)]
                let truncated = n.as_f64().unwrap_or_default().trunc() as i64;
                truncated.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Decode a response body into readings, in feed order.
///
/// # Errors
/// [`FeedError::EmptyBody`] for a blank body, [`FeedError::Json`] when the body
/// is not an array of vehicle objects. An empty array is a valid answer.
pub fn parse_vehicles(body: &str) -> Result<Vec<VehicleReading>, FeedError> {
    if body.trim().is_empty() {
        return Err(FeedError::EmptyBody);
    }
    let positions: Vec<VehiclePosition> = serde_json::from_str(body)?;
    Ok(positions.into_iter().map(VehicleReading::from).collect())
}
