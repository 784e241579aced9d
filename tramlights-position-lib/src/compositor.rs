//! Additive colour compositing of the three branches' LED indices.

use std::collections::BTreeMap;

use log::info;
use rgb::RGB8;

use crate::branch::Branch;
use crate::mapping::BranchIndices;

/// Final colour of every lit LED for one refresh cycle.
///
/// Built from empty each cycle; LEDs not present stay dark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedColorMap {
    colors: BTreeMap<usize, RGB8>,
}

impl LedColorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the colour of an LED, replacing any earlier colour.
    pub fn insert(&mut self, led: usize, color: RGB8) {
        self.colors.insert(led, color);
    }

    #[must_use]
    pub fn get(&self, led: usize) -> Option<RGB8> {
        self.colors.get(&led).copied()
    }

    /// Lit LEDs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, RGB8)> + '_ {
        self.colors.iter().map(|(&led, &color)| (led, color))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Full pixel frame: every LED cleared to black, then the map applied.
    ///
    /// Every key must be below `led_count`; indices from
    /// [`map_reading`](crate::map_reading) already are. Debug builds panic
    /// on an out-of-range key, release builds skip it.
    #[must_use]
    pub fn to_frame(&self, led_count: usize) -> Vec<RGB8> {
        debug_assert!(
            self.colors.keys().all(|&led| led < led_count),
            "LED index outside the {led_count}-pixel frame"
        );
        let mut leds = vec![RGB8::default(); led_count];
        for (led, color) in self.iter() {
            if let Some(pixel) = leds.get_mut(led) {
                *pixel = color;
            }
        }
        leds
    }
}

/// Channel-wise saturating sum of the branches' base colours.
#[must_use]
pub fn additive_mix(branches: &[Branch]) -> RGB8 {
    branches.iter().fold(RGB8::default(), |acc, branch| {
        let c = branch.base_color();
        RGB8::new(
            acc.r.saturating_add(c.r),
            acc.g.saturating_add(c.g),
            acc.b.saturating_add(c.b),
        )
    })
}

/// Remove the first occurrence of `led`, reporting whether it was present.
fn take_one(indices: &mut BranchIndices, led: usize) -> bool {
    match indices.iter().position(|&i| i == led) {
        Some(pos) => {
            indices.remove(pos);
            true
        }
        None => false,
    }
}

/// Composite the three branches, consuming matched occurrences.
///
/// Precedence follows the processing order:
/// 1. each Plouzané index, checked against Gouesnou then Guipavas;
/// 2. each remaining Gouesnou index, checked against Guipavas;
/// 3. each remaining Guipavas index.
///
/// Whenever an index pairs with another branch, one occurrence of it is
/// removed from that branch's list, so later steps never repaint it. After
/// return, `gouesnou` and `guipavas` hold only what was left to steps 2 and 3
/// (minus the Gouesnou/Guipavas pairs consumed in step 2).
pub fn composite_draining(
    plouzane: &[usize],
    gouesnou: &mut BranchIndices,
    guipavas: &mut BranchIndices,
) -> LedColorMap {
    use Branch::{GouesnouBound, GuipavasBound, PlouzaneBound};

    let mut map = LedColorMap::new();

    for &led in plouzane {
        let color = if gouesnou.contains(&led) {
            let color = if take_one(guipavas, led) {
                info!("LED {led}: {PlouzaneBound} / {GouesnouBound} / {GuipavasBound} overlap");
                additive_mix(&[PlouzaneBound, GouesnouBound, GuipavasBound])
            } else {
                info!("LED {led}: {PlouzaneBound} / {GouesnouBound} overlap");
                additive_mix(&[PlouzaneBound, GouesnouBound])
            };
            take_one(gouesnou, led);
            color
        } else if take_one(guipavas, led) {
            info!("LED {led}: {PlouzaneBound} / {GuipavasBound} overlap");
            additive_mix(&[PlouzaneBound, GuipavasBound])
        } else {
            PlouzaneBound.base_color()
        };
        map.insert(led, color);
    }

    for &led in gouesnou.iter() {
        let color = if take_one(guipavas, led) {
            info!("LED {led}: {GouesnouBound} / {GuipavasBound} overlap");
            additive_mix(&[GouesnouBound, GuipavasBound])
        } else {
            GouesnouBound.base_color()
        };
        map.insert(led, color);
    }

    for &led in guipavas.iter() {
        map.insert(led, GuipavasBound.base_color());
    }

    map
}

/// Composite the three branches without touching the inputs.
#[must_use]
pub fn composite(plouzane: &[usize], gouesnou: &[usize], guipavas: &[usize]) -> LedColorMap {
    let mut gouesnou = BranchIndices::from_slice(gouesnou);
    let mut guipavas = BranchIndices::from_slice(guipavas);
    composite_draining(plouzane, &mut gouesnou, &mut guipavas)
}
