//! Tile engine: projects coordinates into a deduplicated multi-zoom tile
//! index and derives the geographic bounds of every tile.

use std::collections::HashSet;
use std::collections::hash_set;
use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

mod parse;
mod projection;

pub use parse::parse_latlng_stream;
pub use projection::{TILE_SIZE, project, tile_index, tile_to_latitude, tile_to_longitude};

/// Deepest zoom level the engine accepts.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Examples
    ///
    /// ```
    /// use heatmap::domain::tiles::Coordinate;
    ///
    /// assert!(Coordinate::new(51.5, -0.12).is_some());
    /// assert!(Coordinate::new(91.0, 0.0).is_none());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    /// Degrees north of the equator.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Degrees east of Greenwich.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Tile containing this coordinate at `zoom`.
    pub fn tile_at(&self, zoom: u8) -> Tile {
        let (x, y) = project(self.latitude, self.longitude);
        Tile {
            x: tile_index(x, zoom),
            y: tile_index(y, zoom),
            zoom,
        }
    }
}

/// Slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "z")]
    pub zoom: u8,
}

impl Tile {
    /// Filename suffix for the rendered image, `{x}-{y}-{zoom}.png`.
    pub fn filename_postfix(&self) -> String {
        format!("{}-{}-{}.png", self.x, self.y, self.zoom)
    }

    /// North-west corner as `[lat, lon]`.
    pub fn top_left(&self) -> [f64; 2] {
        [
            tile_to_latitude(self.y, self.zoom),
            tile_to_longitude(self.x, self.zoom),
        ]
    }

    /// South-east corner as `[lat, lon]`.
    pub fn bottom_right(&self) -> [f64; 2] {
        [
            tile_to_latitude(self.y + 1, self.zoom),
            tile_to_longitude(self.x + 1, self.zoom),
        ]
    }
}

/// Inclusive zoom interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

/// Zoom range validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoomRangeError {
    #[error("minimum zoom {min} exceeds maximum zoom {max}")]
    Inverted { min: u8, max: u8 },
    #[error("zoom {zoom} exceeds the supported maximum of {MAX_SUPPORTED_ZOOM}")]
    TooDeep { zoom: u8 },
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 2, max: 20 }
    }
}

impl ZoomRange {
    /// Validate a zoom window within the supported levels.
    pub fn new(min: u8, max: u8) -> Result<Self, ZoomRangeError> {
        if min > max {
            return Err(ZoomRangeError::Inverted { min, max });
        }
        if max > MAX_SUPPORTED_ZOOM {
            return Err(ZoomRangeError::TooDeep { zoom: max });
        }
        Ok(Self { min, max })
    }

    /// Lowest zoom level indexed.
    pub fn min(&self) -> u8 {
        self.min
    }

    /// Highest zoom level indexed.
    pub fn max(&self) -> u8 {
        self.max
    }

    /// Every zoom level in the window, ascending.
    pub fn levels(&self) -> RangeInclusive<u8> {
        self.min..=self.max
    }
}

/// Deduplicated tiles produced by one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileSet {
    tiles: HashSet<Tile>,
}

impl TileSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tile, returning `true` when it was not already present.
    pub fn insert(&mut self, tile: Tile) -> bool {
        self.tiles.insert(tile)
    }

    /// Whether `tile` has been added.
    pub fn contains(&self, tile: &Tile) -> bool {
        self.tiles.contains(tile)
    }

    /// Number of distinct tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no tile has been added.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Iterate tiles in unspecified order.
    pub fn iter(&self) -> hash_set::Iter<'_, Tile> {
        self.tiles.iter()
    }
}

impl<'a> IntoIterator for &'a TileSet {
    type Item = &'a Tile;
    type IntoIter = hash_set::Iter<'a, Tile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Render request for one tile, serialised into queue envelopes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapTileParam {
    #[serde(rename = "postfix")]
    pub filename_postfix: String,
    #[serde(rename = "tl")]
    pub top_left: [f64; 2],
    #[serde(rename = "br")]
    pub bottom_right: [f64; 2],
    pub tile: Tile,
}

impl From<Tile> for MapTileParam {
    fn from(tile: Tile) -> Self {
        Self {
            filename_postfix: tile.filename_postfix(),
            top_left: tile.top_left(),
            bottom_right: tile.bottom_right(),
            tile,
        }
    }
}

/// Parse `raw` and insert the tile of every coordinate at every zoom in
/// `zooms`. Returns the number of coordinates that were extracted.
pub fn add_to_tile_set(raw: &[u8], zooms: ZoomRange, tiles: &mut TileSet) -> usize {
    let coordinates = parse_latlng_stream(raw);
    insert_coordinates(&coordinates, zooms, tiles);
    coordinates.len()
}

fn insert_coordinates(coordinates: &[Coordinate], zooms: ZoomRange, tiles: &mut TileSet) {
    for zoom in zooms.levels() {
        for coordinate in coordinates {
            tiles.insert(coordinate.tile_at(zoom));
        }
    }
}

/// Derive render parameters for every tile. Output order is unspecified.
pub fn compute_tile_params(tiles: &TileSet) -> Vec<MapTileParam> {
    tiles.iter().copied().map(MapTileParam::from).collect()
}

/// Single-slot gate serialising inserts into a shared [`TileSet`].
///
/// Concurrent fetch tasks hand their raw payloads to the gate; the set is
/// only mutated while the slot is held.
#[derive(Debug)]
pub struct TileSetGate {
    zooms: ZoomRange,
    slot: Mutex<TileSet>,
}

impl TileSetGate {
    /// An empty gate indexing streams at `zooms`.
    pub fn new(zooms: ZoomRange) -> Self {
        Self {
            zooms,
            slot: Mutex::new(TileSet::new()),
        }
    }

    /// Add every tile derived from `raw`. Returns the extracted coordinate
    /// count.
    pub fn add_stream(&self, raw: &[u8]) -> usize {
        let coordinates = parse_latlng_stream(raw);
        let mut tiles = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        insert_coordinates(&coordinates, self.zooms, &mut tiles);
        coordinates.len()
    }

    /// Take the accumulated set, leaving the gate empty.
    pub fn take(&self) -> TileSet {
        let mut tiles = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tiles)
    }
}
