//! Order-preserving partitioning of items into bounded envelopes.

use std::num::NonZeroUsize;

use serde::Serialize;

use super::athlete::{AthleteId, MapId};
use super::tiles::MapTileParam;

/// Split `items` into contiguous chunks of at most `batch_size` items and
/// wrap each chunk with `transform`.
///
/// Produces `ceil(items.len() / batch_size)` envelopes; every chunk except
/// possibly the last holds exactly `batch_size` items.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use heatmap::domain::to_batches;
///
/// let size = NonZeroUsize::new(5).expect("non-zero");
/// let items: Vec<u32> = (1..=13).collect();
/// let lengths: Vec<usize> = to_batches(&items, size, |chunk| chunk.len());
/// assert_eq!(lengths, vec![5, 5, 3]);
/// ```
pub fn to_batches<T, B, F>(items: &[T], batch_size: NonZeroUsize, transform: F) -> Vec<B>
where
    F: FnMut(&[T]) -> B,
{
    items.chunks(batch_size.get()).map(transform).collect()
}

/// Queue envelope asking the renderer to draw one chunk of tiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileBatch {
    pub athlete_id: AthleteId,
    pub map_id: MapId,
    #[serde(rename = "coords")]
    pub tiles: Vec<MapTileParam>,
}

/// Partition tile parameters into [`TileBatch`] envelopes for one map.
pub fn tile_batches(
    params: &[MapTileParam],
    batch_size: NonZeroUsize,
    athlete_id: AthleteId,
    map_id: MapId,
) -> Vec<TileBatch> {
    to_batches(params, batch_size, |chunk| TileBatch {
        athlete_id,
        map_id,
        tiles: chunk.to_vec(),
    })
}
