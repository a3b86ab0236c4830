/*!
Event Representations Module

Converts event streams into dense tensors for learned models.

- **Voxel grids**: `(num_bins, height, width)` `f32` grids with bilinear temporal
  interpolation, see [`voxel_grid`]
*/

pub mod voxel_grid;

pub use voxel_grid::{
    bin_positions, events_to_voxel_grid, EventsToVoxelGrid, TimestampOrdering, VoxelGrid,
    VoxelGridConfig,
};
