/// Integer voxel bounds tracking for active grid regions

/// Inclusive axis-aligned box in grid index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelBounds {
    pub min: [i32; 3],
    pub max: [i32; 3],
}

impl VoxelBounds {
    /// Bounds covering exactly one voxel
    pub fn from_voxel(ijk: [i32; 3]) -> Self {
        Self { min: ijk, max: ijk }
    }

    /// Grow the bounds to include a voxel
    pub fn update(&mut self, ijk: [i32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(ijk[axis]);
            self.max[axis] = self.max[axis].max(ijk[axis]);
        }
    }

    /// Smallest bounds covering every voxel, `None` when there are none
    pub fn enclosing(voxels: impl IntoIterator<Item = [i32; 3]>) -> Option<Self> {
        let mut voxels = voxels.into_iter();
        let mut bounds = Self::from_voxel(voxels.next()?);
        for ijk in voxels {
            bounds.update(ijk);
        }
        Some(bounds)
    }

    /// Voxel counts along x, y and z
    pub fn extent(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| (i64::from(self.max[axis]) - i64::from(self.min[axis]) + 1) as usize)
    }
}
