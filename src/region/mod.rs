use crate::region::geometry::RegionGeometry;
use crate::region::raster::EncodedImage;
use std::fmt;

pub mod geometry;
pub mod raster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

/// A captured sub-area of the active image.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    id: RegionId,
    pub geometry: RegionGeometry,
    raster: EncodedImage,
}

impl Region {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn raster(&self) -> &EncodedImage {
        &self.raster
    }
}

/// Regions of the active image in capture order.
///
/// Order is append order and is never re-sorted by position; it is also the
/// order in which regions are processed.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: Vec<Region>,
    next_id: u64,
}

impl RegionStore {
    /// Append a new region and return its id. Ids are never reused within a store.
    pub fn add(&mut self, geometry: RegionGeometry, raster: EncodedImage) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;

        self.regions.push(Region {
            id,
            geometry,
            raster,
        });
        id
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let index = self.regions.iter().position(|region| region.id == id)?;
        Some(self.regions.remove(index))
    }

    pub fn reset_all(&mut self) {
        self.regions.clear();
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn last(&self) -> Option<&Region> {
        self.regions.last()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
